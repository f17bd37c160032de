//! RabbitMQ broker client using lapin.
//!
//! One connection and one channel per process. The channel is handed out
//! twice: as a [`Publisher`] for producers and as a raw [`Channel`] for the
//! consumer side, which declares its own queue and consumer.

use std::time::Duration;

use anyhow::{Context, Result};
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{info, info_span, warn, Span};

use super::publisher::{BrokerError, MessagePublisher, Publisher};

/// Reply code sent when closing the channel and connection.
const CLOSE_REPLY_CODE: u16 = 200;

/// Owner of the broker connection lifecycle.
pub struct BrokerClient {
    connection: Connection,
    channel: Channel,
    publish_timeout: Duration,
    span: Span,
}

impl BrokerClient {
    /// Dial the broker and open a channel.
    ///
    /// No retry: a failed dial or channel open is returned to the caller, and
    /// the connection is closed again if only the channel failed.
    pub async fn connect(url: &str, publish_timeout: Duration, parent: &Span) -> Result<Self> {
        let span = info_span!(parent: parent, "broker");

        info!(parent: &span, url_length = url.len(), "rabbitmq_connecting");

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!(parent: &span, "rabbitmq_connected");

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(CLOSE_REPLY_CODE, "Channel open failed").await;
                return Err(e).context("Failed to create channel");
            }
        };

        info!(parent: &span, channel_id = channel.id(), "rabbitmq_channel_created");

        Ok(Self {
            connection,
            channel,
            publish_timeout,
            span,
        })
    }

    /// Producer handle over the shared channel.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.channel.clone(), self.publish_timeout, self.span.clone())
    }

    /// Consumer handle over the shared channel.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Publish `body` to `exchange`/`routing_key`.
    pub async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), BrokerError> {
        self.publisher().publish(exchange, routing_key, body).await
    }

    /// Close the channel, then the connection.
    ///
    /// Both are attempted even if the first fails; the first error is
    /// returned. Already closed handles are skipped, so calling this twice is
    /// harmless.
    pub async fn close(&self) -> Result<(), BrokerError> {
        let mut first_error = None;

        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(CLOSE_REPLY_CODE, "Normal shutdown").await {
                warn!(parent: &self.span, error = %e, "rabbitmq_channel_close_error");
                first_error.get_or_insert(BrokerError::from(e));
            }
        }

        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(CLOSE_REPLY_CODE, "Normal shutdown").await {
                warn!(parent: &self.span, error = %e, "rabbitmq_connection_close_error");
                first_error.get_or_insert(BrokerError::from(e));
            }
        }

        info!(parent: &self.span, "rabbitmq_client_closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
