//! Publishing side of the broker connection.
//!
//! A [`Publisher`] is a cheap, cloneable handle over the broker client's
//! channel. Publishing is fire-and-forget: success means the broker accepted
//! the frame, not that anything consumed it.

use std::time::Duration;

use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties, Channel};
use thiserror::Error;
use tracing::{debug, Instrument, Span};

/// Content type stamped on every published payload.
pub const CONTENT_TYPE: &str = "text/plain";

/// Errors raised while talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("channel is not connected")]
    NotConnected,

    #[error(transparent)]
    Amqp(#[from] lapin::Error),
}

/// Anything that can put an opaque payload on an exchange.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish `body` to `exchange` with `routing_key`.
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), BrokerError>;
}

/// Producer handle backed by the broker client's channel.
#[derive(Clone)]
pub struct Publisher {
    channel: Channel,
    timeout: Duration,
    span: Span,
}

impl Publisher {
    pub(crate) fn new(channel: Channel, timeout: Duration, span: Span) -> Self {
        Self {
            channel,
            timeout,
            span,
        }
    }

    /// Upper bound applied to every publish.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Publish options: not mandatory, not immediate.
pub(crate) fn publish_options() -> BasicPublishOptions {
    BasicPublishOptions {
        mandatory: false,
        immediate: false,
    }
}

/// Properties for a published payload.
pub(crate) fn publish_properties() -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(2) // Persistent
        .with_content_type(CONTENT_TYPE.into())
}

#[async_trait]
impl MessagePublisher for Publisher {
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), BrokerError> {
        if !self.channel.status().connected() {
            return Err(BrokerError::NotConnected);
        }

        let send = async {
            self.channel
                .basic_publish(exchange, routing_key, publish_options(), body, publish_properties())
                .await?
                .await?;
            Ok::<_, BrokerError>(())
        };

        tokio::time::timeout(self.timeout, send)
            .instrument(self.span.clone())
            .await
            .map_err(|_| BrokerError::Timeout(self.timeout))??;

        debug!(
            parent: &self.span,
            exchange = exchange,
            routing_key = routing_key,
            body_length = body.len(),
            "rabbitmq_message_published"
        );

        Ok(())
    }
}
