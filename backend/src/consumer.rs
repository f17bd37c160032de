//! Mail worker pool consuming the `mail` queue.
//!
//! One consumer is registered on the queue and its delivery stream is shared
//! by a fixed number of worker tasks. The broker prefetch equals the worker
//! count, so at most that many deliveries are unacknowledged at once.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Consumer,
};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::mail::Mailer;
use crate::queue::{BrokerError, MailMessage};

/// Consumer tag registered with the broker.
const CONSUMER_TAG: &str = "og-mailer";

/// Longest payload excerpt logged for undecodable messages.
const BODY_PREVIEW_LIMIT: usize = 500;

/// Queue name and fan-out degree, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub queue_name: String,
    pub num_workers: usize,
}

impl WorkerPoolConfig {
    /// `num_workers` below one is raised to one.
    pub fn new(queue_name: impl Into<String>, num_workers: usize) -> Self {
        Self {
            queue_name: queue_name.into(),
            num_workers: num_workers.max(1),
        }
    }

    /// Broker prefetch bound: one unacknowledged delivery per worker.
    pub fn prefetch_count(&self) -> u16 {
        u16::try_from(self.num_workers).unwrap_or(u16::MAX)
    }

    /// Durable, shared, kept when unused, no arguments.
    pub fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: true,
            exclusive: false,
            auto_delete: false,
            nowait: false,
        }
    }

    /// Per-consumer prefetch, no byte limit.
    pub fn qos_options(&self) -> BasicQosOptions {
        BasicQosOptions { global: false }
    }

    /// Manual acknowledgement.
    pub fn consume_options(&self) -> BasicConsumeOptions {
        BasicConsumeOptions {
            no_local: false,
            no_ack: false,
            exclusive: false,
            nowait: false,
        }
    }
}

/// A delivery that can be acknowledged or rejected once processed.
#[async_trait]
pub trait QueueDelivery: Send + Sync + 'static {
    fn delivery_tag(&self) -> u64;

    fn payload(&self) -> &[u8];

    /// Acknowledge this delivery only.
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Reject this delivery only.
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

#[async_trait]
impl QueueDelivery for Delivery {
    fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    fn payload(&self) -> &[u8] {
        &self.data
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(BrokerError::from)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(BrokerError::from)
    }
}

/// What a worker did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    /// The mail went out but the broker did not take the ack; it may redeliver.
    AckFailed,
    /// Nack failures are logged and still reported as `Rejected`.
    Rejected { requeue: bool },
}

/// Decode, send and settle one delivery.
///
/// Success acks. Undecodable payloads and messages the mailer rejects as
/// permanently invalid are nacked without requeue; transport failures are
/// nacked with requeue so the broker redelivers them.
pub async fn process_delivery<M, D>(mailer: &M, delivery: &D) -> Outcome
where
    M: Mailer + ?Sized,
    D: QueueDelivery + ?Sized,
{
    let delivery_tag = delivery.delivery_tag();
    let payload = delivery.payload();

    let message: MailMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            error!(
                delivery_tag = delivery_tag,
                error = %e,
                body_preview = %String::from_utf8_lossy(&payload[..payload.len().min(BODY_PREVIEW_LIMIT)]),
                "mail_job_parse_failed"
            );
            return reject(delivery, false).await;
        }
    };

    info!(
        delivery_tag = delivery_tag,
        recipients = ?message.to,
        subject = %message.subject,
        kind = ?message.kind,
        "mail_job_received"
    );

    match mailer.send_email(&message).await {
        Ok(()) => {
            if let Err(e) = delivery.ack().await {
                error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_ack_failed");
                return Outcome::AckFailed;
            }
            info!(delivery_tag = delivery_tag, recipients = ?message.to, "mail_job_completed");
            Outcome::Acked
        }
        Err(e) => {
            let requeue = !e.is_permanent();
            error!(
                delivery_tag = delivery_tag,
                recipients = ?message.to,
                error = %e,
                requeue = requeue,
                "mail_job_failed"
            );
            reject(delivery, requeue).await
        }
    }
}

async fn reject<D: QueueDelivery + ?Sized>(delivery: &D, requeue: bool) -> Outcome {
    if let Err(e) = delivery.nack(requeue).await {
        error!(
            delivery_tag = delivery.delivery_tag(),
            error = %e,
            "rabbitmq_nack_failed"
        );
    }
    Outcome::Rejected { requeue }
}

/// Fixed-size pool of mail workers over one delivery stream.
pub struct WorkerPool<M> {
    config: WorkerPoolConfig,
    mailer: Arc<M>,
    span: Span,
}

impl<M: Mailer> WorkerPool<M> {
    pub fn new(config: WorkerPoolConfig, mailer: Arc<M>, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "worker_pool", queue = %config.queue_name);
        Self {
            config,
            mailer,
            span,
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Declare the queue, set the prefetch bound and register the consumer.
    pub async fn start(&self, channel: &Channel) -> Result<Consumer> {
        let queue = self.config.queue_name.as_str();

        channel
            .queue_declare(queue, self.config.declare_options(), FieldTable::default())
            .await
            .context("Failed to declare queue")?;

        info!(parent: &self.span, queue = queue, "rabbitmq_queue_declared");

        let prefetch_count = self.config.prefetch_count();
        channel
            .basic_qos(prefetch_count, self.config.qos_options())
            .await
            .context("Failed to set QoS")?;

        info!(parent: &self.span, prefetch_count = prefetch_count, "rabbitmq_qos_set");

        let consumer = channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                self.config.consume_options(),
                FieldTable::default(),
            )
            .await
            .context("Failed to register consumer")?;

        info!(parent: &self.span, queue = queue, "rabbitmq_consumer_started");

        Ok(consumer)
    }

    /// Start on `channel` and run until `shutdown` completes.
    pub async fn consume<F>(&self, channel: &Channel, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let consumer = self.start(channel).await?;
        self.run(consumer, shutdown).await
    }

    /// Spawn the workers over `deliveries` and wait for `shutdown`.
    ///
    /// In-flight work is not drained on shutdown: the workers are detached
    /// and end when the stream closes. If the stream closes first, every
    /// worker exits and an error is returned.
    pub async fn run<S, D, E, F>(&self, deliveries: S, shutdown: F) -> Result<()>
    where
        S: Stream<Item = Result<D, E>> + Send + Unpin + 'static,
        D: QueueDelivery,
        E: Display + Send + 'static,
        F: Future<Output = ()>,
    {
        let deliveries = Arc::new(Mutex::new(deliveries));
        let mut workers = JoinSet::new();

        for worker_id in 0..self.config.num_workers {
            let deliveries = Arc::clone(&deliveries);
            let mailer = Arc::clone(&self.mailer);
            let span = info_span!(parent: &self.span, "worker", worker_id = worker_id);

            workers.spawn(
                async move {
                    loop {
                        let next = deliveries.lock().await.next().await;
                        match next {
                            Some(Ok(delivery)) => {
                                process_delivery(mailer.as_ref(), &delivery).await;
                            }
                            Some(Err(e)) => {
                                error!(error = %e, "rabbitmq_delivery_error");
                            }
                            None => {
                                warn!("rabbitmq_consumer_closed");
                                break;
                            }
                        }
                    }
                }
                .instrument(span),
            );
        }

        info!(
            parent: &self.span,
            workers = self.config.num_workers,
            "worker_pool_ready"
        );

        tokio::pin!(shutdown);

        let stream_closed = tokio::select! {
            _ = &mut shutdown => false,
            _ = wait_all(&mut workers) => true,
        };

        if stream_closed {
            error!(parent: &self.span, "worker_pool_stream_closed");
            return Err(anyhow!(
                "delivery stream for queue {} closed",
                self.config.queue_name
            ));
        }

        workers.detach_all();
        info!(parent: &self.span, "worker_pool_stopped");
        Ok(())
    }
}

async fn wait_all(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "worker_task_failed");
        }
    }
}
