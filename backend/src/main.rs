//! OpenGraph Mailer - RabbitMQ consumer that delivers queued mail over SMTP.
//!
//! Consumes the mail queue with a fixed number of workers. Each message is
//! validated, rendered and sent, then acknowledged or rejected depending on
//! how delivery went.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, info_span, warn};

use ogbackend::{
    telemetry, BrokerClient, Config, MailSender, SmtpCredentials, SmtpTransport, TemplateRenderer,
    WorkerPool, WorkerPoolConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let root = info_span!("og_mailer");
    info!(parent: &root, "mailer_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        parent: &root,
        queue = %config.mail_queue,
        workers = config.mailer_workers,
        smtp_host = %config.smtp_host,
        smtp_port = config.smtp_port,
        template_dir = %config.template_dir.display(),
        "config_loaded"
    );

    let credentials = SmtpCredentials::new(
        config.smtp_username.clone(),
        config.smtp_password.clone(),
        config.smtp_host.clone(),
        config.smtp_port,
    )
    .context("Invalid SMTP configuration")?;

    let templates =
        TemplateRenderer::new(&config.template_dir).context("Invalid template directory")?;

    let sender = MailSender::new(
        credentials,
        config.mail_from.clone(),
        templates,
        SmtpTransport,
        &root,
    );

    let broker = BrokerClient::connect(&config.rabbitmq_url, config.publish_timeout, &root).await?;

    let pool = WorkerPool::new(
        WorkerPoolConfig::new(config.mail_queue.clone(), config.mailer_workers),
        Arc::new(sender),
        &root,
    );

    let result = pool
        .consume(&broker.channel(), telemetry::shutdown_signal())
        .await;

    if let Err(e) = broker.close().await {
        warn!(parent: &root, error = %e, "rabbitmq_close_failed");
    }

    result?;
    info!(parent: &root, "mailer_shutdown_complete");

    Ok(())
}
