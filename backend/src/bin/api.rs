//! OpenGraph API - Open Graph previews, page metadata and user signup.
//!
//! Signup publishes a confirmation mail to RabbitMQ and returns right away;
//! the mailer binary does the delivery.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, info_span, warn};

use ogbackend::{telemetry, web, AppState, BrokerClient, Config, OpenGraphClient, SignupService};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let root = info_span!("og_api");
    info!(parent: &root, "web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        parent: &root,
        port = config.port,
        api_path = %config.api_path,
        queue = %config.mail_queue,
        "config_loaded"
    );

    let broker = BrokerClient::connect(&config.rabbitmq_url, config.publish_timeout, &root).await?;

    let signup = SignupService::new(Arc::new(broker.publisher()), config.mail_from.clone(), &root);
    let opengraph = OpenGraphClient::new(config.opengraph_timeout, &root)
        .context("Failed to build HTTP client")?;

    let port = config.port;
    let grace = config.shutdown_grace_period;
    let state = AppState::new(config, signup, opengraph).context("Invalid OpenAPI document")?;
    let app = web::router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(parent: &root, address = %addr, "web_server_listening");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    telemetry::shutdown_signal().await;
    info!(parent: &root, "web_server_shutting_down");
    let _ = stop_tx.send(());

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined.context("Server task failed")?.context("Server error")?,
        Err(_) => warn!(parent: &root, grace_ms = grace.as_millis() as u64, "web_server_grace_period_elapsed"),
    }

    // Close broker connection
    if let Err(e) = broker.close().await {
        warn!(parent: &root, error = %e, "rabbitmq_close_failed");
    }

    info!(parent: &root, "web_server_shutdown_complete");

    Ok(())
}
