//! MeshRun Worker Daemon

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod client;
mod config;
mod error;
mod publisher;
mod runner;

use client::CoordinatorClient;
use config::Config;
use publisher::UploadPublisher;
use runner::Runner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::parse();
    let worker_id = config.resolve_worker_id();

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .map_err(|e| {
            format!(
                "Failed to create work directory '{}': {}",
                config.work_dir.display(),
                e
            )
        })?;

    info!(
        worker_id = %worker_id,
        api_base = %config.api_base,
        work_dir = %config.work_dir.display(),
        engine = ?config.engine,
        "Starting MeshRun worker"
    );

    let client = Arc::new(CoordinatorClient::new(
        &config.api_base,
        config.api_key.clone(),
        worker_id,
        config.request_timeout(),
    )?);
    let publisher = UploadPublisher::new(client.clone(), &config.work_dir);
    let runner = Runner::new(
        client,
        publisher,
        config.pipeline()?,
        config.idle_poll(),
        config.error_backoff(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown signal received, finishing current job");
            shutdown.cancel();
        }
    });

    runner.run(shutdown).await;
    Ok(())
}
