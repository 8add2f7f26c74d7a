//! MeshRun Control Plane Server

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use meshrun_control_plane::config::{Config, ExecutionMode};
use meshrun_control_plane::{http, AppState};

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
    let addr: SocketAddr = config.bind_addr.parse()?;

    tokio::fs::create_dir_all(&config.assets_dir)
        .await
        .map_err(|e| {
            format!(
                "Failed to create assets directory '{}': {}",
                config.assets_dir.display(),
                e
            )
        })?;

    let pipeline = match config.mode {
        ExecutionMode::Embedded => Some(config.pipeline()?),
        ExecutionMode::Distributed => None,
    };
    if config.api_key.is_none() {
        warn!("No API key configured - worker routes are unauthenticated");
    }

    info!(
        addr = %addr,
        mode = ?config.mode,
        base_url = %config.base_url,
        assets_dir = %config.assets_dir.display(),
        "Starting MeshRun control plane"
    );

    let state = AppState::new(config, pipeline);
    let router = http::create_router(state.clone());

    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(executor) = &state.executor {
        executor.shutdown().await;
    }
    info!("Control plane stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
