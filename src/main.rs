//! Errorstack server - Binary Entry Point
//!
//! Reads configuration from the environment, then serves the HTTP API
//! until Ctrl-C.

use std::sync::Arc;

use errorstack::api::{serve, AppState, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(
        version = errorstack::VERSION,
        bind_addr = %config.bind_addr,
        bulk_batch_size = config.store.bulk_batch_size,
        "Starting errorstack"
    );

    let state = Arc::new(AppState::new(config.store.clone()));
    serve(&config, state, shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }
}
