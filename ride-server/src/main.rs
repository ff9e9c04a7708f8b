//! RideSync Server
//!
//! Ride tick loop, simulated video player and REST/SSE API

use anyhow::{Context, Result};
use ride_server::{api, config::ServerConfig, manager, state};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting RideSync Server");

    let config = ServerConfig::load().context("loading configuration")?;
    let port = config.port;

    // Create application state
    let state = state::AppState::new(config);

    // Build the router
    let app = api::create_router(state.clone());

    // Start adapter manager in background
    tokio::spawn(manager::run(state.clone()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
