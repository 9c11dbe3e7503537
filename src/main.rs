// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crawl-Tracker engine process
//!
//! Follows one route for the local participant: reads position samples from
//! stdin, talks to the route backend, and serves progress to the UI shell.

use crawl_tracker::{
    backend::{HttpBackend, MemoryBackend, RouteBackend},
    config::Config,
    input::pump_positions,
    services::RouteEngine,
    AppState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Buffered position events between the stdin reader and the engine.
const POSITION_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        route_id = %config.route_id,
        "Starting Crawl-Tracker"
    );

    let backend: Arc<dyn RouteBackend> = match &config.offline_route_file {
        Some(path) => {
            tracing::info!(path = %path, "Using offline route fixture");
            Arc::new(MemoryBackend::load_from_file(path)?)
        }
        None => {
            tracing::info!(base_url = %config.api_base_url, "Using route backend");
            Arc::new(HttpBackend::new(
                config.api_base_url.clone(),
                config.api_token.clone(),
            ))
        }
    };

    // Platform position stream
    let (positions_tx, positions_rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = pump_positions(stdin, positions_tx).await {
            tracing::error!(error = %e, "Position input failed");
        }
    });

    let engine = RouteEngine::start(config.clone(), backend, positions_rx).await?;
    tracing::info!(stops = engine.stops().len(), "Route loaded");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        engine: engine.clone(),
    });

    // Build router
    let app = crawl_tracker::routes::create_router(state);

    // Start server (local only: the UI shell runs on the same device)
    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crawl_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
