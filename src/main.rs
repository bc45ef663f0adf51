// =============================================================================
// BTC Signal — Main Entry Point
// =============================================================================
//
// Two concurrent activities share one `AppState`:
//   - the ingestion loop, polling the configured price source on a fixed tick
//   - the HTTP API answering /bitcoin_price and /trade_signal
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod indicators;
mod ingestion;
mod market_data;
mod runtime_config;
mod strategy;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::ingestion::IngestionLoop;
use crate::runtime_config::RuntimeConfig;

const DEFAULT_CONFIG_PATH: &str = "signal_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("BTC signal service starting up");

    let config_path =
        std::env::var("SIGNAL_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides()?;
    config.validate().context("invalid configuration")?;

    // ── 2. Shared state + price source ───────────────────────────────────
    let source = market_data::price_source::from_config(&config.source, config.request_timeout())
        .context("failed to initialise price source")?;
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config));

    // ── 3. Ingestion loop ────────────────────────────────────────────────
    tokio::spawn(IngestionLoop::new(state.clone(), source).run());

    // ── 4. API server ────────────────────────────────────────────────────
    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening. Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            warn!("Shutdown signal received — stopping gracefully");
        })
        .await
        .context("API server failed")?;

    info!("BTC signal service shut down complete.");
    Ok(())
}
