// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only query surface over the shared state. Every endpoint answers 200;
// "no data yet" is expressed in the body (`null` price, WAIT signal), never as
// an HTTP error.
//
// CORS is configured permissively.
// =============================================================================

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST router with CORS + request tracing and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/bitcoin_price", get(bitcoin_price))
        .route("/trade_signal", get(trade_signal))
        // ── Diagnostics ─────────────────────────────────────────────
        .route("/health", get(health))
        .route("/status", get(status))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Queries
// =============================================================================

async fn bitcoin_price(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.latest_price())
}

async fn trade_signal(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.trade_signal())
}

// =============================================================================
// Health / status
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status())
}
