use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the status store is not answering or the
    /// process runs on the in-memory store.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// `networked` or `memory`.
    pub store_mode: &'static str,
    /// Whether the current store answered a ping.
    pub store_healthy: bool,
}

/// GET /health -- service and status store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.store.current().await;
    let store_healthy = store.ping().await.is_ok();
    let degraded = store.is_degraded() || !store_healthy;

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        store_mode: store.mode().as_str(),
        store_healthy,
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
