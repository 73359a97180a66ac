//! Liveness and feature-health endpoints.
//!
//! - `GET /v1/health`          - liveness probe
//! - `GET /v1/health/features` - per-capability breaker snapshot

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn features(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "features": state.health.snapshot(),
        "degraded": state.health.list_degraded(),
    }))
}
