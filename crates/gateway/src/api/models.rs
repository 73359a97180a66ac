//! `GET /v1/models` - registry entries with their current health.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use asp_providers::health::model_capability;

use crate::state::AppState;

pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let models: Vec<serde_json::Value> = state
        .registry
        .list()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "display_name": m.display_name,
                "min_tier": m.min_tier,
                "input_cost_per_1k": m.pricing.input_per_1k,
                "output_cost_per_1k": m.pricing.output_per_1k,
                "fallbacks": m.fallbacks,
                "status": state.health.status(&model_capability(&m.id)),
            })
        })
        .collect();
    Json(serde_json::json!({
        "default_model": state.registry.default_model(),
        "models": models,
    }))
}
