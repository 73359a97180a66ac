//! `GET /v1/billing/usage` - account snapshot plus recent ledger rows.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::state::AppState;

use super::identity::UserId;
use super::store_error;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn usage(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(q): Query<UsageQuery>,
) -> Response {
    let account = match state.billing.account(&user).await {
        Ok(a) => a,
        Err(e) => return store_error(e),
    };
    match state.billing.ledger(&user, q.limit.min(1_000)).await {
        Ok(ledger) => Json(serde_json::json!({
            "tokens_remaining": account.tokens_remaining(),
            "account": account,
            "ledger": ledger,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}
