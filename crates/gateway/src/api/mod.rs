pub mod billing;
pub mod chat;
pub mod chats;
pub mod degraded;
pub mod health;
pub mod identity;
pub mod messages;
pub mod models;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use asp_domain::error::Error;

use crate::state::AppState;

/// Build the full API router.
///
/// Every route is wrapped in the degraded-features middleware so callers
/// can see which capabilities are currently running on a fallback.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Health
        .route("/v1/health", get(health::liveness))
        .route("/v1/health/features", get(health::features))
        // Models
        .route("/v1/models", get(models::list_models))
        // Chats
        .route("/v1/chats", post(chats::create_chat).get(chats::list_chats))
        .route(
            "/v1/chats/:chat_id",
            get(chats::get_chat)
                .patch(chats::update_chat)
                .delete(chats::delete_chat),
        )
        .route("/v1/chats/:chat_id/share", post(chats::share_chat))
        // Messages & turns
        .route(
            "/v1/chats/:chat_id/messages",
            get(chats::list_messages).post(chat::send_message),
        )
        .route(
            "/v1/chats/:chat_id/messages/stream",
            post(chat::send_message_stream),
        )
        .route(
            "/v1/messages/:message_id/feedback",
            post(messages::submit_feedback),
        )
        // Billing
        .route("/v1/billing/usage", get(billing::usage))
        .layer(middleware::from_fn_with_state(
            state,
            degraded::annotate_degraded,
        ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a JSON error in the same envelope turn errors use:
/// `{ "error": { "code", "message", "retryable": false } }`.
pub(crate) fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": {
                "code": code,
                "message": message.into(),
                "retryable": false,
            }
        })),
    )
        .into_response()
}

/// Map a store failure onto an HTTP response.
pub(crate) fn store_error(e: Error) -> Response {
    match e {
        Error::NotFound(what) => api_error(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found")),
        other => {
            tracing::error!(error = %other, "store operation failed");
            crate::runtime::TurnError::persistence(&other).into_response()
        }
    }
}
