//! `POST /v1/messages/:message_id/feedback` - thumbs up/down on a message.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use asp_domain::chat::FeedbackRating;

use crate::state::AppState;

use super::chats::owned_chat;
use super::identity::UserId;
use super::{api_error, store_error};

const MAX_COMMENT_CHARS: usize = 2_000;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: FeedbackRating,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Merge `{feedback: {rating, comment, submitted_at}}` into the message
/// metadata. Re-submitting replaces the previous feedback.
pub async fn submit_feedback(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(message_id): Path<Uuid>,
    Json(body): Json<FeedbackRequest>,
) -> Response {
    if body
        .comment
        .as_deref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
    {
        return api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_FEEDBACK",
            format!("comment must be at most {MAX_COMMENT_CHARS} characters"),
        );
    }

    let message = match state.messages.get_message(message_id).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            return api_error(StatusCode::NOT_FOUND, "MESSAGE_NOT_FOUND", "message not found")
        }
        Err(e) => return store_error(e),
    };
    if owned_chat(&state, message.chat_id, &user).await.is_err() {
        return api_error(StatusCode::NOT_FOUND, "MESSAGE_NOT_FOUND", "message not found");
    }

    let mut patch = serde_json::Map::new();
    patch.insert(
        "feedback".into(),
        serde_json::json!({
            "rating": body.rating,
            "comment": body.comment,
            "submitted_at": chrono::Utc::now(),
        }),
    );
    match state.messages.update_metadata(message_id, patch).await {
        Ok(updated) => {
            tracing::info!(%message_id, rating = ?body.rating, "feedback recorded");
            Json(updated).into_response()
        }
        Err(e) => store_error(e),
    }
}
