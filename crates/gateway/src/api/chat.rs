//! Turn endpoints - the primary interface for running chat turns.
//!
//! - `POST /v1/chats/:chat_id/messages`        - non-streaming: full response
//! - `POST /v1/chats/:chat_id/messages/stream` - SSE: route, deltas, final, usage
//!
//! Admission failures are returned as plain JSON errors with a matching
//! status before any stream is opened.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::runtime::{collect, start_turn, TurnError, TurnEvent, TurnHandle, TurnInput, TurnMode};
use crate::state::AppState;

use super::identity::UserId;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// User message text.
    pub content: String,
    /// Optional model override (e.g. "anthropic/claude-sonnet-4.5").
    #[serde(default)]
    pub model: Option<String>,
    /// Used when the `Idempotency-Key` header is absent.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl SendMessageRequest {
    fn into_input(self, user_id: String, chat_id: Uuid, headers: &HeaderMap, mode: TurnMode) -> TurnInput {
        let header_key = headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        TurnInput {
            user_id,
            chat_id,
            content: self.content,
            model: self.model,
            idempotency_key: header_key.or(self.idempotency_key),
            mode,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chats/:chat_id/messages (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn send_message(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    let input = body.into_input(user, chat_id, &headers, TurnMode::Blocking);
    let TurnHandle {
        turn_id,
        user_message_id,
        route,
        memory_decision,
        rx,
    } = match start_turn(&state, input).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    let turn = match collect(rx).await {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };
    let Some(message_id) = turn.message_id else {
        return TurnError::PersistenceFailed("turn ended without an assistant message".into())
            .into_response();
    };

    Json(serde_json::json!({
        "turn_id": turn_id,
        "chat_id": chat_id,
        "user_message_id": user_message_id,
        "message_id": message_id,
        "content": turn.content,
        "model": turn.model,
        "route": route,
        "memory_decision": memory_decision,
        "usage": turn.usage,
        "degraded_features": state.health.list_degraded(),
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chats/:chat_id/messages/stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn send_message_stream(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    let input = body.into_input(user, chat_id, &headers, TurnMode::Streaming);
    let handle = match start_turn(&state, input).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    let meta = serde_json::json!({
        "turn_id": handle.turn_id,
        "chat_id": chat_id,
        "user_message_id": handle.user_message_id,
        "route": handle.route,
        "memory_decision": handle.memory_decision,
    });
    Sse::new(make_sse_stream(meta, handle.rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// A `turn` metadata event first, then one event per [`TurnEvent`].
/// Dropping the stream drops the receiver, which the generation task sees
/// as a disconnect.
fn make_sse_stream(
    meta: serde_json::Value,
    mut rx: mpsc::Receiver<TurnEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        yield Ok(Event::default().event("turn").data(meta.to_string()));
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event.event_name()).data(data));
        }
    }
}
