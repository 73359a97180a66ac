//! Chat lifecycle endpoints.
//!
//! - `POST   /v1/chats`                    - create
//! - `GET    /v1/chats`                    - list the caller's chats
//! - `GET    /v1/chats/:chat_id`           - fetch one
//! - `PATCH  /v1/chats/:chat_id`           - rename / archive / preferred model
//! - `POST   /v1/chats/:chat_id/share`     - mint (or return) the share token
//! - `DELETE /v1/chats/:chat_id`           - delete, cascading to messages
//! - `GET    /v1/chats/:chat_id/messages`  - cursor-paginated history

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use asp_domain::chat::Chat;

use crate::runtime::TurnError;
use crate::state::AppState;

use super::identity::UserId;
use super::{api_error, store_error};

const DEFAULT_TITLE: &str = "New chat";
const MAX_TITLE_CHARS: usize = 200;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
    /// Preferred model for turns that do not name one.
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

/// Every field is optional; only the ones present are applied.
#[derive(Debug, Deserialize)]
pub struct UpdateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
    /// `Some(None)` (explicit `null`) clears the preference.
    #[serde(default, with = "double_option")]
    pub model_id: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub cursor: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<usize>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(d).map(Some)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ownership
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Load a chat the caller owns. Someone else's chat reads as not found.
pub(crate) async fn owned_chat(state: &AppState, chat_id: Uuid, user: &str) -> Result<Chat, Response> {
    match state.chats.get(chat_id).await {
        Ok(Some(chat)) if chat.is_owned_by(user) => Ok(chat),
        Ok(_) => Err(TurnError::ChatNotFound.into_response()),
        Err(e) => Err(store_error(e)),
    }
}

fn validate_title(title: &str) -> Result<String, Response> {
    let title = title.trim();
    if title.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "INVALID_TITLE", "title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_TITLE",
            format!("title must be at most {MAX_TITLE_CHARS} characters"),
        ));
    }
    Ok(title.to_string())
}

fn validate_model(state: &AppState, model_id: &str) -> Result<(), Response> {
    if state.registry.contains(model_id) {
        return Ok(());
    }
    Err(api_error(
        StatusCode::BAD_REQUEST,
        "UNKNOWN_MODEL",
        format!("model '{model_id}' is not in the registry"),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_chat(
    State(state): State<AppState>,
    UserId(user): UserId,
    Json(body): Json<CreateChatRequest>,
) -> Response {
    let title = match body.title.as_deref() {
        Some(t) => match validate_title(t) {
            Ok(t) => t,
            Err(resp) => return resp,
        },
        None => DEFAULT_TITLE.to_string(),
    };
    if let Some(model) = body.model_id.as_deref() {
        if let Err(resp) = validate_model(&state, model) {
            return resp;
        }
    }
    match state.chats.create(&user, &title, body.model_id).await {
        Ok(chat) => {
            tracing::info!(chat_id = %chat.id, user_id = %user, "chat created");
            (StatusCode::CREATED, Json(chat)).into_response()
        }
        Err(e) => store_error(e),
    }
}

pub async fn list_chats(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(q): Query<ListChatsQuery>,
) -> Response {
    match state.chats.list_for_user(&user, q.include_archived).await {
        Ok(chats) => Json(serde_json::json!({ "chats": chats })).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn get_chat(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(chat_id): Path<Uuid>,
) -> Response {
    match owned_chat(&state, chat_id, &user).await {
        Ok(chat) => Json(chat).into_response(),
        Err(resp) => resp,
    }
}

pub async fn update_chat(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<UpdateChatRequest>,
) -> Response {
    if let Err(resp) = owned_chat(&state, chat_id, &user).await {
        return resp;
    }

    let title = match body.title.as_deref().map(validate_title).transpose() {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    if let Some(Some(model)) = body.model_id.as_ref() {
        if let Err(resp) = validate_model(&state, model) {
            return resp;
        }
    }

    let result = async {
        if let Some(title) = title {
            state.chats.rename(chat_id, &title).await?;
        }
        if let Some(archived) = body.archived {
            state.chats.set_archived(chat_id, archived).await?;
        }
        if let Some(model) = body.model_id {
            state.chats.set_preferred_model(chat_id, model).await?;
        }
        state.chats.get(chat_id).await
    }
    .await;

    match result {
        Ok(Some(chat)) => Json(chat).into_response(),
        Ok(None) => TurnError::ChatNotFound.into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn share_chat(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(chat_id): Path<Uuid>,
) -> Response {
    if let Err(resp) = owned_chat(&state, chat_id, &user).await {
        return resp;
    }
    match state.chats.share(chat_id).await {
        Ok(token) => Json(serde_json::json!({
            "chat_id": chat_id,
            "share_token": token,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

/// Messages go first so a failure never leaves orphans behind a live chat.
pub async fn delete_chat(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(chat_id): Path<Uuid>,
) -> Response {
    if let Err(resp) = owned_chat(&state, chat_id, &user).await {
        return resp;
    }
    let removed = match state.messages.delete_chat_messages(chat_id).await {
        Ok(n) => n,
        Err(e) => return store_error(e),
    };
    match state.chats.delete(chat_id).await {
        Ok(_) => {
            tracing::info!(%chat_id, messages = removed, "chat deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_error(e),
    }
}

pub async fn list_messages(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(chat_id): Path<Uuid>,
    Query(q): Query<ListMessagesQuery>,
) -> Response {
    if let Err(resp) = owned_chat(&state, chat_id, &user).await {
        return resp;
    }
    match state
        .messages
        .list_messages(chat_id, q.cursor, q.limit.unwrap_or(0))
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => store_error(e),
    }
}
