//! Chat and stored-message records.
//!
//! These are the rows the message/chat stores hand back. Persistence
//! schemas belong to the store implementations; this module only fixes
//! the shape the turn pipeline and API agree on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, Role};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    /// Model used when a turn does not name one.
    pub model_id: Option<String>,
    pub archived: bool,
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            title: title.into(),
            model_id: None,
            archived: false,
            share_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stored messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl From<MessageRole> for Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
        }
    }
}

/// A persisted chat message. Immutable after creation except `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// Model that actually produced the message (assistant only).
    pub model_used: Option<String>,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub cost_usd: Option<f64>,
    /// Free-form metadata: feedback, memory decision, routing trace.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_model_message(&self) -> Message {
        Message {
            role: self.role.into(),
            content: self.content.clone(),
        }
    }
}

/// Input for `MessageStore::create_message`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub model_used: Option<String>,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub cost_usd: Option<f64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewMessage {
    pub fn user(chat_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            chat_id,
            role: MessageRole::User,
            content: content.into(),
            model_used: None,
            tokens_in: None,
            tokens_out: None,
            cost_usd: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// One page of messages plus the cursor for the next page.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<StoredMessage>,
    /// Id of the last message in this page when more remain.
    pub next_cursor: Option<Uuid>,
}

/// Thumbs-up / thumbs-down feedback merged into message metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Up,
    Down,
}
