//! Chat messages, ordered by creation time and paginated by cursor.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use asp_domain::chat::{MessagePage, NewMessage, StoredMessage};
use asp_domain::error::{Error, Result};

/// Page size used when the caller asks for none (or zero).
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, msg: NewMessage) -> Result<StoredMessage>;

    /// Full history of a chat, oldest first.
    async fn get_messages(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>>;

    async fn get_message(&self, message_id: Uuid) -> Result<Option<StoredMessage>>;

    /// Messages after `cursor` (the id of the last message already seen).
    async fn list_messages(
        &self,
        chat_id: Uuid,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<MessagePage>;

    /// Shallow-merge `patch` into the message's metadata.
    async fn update_metadata(
        &self,
        message_id: Uuid,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<StoredMessage>;

    /// Returns the number of messages removed.
    async fn delete_chat_messages(&self, chat_id: Uuid) -> Result<usize>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Messages grouped per chat; insertion order is creation order.
#[derive(Default)]
pub struct InMemoryMessageStore {
    by_chat: RwLock<HashMap<Uuid, Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_message(&self, msg: NewMessage) -> Result<StoredMessage> {
        let stored = StoredMessage {
            id: Uuid::new_v4(),
            chat_id: msg.chat_id,
            role: msg.role,
            content: msg.content,
            model_used: msg.model_used,
            tokens_in: msg.tokens_in,
            tokens_out: msg.tokens_out,
            cost_usd: msg.cost_usd,
            metadata: msg.metadata,
            created_at: Utc::now(),
        };
        self.by_chat
            .write()
            .entry(stored.chat_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn get_messages(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>> {
        Ok(self
            .by_chat
            .read()
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<StoredMessage>> {
        Ok(self
            .by_chat
            .read()
            .values()
            .flatten()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn list_messages(
        &self,
        chat_id: Uuid,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<MessagePage> {
        let limit = match limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let guard = self.by_chat.read();
        let all = guard.get(&chat_id).map(Vec::as_slice).unwrap_or_default();

        let start = match cursor {
            Some(id) => all
                .iter()
                .position(|m| m.id == id)
                .map(|i| i + 1)
                .ok_or_else(|| Error::NotFound(format!("cursor {id}")))?,
            None => 0,
        };

        let messages: Vec<StoredMessage> = all[start..].iter().take(limit).cloned().collect();
        let next_cursor = if start + messages.len() < all.len() {
            messages.last().map(|m| m.id)
        } else {
            None
        };
        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }

    async fn update_metadata(
        &self,
        message_id: Uuid,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<StoredMessage> {
        let mut guard = self.by_chat.write();
        let msg = guard
            .values_mut()
            .flatten()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        msg.metadata.extend(patch);
        Ok(msg.clone())
    }

    async fn delete_chat_messages(&self, chat_id: Uuid) -> Result<usize> {
        Ok(self
            .by_chat
            .write()
            .remove(&chat_id)
            .map(|v| v.len())
            .unwrap_or(0))
    }
}
