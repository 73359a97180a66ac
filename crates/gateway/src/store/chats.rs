//! Chat records: ownership, title, preferred model, archive and share state.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use asp_domain::chat::Chat;
use asp_domain::error::{Error, Result};

#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    async fn create(&self, owner_id: &str, title: &str, model_id: Option<String>) -> Result<Chat>;

    async fn get(&self, chat_id: Uuid) -> Result<Option<Chat>>;

    /// Most recently updated first. Archived chats only when asked for.
    async fn list_for_user(&self, owner_id: &str, include_archived: bool) -> Result<Vec<Chat>>;

    async fn rename(&self, chat_id: Uuid, title: &str) -> Result<Chat>;

    async fn set_archived(&self, chat_id: Uuid, archived: bool) -> Result<Chat>;

    async fn set_preferred_model(&self, chat_id: Uuid, model_id: Option<String>) -> Result<Chat>;

    /// Returns the chat's share token, minting one on first call.
    async fn share(&self, chat_id: Uuid) -> Result<String>;

    /// Returns `false` when the chat did not exist.
    async fn delete(&self, chat_id: Uuid) -> Result<bool>;

    /// Bump `updated_at` (called whenever a message is created).
    async fn touch(&self, chat_id: Uuid) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemoryChatStore {
    chats: RwLock<HashMap<Uuid, Chat>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, chat_id: Uuid, f: F) -> Result<Chat>
    where
        F: FnOnce(&mut Chat),
    {
        let mut chats = self.chats.write();
        let chat = chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::NotFound(format!("chat {chat_id}")))?;
        f(chat);
        chat.updated_at = Utc::now();
        Ok(chat.clone())
    }
}

#[async_trait::async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create(&self, owner_id: &str, title: &str, model_id: Option<String>) -> Result<Chat> {
        let mut chat = Chat::new(owner_id, title);
        chat.model_id = model_id;
        self.chats.write().insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        Ok(self.chats.read().get(&chat_id).cloned())
    }

    async fn list_for_user(&self, owner_id: &str, include_archived: bool) -> Result<Vec<Chat>> {
        let mut out: Vec<Chat> = self
            .chats
            .read()
            .values()
            .filter(|c| c.is_owned_by(owner_id))
            .filter(|c| include_archived || !c.archived)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    async fn rename(&self, chat_id: Uuid, title: &str) -> Result<Chat> {
        self.update(chat_id, |c| c.title = title.to_string())
    }

    async fn set_archived(&self, chat_id: Uuid, archived: bool) -> Result<Chat> {
        self.update(chat_id, |c| c.archived = archived)
    }

    async fn set_preferred_model(&self, chat_id: Uuid, model_id: Option<String>) -> Result<Chat> {
        self.update(chat_id, |c| c.model_id = model_id)
    }

    async fn share(&self, chat_id: Uuid) -> Result<String> {
        let chat = self.update(chat_id, |c| {
            if c.share_token.is_none() {
                c.share_token = Some(Uuid::new_v4().simple().to_string());
            }
        })?;
        chat.share_token
            .ok_or_else(|| Error::Store(format!("chat {chat_id} has no share token")))
    }

    async fn delete(&self, chat_id: Uuid) -> Result<bool> {
        Ok(self.chats.write().remove(&chat_id).is_some())
    }

    async fn touch(&self, chat_id: Uuid) -> Result<()> {
        self.update(chat_id, |_| {}).map(|_| ())
    }
}
