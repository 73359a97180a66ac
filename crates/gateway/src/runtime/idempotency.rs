//! Best-effort, single-process deduplication of retried turn requests.
//!
//! Records live in a sharded `DashMap` so the periodic sweep never blocks
//! registration on other shards.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use asp_domain::config::IdempotencyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyCheck {
    Ok,
    /// Same key, same chat, still inside the TTL.
    Conflict,
}

struct Record {
    registered_at: Instant,
    chat_id: Uuid,
}

pub struct IdempotencyGuard {
    ttl: Duration,
    entries: DashMap<String, Record>,
}

impl IdempotencyGuard {
    pub fn new(cfg: &IdempotencyConfig) -> Self {
        Self {
            ttl: Duration::from_secs(cfg.ttl_secs),
            entries: DashMap::new(),
        }
    }

    pub fn check_and_register(&self, key: Option<&str>, chat_id: Uuid) -> IdempotencyCheck {
        self.check_and_register_at(key, chat_id, Instant::now())
    }

    /// An absent key disables the guard. A conflict leaves the stored
    /// record untouched; anything else (re)registers the key.
    pub fn check_and_register_at(
        &self,
        key: Option<&str>,
        chat_id: Uuid,
        now: Instant,
    ) -> IdempotencyCheck {
        let Some(key) = key else {
            return IdempotencyCheck::Ok;
        };
        let record = Record {
            registered_at: now,
            chat_id,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                let existing = e.get();
                let live = now.saturating_duration_since(existing.registered_at) < self.ttl;
                if live && existing.chat_id == chat_id {
                    return IdempotencyCheck::Conflict;
                }
                e.insert(record);
            }
            Entry::Vacant(v) => {
                v.insert(record);
            }
        }
        IdempotencyCheck::Ok
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop records older than the TTL. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, r| now.saturating_duration_since(r.registered_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
