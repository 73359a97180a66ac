//! In-process memory backend.
//!
//! Used when no memory service is configured and in tests. Retrieval is
//! keyword overlap; good enough to exercise the pipeline, not a substitute
//! for the real service's semantic search.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use asp_domain::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::provider::MemoryBackend;
use crate::types::{MemoryHit, Sector};

#[derive(Debug, Clone)]
struct Entry {
    content: String,
    sector: Sector,
    terms: HashSet<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LocalMemory {
    by_user: RwLock<HashMap<String, Vec<Entry>>>,
}

impl LocalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memories stored for `user_id`.
    pub fn len_for(&self, user_id: &str) -> usize {
        self.by_user.read().get(user_id).map(Vec::len).unwrap_or(0)
    }

    /// Stored memories for `user_id` in `sector`, oldest first.
    pub fn contents_in(&self, user_id: &str, sector: Sector) -> Vec<String> {
        self.by_user
            .read()
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.sector == sector)
                    .map(|e| e.content.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Lower-cased words of three or more characters.
pub(crate) fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl MemoryBackend for LocalMemory {
    async fn search(&self, query: &str, user_id: &str, limit: u32) -> Result<Vec<MemoryHit>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let guard = self.by_user.read();
        let Some(entries) = guard.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .filter_map(|e| {
                let shared = e.terms.intersection(&query_terms).count();
                (shared > 0).then(|| (shared as f32 / query_terms.len() as f32, e))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });

        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(salience, e)| MemoryHit {
                content: e.content.clone(),
                sector: e.sector,
                salience,
            })
            .collect())
    }

    async fn add(
        &self,
        content: &str,
        user_id: &str,
        sector: Sector,
        _metadata: serde_json::Value,
    ) -> Result<()> {
        let entry = Entry {
            content: content.to_string(),
            sector,
            terms: terms(content),
            created_at: Utc::now(),
        };
        self.by_user
            .write()
            .entry(user_id.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }
}
