//! The `MemoryBackend` trait: the seam between turns and whatever stores
//! long-term memories (REST service, in-process map, test double).

use async_trait::async_trait;
use asp_domain::error::Result;

use crate::types::{MemoryHit, Sector};

#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Memories relevant to `query` for `user_id`, best first, at most
    /// `limit` of them.
    async fn search(&self, query: &str, user_id: &str, limit: u32) -> Result<Vec<MemoryHit>>;

    /// Store one memory in `sector`.
    async fn add(
        &self,
        content: &str,
        user_id: &str,
        sector: Sector,
        metadata: serde_json::Value,
    ) -> Result<()>;
}
