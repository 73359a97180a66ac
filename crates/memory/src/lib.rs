//! `asp-memory` - long-term memory for Aspendos turns.
//!
//! Provides the [`MemoryBackend`] trait, a REST client for a remote memory
//! service ([`RestMemoryClient`]), an in-process store ([`LocalMemory`]),
//! the rule-based [`MemoryDecisionAgent`] that decides per turn whether
//! memory is worth retrieving, and the post-turn [`reflect`] heuristic.
//!
//! # Backend selection
//!
//! | `memory.base_url` | Implementation     |
//! |-------------------|--------------------|
//! | set               | `RestMemoryClient` |
//! | unset             | `LocalMemory`      |

pub mod decision;
pub mod local;
pub mod provider;
pub mod reflection;
pub mod rest;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use decision::{MemoryDecision, MemoryDecisionAgent, MemoryPolicy, QueryType};
pub use local::LocalMemory;
pub use provider::MemoryBackend;
pub use reflection::{reflect, Reflection, RetryStrategy};
pub use rest::RestMemoryClient;
pub use types::{MemoryHit, Sector};

use std::sync::Arc;

use asp_domain::config::MemoryConfig;
use asp_domain::error::Result;

/// Build the backend selected by `[memory]`.
pub fn create_backend(cfg: &MemoryConfig) -> Result<Arc<dyn MemoryBackend>> {
    match cfg.base_url.as_deref() {
        Some(url) => {
            let client = RestMemoryClient::new(url, cfg)?;
            tracing::info!(base_url = %url, "using REST memory backend");
            Ok(Arc::new(client))
        }
        None => {
            tracing::info!("memory.base_url unset; using in-process memory backend");
            Ok(Arc::new(LocalMemory::new()))
        }
    }
}
