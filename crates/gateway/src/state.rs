use std::sync::Arc;

use asp_domain::config::Config;
use asp_memory::{MemoryBackend, MemoryDecisionAgent};
use asp_providers::{FeatureHealthTracker, LlmProvider, ModelRegistry, ModelRouter};

use crate::runtime::{CommitmentDetector, EnrichmentPool, IdempotencyGuard, Moderator};
use crate::store::{BillingStore, ChatStore, MessageStore};

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, model registry, health tracker, router, LLM
/// - **Memory**: backend, decision agent, commitment detector
/// - **Stores**: chats, messages, billing
/// - **Turn pipeline**: idempotency guard, moderator, enrichment pool
///
/// The health tracker and idempotency guard are process-wide: every clone
/// of the state shares the same instance.
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub registry: Arc<ModelRegistry>,
    pub health: Arc<FeatureHealthTracker>,
    pub router: Arc<ModelRouter>,
    pub llm: Arc<dyn LlmProvider>,

    // ── Memory ────────────────────────────────────────────────────────
    pub memory: Arc<dyn MemoryBackend>,
    pub decisions: Arc<MemoryDecisionAgent>,
    pub commitments: Arc<CommitmentDetector>,

    // ── Stores ────────────────────────────────────────────────────────
    pub chats: Arc<dyn ChatStore>,
    pub messages: Arc<dyn MessageStore>,
    pub billing: Arc<dyn BillingStore>,

    // ── Turn pipeline ─────────────────────────────────────────────────
    pub idempotency: Arc<IdempotencyGuard>,
    pub moderator: Arc<dyn Moderator>,
    pub enrichment: Arc<EnrichmentPool>,
}
