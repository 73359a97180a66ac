//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! [`build_app_state`] wires the production collaborators (OpenRouter
//! adapter, configured memory backend, in-memory stores). [`assemble`] takes
//! the collaborators explicitly so tests and embedders can swap any of them.

use std::sync::Arc;

use anyhow::Context;

use asp_domain::config::{Config, ConfigSeverity};
use asp_memory::{create_backend, MemoryBackend, MemoryDecisionAgent};
use asp_providers::{FeatureHealthTracker, LlmProvider, ModelRegistry, ModelRouter, OpenAiCompatProvider};

use crate::runtime::{BlocklistModerator, CommitmentDetector, EnrichmentPool, IdempotencyGuard, Moderator};
use crate::state::AppState;
use crate::store::{
    BillingStore, ChatStore, InMemoryBillingStore, InMemoryChatStore, InMemoryMessageStore,
    MessageStore,
};

/// The swappable seams of the pipeline.
pub struct Collaborators {
    pub llm: Arc<dyn LlmProvider>,
    pub memory: Arc<dyn MemoryBackend>,
    pub chats: Arc<dyn ChatStore>,
    pub messages: Arc<dyn MessageStore>,
    pub billing: Arc<dyn BillingStore>,
    /// `None` uses the `turn.blocked_terms` blocklist.
    pub moderator: Option<Arc<dyn Moderator>>,
}

impl Collaborators {
    /// In-memory stores around the given generation and memory backends.
    pub fn in_memory(
        config: &Config,
        llm: Arc<dyn LlmProvider>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        Self {
            llm,
            memory,
            chats: Arc::new(InMemoryChatStore::new()),
            messages: Arc::new(InMemoryMessageStore::new()),
            billing: Arc::new(InMemoryBillingStore::new(config.quota.clone())),
            moderator: None,
        }
    }
}

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`]. This is the boot path used by `serve`.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Generation ───────────────────────────────────────────────────
    let llm = OpenAiCompatProvider::from_config(&config.llm).with_context(|| {
        format!(
            "initializing LLM provider (is {} set?)",
            config.llm.api_key_env
        )
    })?;
    tracing::info!(base_url = %config.llm.base_url, "LLM provider ready");

    // ── Memory backend ───────────────────────────────────────────────
    let memory = create_backend(&config.memory).context("initializing memory backend")?;

    let collaborators = Collaborators::in_memory(&config, Arc::new(llm), memory);
    assemble(config, collaborators)
}

/// Build the process-wide services around the given collaborators.
///
/// Spawns the enrichment workers, so it must run inside a tokio runtime.
pub fn assemble(config: Arc<Config>, c: Collaborators) -> anyhow::Result<AppState> {
    let registry =
        Arc::new(ModelRegistry::from_config(&config.llm).context("building model registry")?);
    tracing::info!(
        models = registry.list().count(),
        default = %registry.default_model(),
        "model registry loaded"
    );

    let health = Arc::new(FeatureHealthTracker::new(config.health.clone()));
    let router = Arc::new(ModelRouter::new(
        registry.clone(),
        health.clone(),
        config.llm.smart_routing,
    ));

    let decisions =
        Arc::new(MemoryDecisionAgent::new().context("compiling memory decision rules")?);
    let commitments =
        Arc::new(CommitmentDetector::new().context("compiling commitment patterns")?);

    let moderator: Arc<dyn Moderator> = match c.moderator {
        Some(m) => m,
        None => Arc::new(
            BlocklistModerator::new(&config.turn.blocked_terms)
                .context("compiling turn.blocked_terms")?,
        ),
    };

    let enrichment = Arc::new(
        EnrichmentPool::start(&config.enrichment, c.memory.clone())
            .context("starting enrichment pool")?,
    );

    Ok(AppState {
        idempotency: Arc::new(IdempotencyGuard::new(&config.idempotency)),
        config,
        registry,
        health,
        router,
        llm: c.llm,
        memory: c.memory,
        decisions,
        commitments,
        chats: c.chats,
        messages: c.messages,
        billing: c.billing,
        moderator,
        enrichment,
    })
}

/// Spawn the long-running background tokio tasks (idempotency sweep).
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic idempotency sweep ───────────────────────────────────
    {
        let guard = state.idempotency.clone();
        let every = std::time::Duration::from_secs(state.config.idempotency.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = guard.sweep();
                if removed > 0 {
                    tracing::debug!(removed, remaining = guard.len(), "idempotency sweep");
                }
            }
        });
    }
}
