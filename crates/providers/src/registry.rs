//! Model registry.
//!
//! Immutable after startup: built from `[[llm.models]]` and shared by the
//! router (tier gates, fallbacks, downgrade targets) and finalize (pricing).

use asp_domain::billing::Tier;
use asp_domain::config::{LlmConfig, ModelEntry};
use asp_domain::error::{Error, Result};
use std::collections::HashMap;

pub struct ModelRegistry {
    models: HashMap<String, ModelEntry>,
    /// Registration order, for listings.
    order: Vec<String>,
    default_model: String,
}

impl ModelRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Fails when the default model is not registered; dangling fallback or
    /// downgrade references are logged and ignored at lookup time.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut models = HashMap::new();
        let mut order = Vec::new();
        for entry in &config.models {
            if models.insert(entry.id.clone(), entry.clone()).is_none() {
                order.push(entry.id.clone());
            } else {
                tracing::warn!(model = %entry.id, "duplicate model entry, last one wins");
            }
        }

        if !models.contains_key(&config.default_model) {
            return Err(Error::Config(format!(
                "default model '{}' is not registered",
                config.default_model
            )));
        }

        for entry in models.values() {
            for fb in entry.fallbacks.iter().chain(entry.downgrade_to.iter()) {
                if !models.contains_key(fb) {
                    tracing::warn!(model = %entry.id, target = %fb, "unknown model referenced");
                }
            }
        }

        tracing::info!(models = order.len(), default = %config.default_model, "model registry loaded");

        Ok(Self {
            models,
            order,
            default_model: config.default_model.clone(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Registered models in configuration order.
    pub fn list(&self) -> impl Iterator<Item = &ModelEntry> {
        self.order.iter().filter_map(|id| self.models.get(id))
    }

    /// Ordered substitutes for `id`, skipping ids the registry does not know.
    pub fn fallbacks(&self, id: &str) -> Vec<&ModelEntry> {
        self.models
            .get(id)
            .map(|m| m.fallbacks.iter().filter_map(|f| self.models.get(f)).collect())
            .unwrap_or_default()
    }

    pub fn allows(&self, id: &str, tier: Tier) -> bool {
        self.models.get(id).is_some_and(|m| tier >= m.min_tier)
    }

    /// Cost in USD for a finished call; unknown models cost nothing.
    pub fn estimate_cost(&self, id: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.models
            .get(id)
            .map(|m| m.pricing.estimate_cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }
}
