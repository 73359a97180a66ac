//! Offline inspection commands: `classify` and `route`.
//!
//! Both run the same components a live turn uses, against a fresh health
//! tracker, and print JSON to stdout.

use std::sync::Arc;

use anyhow::Context;

use asp_domain::billing::Tier;
use asp_domain::config::Config;
use asp_memory::MemoryDecisionAgent;
use asp_providers::{FeatureHealthTracker, ModelRegistry, ModelRouter};

/// Memory decision for `query`, as pretty JSON.
pub fn classify(query: &str) -> anyhow::Result<String> {
    let agent = MemoryDecisionAgent::new().context("compiling memory decision rules")?;
    let decision = agent.decide("cli", query, None);
    Ok(serde_json::to_string_pretty(&decision)?)
}

/// Routing outcome (or the tier rejection) for `model`, as pretty JSON.
pub fn route(config: &Config, model: &str, tier: Tier, message: &str) -> anyhow::Result<String> {
    let registry =
        Arc::new(ModelRegistry::from_config(&config.llm).context("building model registry")?);
    let health = Arc::new(FeatureHealthTracker::new(config.health.clone()));
    let router = ModelRouter::new(registry, health, config.llm.smart_routing);

    let value = match router.resolve(Some(model), tier, message) {
        Ok(outcome) => serde_json::to_value(outcome)?,
        Err(e) => serde_json::json!({
            "error": { "code": e.code(), "message": e.to_string() }
        }),
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prints_query_type() {
        let out = classify("hello").unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["use_memory"], false);
    }

    #[test]
    fn route_reports_tier_rejection() {
        let cfg = Config::default();
        let premium = cfg
            .llm
            .models
            .iter()
            .find(|m| m.min_tier == Tier::Ultra)
            .expect("a premium model in the default registry");
        let out = route(&cfg, &premium.id, Tier::Free, "analyze this in depth").unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["error"]["code"], "MODEL_NOT_AVAILABLE_FOR_TIER");
    }

    #[test]
    fn route_unknown_model_uses_default() {
        let cfg = Config::default();
        let out = route(&cfg, "nope/unknown", Tier::Ultra, "explain why the sky is blue").unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["model"], cfg.llm.default_model.as_str());
    }
}
