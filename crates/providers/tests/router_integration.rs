//! Router + health tracker working together, with a controlled clock.
//!
//! No network: the router only consults the registry and the tracker.

use asp_domain::billing::Tier;
use asp_domain::config::{HealthConfig, LlmConfig, ModelEntry, ModelPricing};
use asp_providers::health::{model_capability, FeatureHealthTracker, HealthStatus};
use asp_providers::registry::ModelRegistry;
use asp_providers::router::{ModelRouter, RouteReason};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn model(id: &str, fallbacks: &[&str]) -> ModelEntry {
    ModelEntry {
        id: id.into(),
        display_name: id.into(),
        pricing: ModelPricing::default(),
        min_tier: Tier::Free,
        fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
        downgrade_to: None,
        context_window: 128_000,
    }
}

/// primary → [b, c, d]
fn setup() -> (ModelRouter, Arc<FeatureHealthTracker>) {
    let cfg = LlmConfig {
        default_model: "t/primary".into(),
        smart_routing: false,
        models: vec![
            model("t/primary", &["t/b", "t/c", "t/d"]),
            model("t/b", &[]),
            model("t/c", &[]),
            model("t/d", &[]),
        ],
        ..Default::default()
    };
    let registry = Arc::new(ModelRegistry::from_config(&cfg).unwrap());
    let health = Arc::new(FeatureHealthTracker::new(HealthConfig::default()));
    (ModelRouter::new(registry, health.clone(), false), health)
}

fn trip(health: &FeatureHealthTracker, id: &str, at: Instant) {
    let cap = model_capability(id);
    for _ in 0..10 {
        health.record_failure_at(&cap, "HTTP 502 - bad gateway", at);
    }
    assert_eq!(health.status(&cap), HealthStatus::Disabled);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failover
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn routes_to_the_only_available_chain_entry() {
    let (router, health) = setup();
    let t0 = Instant::now();
    trip(&health, "t/primary", t0);
    trip(&health, "t/b", t0);
    trip(&health, "t/d", t0);

    let out = router
        .resolve_at(Some("t/primary"), Tier::Free, "anything", t0)
        .unwrap();
    assert!(out.fallback_used);
    assert_eq!(out.model, "t/primary");
    assert_eq!(out.actual_model_id, "t/c");
    assert_eq!(out.reason, RouteReason::Fallback);
}

#[test]
fn healthy_primary_never_consults_chain() {
    let (router, health) = setup();
    let t0 = Instant::now();
    trip(&health, "t/b", t0);

    let out = router
        .resolve_at(Some("t/primary"), Tier::Free, "anything", t0)
        .unwrap();
    assert!(!out.fallback_used);
    assert_eq!(out.actual_model_id, "t/primary");
}

#[test]
fn primary_returns_after_recovery_delay() {
    let (router, health) = setup();
    let t0 = Instant::now();
    trip(&health, "t/primary", t0);

    let during = router
        .resolve_at(Some("t/primary"), Tier::Free, "q", t0 + Duration::from_secs(30))
        .unwrap();
    assert_eq!(during.actual_model_id, "t/b");

    let after = router
        .resolve_at(Some("t/primary"), Tier::Free, "q", t0 + Duration::from_secs(61))
        .unwrap();
    assert_eq!(after.actual_model_id, "t/primary");
    assert_eq!(
        health.status(&model_capability("t/primary")),
        HealthStatus::Degraded
    );
}

#[test]
fn degraded_but_enabled_model_is_still_used() {
    let (router, health) = setup();
    let cap = model_capability("t/primary");
    health.record_success(&cap, 100);
    health.record_failure(&cap, "HTTP 500");
    assert_eq!(health.status(&cap), HealthStatus::Degraded);

    let out = router.resolve(Some("t/primary"), Tier::Free, "q").unwrap();
    assert_eq!(out.actual_model_id, "t/primary");
    assert_eq!(health.list_degraded(), vec![cap]);
}
