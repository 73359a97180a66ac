//! Model router.
//!
//! Resolves the model a turn asked for into the model it will actually run
//! on. Resolution is synchronous and side-effect free apart from trace
//! events (and the half-open re-arm performed by
//! [`FeatureHealthTracker::is_available`]):
//!
//! 1. Unknown ids become the registry default.
//! 2. Simple prompts move to the model's `downgrade_to` target.
//! 3. The caller's tier must reach the model's `min_tier`.
//! 4. An unavailable model is swapped for the first fallback that is both
//!    available and allowed for the tier; with none, the model is kept.

use crate::health::{model_capability, FeatureHealthTracker};
use crate::registry::ModelRegistry;
use crate::smart_router::is_simple_query;
use asp_domain::billing::Tier;
use asp_domain::trace::TraceEvent;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("model '{model}' requires the {required} plan (current plan: {tier})")]
    ModelNotAvailableForTier {
        model: String,
        tier: Tier,
        required: Tier,
    },
}

impl RouteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelNotAvailableForTier { .. } => "MODEL_NOT_AVAILABLE_FOR_TIER",
        }
    }
}

/// Why the final model was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// The requested (or default) model, healthy.
    Requested,
    /// Downgraded for a simple prompt.
    Downgraded,
    /// Swapped to a fallback because the model was unavailable.
    Fallback,
    /// Unavailable and no usable fallback; kept anyway.
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    /// What the caller asked for, verbatim (`None` if nothing).
    pub requested: Option<String>,
    /// Model after default substitution and downgrade; the one tier-checked.
    pub model: String,
    /// Model the call is sent to.
    pub actual_model_id: String,
    pub downgraded: bool,
    pub fallback_used: bool,
    pub reason: RouteReason,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ModelRouter {
    registry: Arc<ModelRegistry>,
    health: Arc<FeatureHealthTracker>,
    smart_routing: bool,
}

impl ModelRouter {
    pub fn new(
        registry: Arc<ModelRegistry>,
        health: Arc<FeatureHealthTracker>,
        smart_routing: bool,
    ) -> Self {
        Self {
            registry,
            health,
            smart_routing,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn resolve(
        &self,
        requested: Option<&str>,
        tier: Tier,
        query: &str,
    ) -> Result<RouteOutcome, RouteError> {
        self.resolve_at(requested, tier, query, Instant::now())
    }

    pub fn resolve_at(
        &self,
        requested: Option<&str>,
        tier: Tier,
        query: &str,
        now: Instant,
    ) -> Result<RouteOutcome, RouteError> {
        // 1. Unknown → default.
        let mut model = match requested {
            Some(id) if self.registry.contains(id) => id.to_string(),
            Some(id) => {
                tracing::debug!(requested = %id, default = %self.registry.default_model(), "unknown model, using default");
                self.registry.default_model().to_string()
            }
            None => self.registry.default_model().to_string(),
        };

        // 2. Smart pre-routing.
        let mut downgraded = false;
        if self.smart_routing {
            let target = self
                .registry
                .get(&model)
                .and_then(|m| m.downgrade_to.as_deref())
                .filter(|t| self.registry.contains(t));
            if let Some(target) = target {
                if is_simple_query(query) {
                    TraceEvent::ModelDowngraded {
                        from_model: model.clone(),
                        to_model: target.to_string(),
                    }
                    .emit();
                    model = target.to_string();
                    downgraded = true;
                }
            }
        }

        // 3. Tier gate.
        if let Some(entry) = self.registry.get(&model) {
            if tier < entry.min_tier {
                return Err(RouteError::ModelNotAvailableForTier {
                    model,
                    tier,
                    required: entry.min_tier,
                });
            }
        }

        let base_reason = if downgraded {
            RouteReason::Downgraded
        } else {
            RouteReason::Requested
        };

        // 4. Health + fallbacks.
        if self.health.is_available_at(&model_capability(&model), now) {
            return Ok(RouteOutcome {
                requested: requested.map(String::from),
                actual_model_id: model.clone(),
                model,
                downgraded,
                fallback_used: false,
                reason: base_reason,
            });
        }

        for fb in self.registry.fallbacks(&model) {
            if tier < fb.min_tier {
                continue;
            }
            if !self.health.is_available_at(&model_capability(&fb.id), now) {
                continue;
            }
            tracing::warn!(from = %model, to = %fb.id, "model unavailable, routing to fallback");
            TraceEvent::LlmFallback {
                from_model: model.clone(),
                to_model: fb.id.clone(),
                reason: "capability unavailable".into(),
            }
            .emit();
            return Ok(RouteOutcome {
                requested: requested.map(String::from),
                model,
                actual_model_id: fb.id.clone(),
                downgraded,
                fallback_used: true,
                reason: RouteReason::Fallback,
            });
        }

        // 5. Whole chain down: try the model anyway.
        tracing::warn!(model = %model, "model and all fallbacks unavailable");
        Ok(RouteOutcome {
            requested: requested.map(String::from),
            actual_model_id: model.clone(),
            model,
            downgraded,
            fallback_used: false,
            reason: RouteReason::Exhausted,
        })
    }
}
