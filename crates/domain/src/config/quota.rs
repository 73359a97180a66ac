use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::billing::Tier;

/// Admission-control budgets.
///
/// `plans` is keyed by tier name (`free`, `pro`, `ultra`); tiers missing
/// from it fall back to the built-in defaults in [`PlanLimits::for_tier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Smallest token estimate used for the pre-flight budget check.
    #[serde(default = "d_1000")]
    pub min_token_estimate: u64,
    /// Tier assigned to accounts the billing store has never seen.
    #[serde(default)]
    pub default_tier: Tier,
    #[serde(default)]
    pub plans: HashMap<String, PlanLimits>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            min_token_estimate: 1_000,
            default_tier: Tier::Free,
            plans: HashMap::new(),
        }
    }
}

impl QuotaConfig {
    pub fn limits_for(&self, tier: Tier) -> PlanLimits {
        self.plans
            .get(tier.as_str())
            .cloned()
            .unwrap_or_else(|| PlanLimits::for_tier(tier))
    }
}

/// Monthly and daily limits for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub monthly_chats: u64,
    pub monthly_tokens: u64,
    pub daily_cost_ceiling_usd: f64,
}

impl PlanLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                monthly_chats: 100,
                monthly_tokens: 200_000,
                daily_cost_ceiling_usd: 0.50,
            },
            Tier::Pro => Self {
                monthly_chats: 1_500,
                monthly_tokens: 5_000_000,
                daily_cost_ceiling_usd: 10.0,
            },
            Tier::Ultra => Self {
                monthly_chats: 5_000,
                monthly_tokens: 20_000_000,
                daily_cost_ceiling_usd: 50.0,
            },
        }
    }
}

fn d_1000() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_plan_uses_builtin_limits() {
        let cfg = QuotaConfig::default();
        assert_eq!(cfg.limits_for(Tier::Pro), PlanLimits::for_tier(Tier::Pro));
    }

    #[test]
    fn configured_plan_overrides_builtin() {
        let toml_str = r#"
            min_token_estimate = 500
            default_tier = "pro"

            [plans.pro]
            monthly_chats = 3
            monthly_tokens = 9000
            daily_cost_ceiling_usd = 1.5
        "#;
        let cfg: QuotaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.min_token_estimate, 500);
        assert_eq!(cfg.default_tier, Tier::Pro);
        let pro = cfg.limits_for(Tier::Pro);
        assert_eq!(pro.monthly_chats, 3);
        assert_eq!(cfg.limits_for(Tier::Free), PlanLimits::for_tier(Tier::Free));
    }
}
