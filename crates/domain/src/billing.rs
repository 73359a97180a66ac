//! Billing account snapshots and the append-only usage ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Subscription tier. Ordered: `Free < Pro < Ultra`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Ultra,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Ultra => "ultra",
        }
    }

    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Pro, Tier::Ultra];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "ultra" => Ok(Tier::Ultra),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Account snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Point-in-time view of a user's billing state.
#[derive(Debug, Clone, Serialize)]
pub struct BillingAccount {
    pub user_id: String,
    pub tier: Tier,
    /// `YYYY-MM` of the current monthly window.
    pub period: String,
    pub monthly_token_budget: u64,
    pub tokens_used: u64,
    pub chats_remaining: u64,
    pub daily_spend_usd: f64,
    pub daily_cost_ceiling_usd: f64,
}

impl BillingAccount {
    pub fn tokens_remaining(&self) -> u64 {
        self.monthly_token_budget.saturating_sub(self.tokens_used)
    }
}

/// Result of a daily spend ceiling check.
#[derive(Debug, Clone, PartialEq)]
pub struct CostCeilingCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl CostCeilingCheck {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage ledger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageKind {
    /// One chat turn consumed from the monthly allowance.
    Chat,
    /// Metered model tokens.
    Tokens {
        model_id: String,
        tokens_in: u32,
        tokens_out: u32,
        cost_usd: f64,
    },
}

/// One append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    pub user_id: String,
    #[serde(flatten)]
    pub kind: UsageKind,
    pub recorded_at: DateTime<Utc>,
}
