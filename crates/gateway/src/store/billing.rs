//! Per-user billing counters and the append-only usage ledger.
//!
//! [`InMemoryBillingStore`] keeps monthly chat/token counters and a daily
//! spend counter per user behind a `parking_lot::RwLock`. Monthly counters
//! reset when the UTC month changes; daily spend resets when the UTC date
//! changes. Reads never mutate: a stale window simply reads as zero usage.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parking_lot::RwLock;

use asp_domain::billing::{BillingAccount, CostCeilingCheck, Tier, UsageEntry, UsageKind};
use asp_domain::config::QuotaConfig;
use asp_domain::error::Result;

#[async_trait::async_trait]
pub trait BillingStore: Send + Sync {
    async fn account(&self, user_id: &str) -> Result<BillingAccount>;

    async fn has_chats_remaining(&self, user_id: &str) -> Result<bool>;

    /// Whether at least `estimate` tokens remain in the monthly budget.
    async fn has_tokens(&self, user_id: &str, estimate: u64) -> Result<bool>;

    async fn check_cost_ceiling(&self, user_id: &str) -> Result<CostCeilingCheck>;

    /// Consume one chat from the monthly allowance.
    async fn record_chat_usage(&self, user_id: &str) -> Result<()>;

    async fn record_token_usage(
        &self,
        user_id: &str,
        model_id: &str,
        tokens_in: u32,
        tokens_out: u32,
        cost_usd: f64,
    ) -> Result<()>;

    /// Most recent entries last, at most `limit`.
    async fn ledger(&self, user_id: &str, limit: usize) -> Result<Vec<UsageEntry>>;

    async fn set_tier(&self, user_id: &str, tier: Tier) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Month {
    year: i32,
    month: u32,
}

impl Month {
    fn of(now: DateTime<Utc>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    fn label(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Counters for one user. Windows are stamped so rollover is lazy.
struct AccountUsage {
    tier: Tier,
    month: Month,
    chats_used: u64,
    tokens_used: u64,
    day: NaiveDate,
    spend_usd: f64,
}

impl AccountUsage {
    fn fresh(tier: Tier, now: DateTime<Utc>) -> Self {
        Self {
            tier,
            month: Month::of(now),
            chats_used: 0,
            tokens_used: 0,
            day: now.date_naive(),
            spend_usd: 0.0,
        }
    }

    /// Reset whichever windows have expired.
    fn roll(&mut self, now: DateTime<Utc>) {
        let month = Month::of(now);
        if self.month != month {
            self.month = month;
            self.chats_used = 0;
            self.tokens_used = 0;
        }
        let today = now.date_naive();
        if self.day != today {
            self.day = today;
            self.spend_usd = 0.0;
        }
    }
}

pub struct InMemoryBillingStore {
    quota: QuotaConfig,
    accounts: RwLock<HashMap<String, AccountUsage>>,
    ledger: RwLock<Vec<UsageEntry>>,
}

impl InMemoryBillingStore {
    pub fn new(quota: QuotaConfig) -> Self {
        Self {
            quota,
            accounts: RwLock::new(HashMap::new()),
            ledger: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn account_at(&self, user_id: &str, now: DateTime<Utc>) -> BillingAccount {
        let accounts = self.accounts.read();
        let (tier, chats_used, tokens_used, spend) = match accounts.get(user_id) {
            Some(u) => {
                let month_live = u.month == Month::of(now);
                let day_live = u.day == now.date_naive();
                (
                    u.tier,
                    if month_live { u.chats_used } else { 0 },
                    if month_live { u.tokens_used } else { 0 },
                    if day_live { u.spend_usd } else { 0.0 },
                )
            }
            None => (self.quota.default_tier, 0, 0, 0.0),
        };
        let limits = self.quota.limits_for(tier);
        BillingAccount {
            user_id: user_id.to_string(),
            tier,
            period: Month::of(now).label(),
            monthly_token_budget: limits.monthly_tokens,
            tokens_used,
            chats_remaining: limits.monthly_chats.saturating_sub(chats_used),
            daily_spend_usd: spend,
            daily_cost_ceiling_usd: limits.daily_cost_ceiling_usd,
        }
    }

    fn with_usage<F>(&self, user_id: &str, now: DateTime<Utc>, f: F)
    where
        F: FnOnce(&mut AccountUsage),
    {
        let mut accounts = self.accounts.write();
        let usage = accounts
            .entry(user_id.to_string())
            .or_insert_with(|| AccountUsage::fresh(self.quota.default_tier, now));
        usage.roll(now);
        f(usage);
    }

    pub(crate) fn record_chat_usage_at(&self, user_id: &str, now: DateTime<Utc>) {
        self.with_usage(user_id, now, |u| u.chats_used += 1);
        self.ledger.write().push(UsageEntry {
            user_id: user_id.to_string(),
            kind: UsageKind::Chat,
            recorded_at: now,
        });
    }

    pub(crate) fn record_token_usage_at(
        &self,
        user_id: &str,
        model_id: &str,
        tokens_in: u32,
        tokens_out: u32,
        cost_usd: f64,
        now: DateTime<Utc>,
    ) {
        self.with_usage(user_id, now, |u| {
            u.tokens_used += u64::from(tokens_in) + u64::from(tokens_out);
            u.spend_usd += cost_usd;
        });
        self.ledger.write().push(UsageEntry {
            user_id: user_id.to_string(),
            kind: UsageKind::Tokens {
                model_id: model_id.to_string(),
                tokens_in,
                tokens_out,
                cost_usd,
            },
            recorded_at: now,
        });
    }
}

#[async_trait::async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn account(&self, user_id: &str) -> Result<BillingAccount> {
        Ok(self.account_at(user_id, Utc::now()))
    }

    async fn has_chats_remaining(&self, user_id: &str) -> Result<bool> {
        Ok(self.account_at(user_id, Utc::now()).chats_remaining > 0)
    }

    async fn has_tokens(&self, user_id: &str, estimate: u64) -> Result<bool> {
        Ok(self.account_at(user_id, Utc::now()).tokens_remaining() >= estimate)
    }

    async fn check_cost_ceiling(&self, user_id: &str) -> Result<CostCeilingCheck> {
        let acct = self.account_at(user_id, Utc::now());
        if acct.daily_spend_usd >= acct.daily_cost_ceiling_usd {
            return Ok(CostCeilingCheck::denied(format!(
                "daily spend ${:.2} has reached the ${:.2} ceiling",
                acct.daily_spend_usd, acct.daily_cost_ceiling_usd
            )));
        }
        Ok(CostCeilingCheck::allowed())
    }

    async fn record_chat_usage(&self, user_id: &str) -> Result<()> {
        self.record_chat_usage_at(user_id, Utc::now());
        Ok(())
    }

    async fn record_token_usage(
        &self,
        user_id: &str,
        model_id: &str,
        tokens_in: u32,
        tokens_out: u32,
        cost_usd: f64,
    ) -> Result<()> {
        self.record_token_usage_at(user_id, model_id, tokens_in, tokens_out, cost_usd, Utc::now());
        Ok(())
    }

    async fn ledger(&self, user_id: &str, limit: usize) -> Result<Vec<UsageEntry>> {
        let ledger = self.ledger.read();
        let mine: Vec<&UsageEntry> = ledger.iter().filter(|e| e.user_id == user_id).collect();
        let skip = mine.len().saturating_sub(limit);
        Ok(mine.into_iter().skip(skip).cloned().collect())
    }

    async fn set_tier(&self, user_id: &str, tier: Tier) -> Result<()> {
        self.with_usage(user_id, Utc::now(), |u| u.tier = tier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asp_domain::config::PlanLimits;
    use chrono::TimeZone;

    fn tiny_plan() -> QuotaConfig {
        let mut cfg = QuotaConfig::default();
        cfg.plans.insert(
            "free".into(),
            PlanLimits {
                monthly_chats: 2,
                monthly_tokens: 1_000,
                daily_cost_ceiling_usd: 0.10,
            },
        );
        cfg
    }

    #[tokio::test]
    async fn unknown_user_gets_default_tier_and_full_budget() {
        let store = InMemoryBillingStore::new(tiny_plan());
        let acct = store.account("nobody").await.unwrap();
        assert_eq!(acct.tier, Tier::Free);
        assert_eq!(acct.chats_remaining, 2);
        assert_eq!(acct.tokens_remaining(), 1_000);
    }

    #[tokio::test]
    async fn chat_allowance_runs_out() {
        let store = InMemoryBillingStore::new(tiny_plan());
        store.record_chat_usage("u").await.unwrap();
        assert!(store.has_chats_remaining("u").await.unwrap());
        store.record_chat_usage("u").await.unwrap();
        assert!(!store.has_chats_remaining("u").await.unwrap());
    }

    #[tokio::test]
    async fn spend_reaching_ceiling_denies() {
        let store = InMemoryBillingStore::new(tiny_plan());
        store
            .record_token_usage("u", "m", 100, 100, 0.10)
            .await
            .unwrap();
        let check = store.check_cost_ceiling("u").await.unwrap();
        assert!(!check.allowed);
        assert!(check.reason.unwrap().contains("ceiling"));
        assert!(store.has_tokens("u", 800).await.unwrap());
        assert!(!store.has_tokens("u", 801).await.unwrap());
    }

    #[test]
    fn daily_spend_rolls_over_but_month_does_not() {
        let store = InMemoryBillingStore::new(tiny_plan());
        let day1 = Utc.with_ymd_and_hms(2026, 3, 10, 23, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap();
        store.record_token_usage_at("u", "m", 10, 10, 0.05, day1);

        let next_day = store.account_at("u", day2);
        assert_eq!(next_day.daily_spend_usd, 0.0);
        assert_eq!(next_day.tokens_used, 20);
    }

    #[test]
    fn monthly_counters_roll_over() {
        let store = InMemoryBillingStore::new(tiny_plan());
        let march = Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap();
        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 1).unwrap();
        store.record_chat_usage_at("u", march);
        store.record_chat_usage_at("u", march);
        assert_eq!(store.account_at("u", march).chats_remaining, 0);

        let acct = store.account_at("u", april);
        assert_eq!(acct.chats_remaining, 2);
        assert_eq!(acct.period, "2026-04");

        store.record_chat_usage_at("u", april);
        assert_eq!(store.account_at("u", april).chats_remaining, 1);
    }

    #[tokio::test]
    async fn tier_change_switches_limits_and_ledger_is_per_user() {
        let store = InMemoryBillingStore::new(tiny_plan());
        store.set_tier("u", Tier::Pro).await.unwrap();
        let acct = store.account("u").await.unwrap();
        assert_eq!(acct.monthly_token_budget, PlanLimits::for_tier(Tier::Pro).monthly_tokens);

        store.record_chat_usage("u").await.unwrap();
        store.record_chat_usage("other").await.unwrap();
        store
            .record_token_usage("u", "openai/gpt-5.2", 5, 7, 0.01)
            .await
            .unwrap();
        let ledger = store.ledger("u", 10).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].kind, UsageKind::Chat);
        assert_eq!(store.ledger("u", 1).await.unwrap().len(), 1);
    }
}
