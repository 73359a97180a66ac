//! Pre-flight admission against the caller's billing account.
//!
//! Three independent, read-only checks run before any generation:
//! remaining monthly chats, remaining token budget against a conservative
//! estimate, and the daily spend ceiling. Nothing is recorded here; the
//! finalize step is the only writer.

use asp_domain::config::QuotaConfig;
use asp_domain::stream::CHARS_PER_TOKEN;

use crate::store::BillingStore;

use super::error::TurnError;

/// Conservative token estimate for an inbound message.
pub fn token_estimate(content: &str, min_estimate: u64) -> u64 {
    let by_length = (content.chars().count() / CHARS_PER_TOKEN) as u64;
    by_length.max(min_estimate)
}

/// Run the chat, token and cost checks in that order.
pub async fn admit(
    billing: &dyn BillingStore,
    quota: &QuotaConfig,
    user_id: &str,
    content: &str,
) -> Result<(), TurnError> {
    let store_err = |e: asp_domain::error::Error| TurnError::persistence(&e);

    if !billing.has_chats_remaining(user_id).await.map_err(store_err)? {
        return Err(TurnError::ChatLimitReached);
    }

    let estimate = token_estimate(content, quota.min_token_estimate);
    if !billing.has_tokens(user_id, estimate).await.map_err(store_err)? {
        return Err(TurnError::TokenLimitReached);
    }

    let ceiling = billing.check_cost_ceiling(user_id).await.map_err(store_err)?;
    if !ceiling.allowed {
        return Err(TurnError::CostCeilingReached(
            ceiling
                .reason
                .unwrap_or_else(|| "daily cost ceiling reached".into()),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBillingStore;
    use asp_domain::config::PlanLimits;

    fn quota(chats: u64, tokens: u64, ceiling: f64) -> QuotaConfig {
        let mut cfg = QuotaConfig::default();
        cfg.plans.insert(
            "free".into(),
            PlanLimits {
                monthly_chats: chats,
                monthly_tokens: tokens,
                daily_cost_ceiling_usd: ceiling,
            },
        );
        cfg
    }

    #[test]
    fn estimate_has_a_floor() {
        assert_eq!(token_estimate("short", 1_000), 1_000);
        assert_eq!(token_estimate(&"x".repeat(8_000), 1_000), 2_000);
    }

    #[tokio::test]
    async fn fresh_account_is_admitted() {
        let cfg = quota(10, 10_000, 1.0);
        let store = InMemoryBillingStore::new(cfg.clone());
        admit(&store, &cfg, "u", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn no_chats_left() {
        let cfg = quota(0, 10_000, 1.0);
        let store = InMemoryBillingStore::new(cfg.clone());
        let err = admit(&store, &cfg, "u", "hello").await.unwrap_err();
        assert_eq!(err.code(), "CHAT_LIMIT_REACHED");
    }

    #[tokio::test]
    async fn budget_below_estimate() {
        let cfg = quota(10, 999, 1.0);
        let store = InMemoryBillingStore::new(cfg.clone());
        let err = admit(&store, &cfg, "u", "hello").await.unwrap_err();
        assert_eq!(err.code(), "TOKEN_LIMIT_REACHED");
    }

    #[tokio::test]
    async fn ceiling_reached() {
        let cfg = quota(10, 10_000, 0.01);
        let store = InMemoryBillingStore::new(cfg.clone());
        store
            .record_token_usage("u", "m", 1, 1, 0.02)
            .await
            .unwrap();
        let err = admit(&store, &cfg, "u", "hello").await.unwrap_err();
        assert_eq!(err.code(), "COST_CEILING_REACHED");
    }
}
