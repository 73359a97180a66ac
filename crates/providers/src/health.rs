//! Feature health tracker: a per-capability circuit breaker.
//!
//! A capability is any named dependency a turn can route around: each model
//! (`model:{id}`) and memory retrieval ([`MEMORY_SEARCH`]). State is created
//! lazily on first record and lives in a sharded map so that concurrent
//! turns touching different capabilities never contend.
//!
//! ```text
//! healthy ──▶ degraded ──▶ disabled ──(recovery delay)──▶ degraded ──▶ healthy
//!                 ▲                                          │
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! Counts are advisory; lost updates under races are accepted.

use asp_domain::config::HealthConfig;
use asp_domain::trace::TraceEvent;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Capability name for memory retrieval.
pub const MEMORY_SEARCH: &str = "memory.search";

/// Capability name for a registry model.
pub fn model_capability(model_id: &str) -> String {
    format!("model:{model_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Disabled,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Per-capability state ────────────────────────────────────────────

#[derive(Debug)]
struct CapabilityState {
    successes: u64,
    failures: u64,
    latencies: VecDeque<u64>,
    last_failure: Option<Instant>,
    last_error: Option<String>,
    status: HealthStatus,
    disabled_at: Option<Instant>,
}

impl CapabilityState {
    fn new(window: usize) -> Self {
        Self {
            successes: 0,
            failures: 0,
            latencies: VecDeque::with_capacity(window),
            last_failure: None,
            last_error: None,
            status: HealthStatus::Healthy,
            disabled_at: None,
        }
    }

    fn total(&self) -> u64 {
        self.successes + self.failures
    }

    fn error_rate(&self, window: usize) -> f64 {
        let denom = self.total().min(window as u64);
        if denom == 0 {
            return 0.0;
        }
        self.failures as f64 / denom as f64
    }

    fn p99(&self) -> u64 {
        if self.latencies.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.latencies.iter().copied().collect();
        sorted.sort_unstable();
        let idx = (0.99 * sorted.len() as f64).ceil() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Back to half-open after the recovery delay.
    fn rearm(&mut self) {
        self.successes = 0;
        self.failures = 0;
        self.latencies.clear();
        self.status = HealthStatus::Degraded;
        self.disabled_at = None;
    }
}

/// Point-in-time view of one capability, for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub capability: String,
    pub status: HealthStatus,
    pub successes: u64,
    pub failures: u64,
    pub error_rate: f64,
    pub p99_ms: u64,
    pub last_error: Option<String>,
    /// Seconds since the last recorded failure.
    pub last_failure_secs_ago: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tracker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FeatureHealthTracker {
    cfg: HealthConfig,
    states: DashMap<String, CapabilityState>,
}

impl FeatureHealthTracker {
    pub fn new(cfg: HealthConfig) -> Self {
        Self {
            cfg,
            states: DashMap::new(),
        }
    }

    fn window(&self) -> usize {
        self.cfg.window_size.max(1)
    }

    // ── Recording ───────────────────────────────────────────────────

    pub fn record_success(&self, capability: &str, latency_ms: u64) {
        self.record_success_at(capability, latency_ms, Instant::now());
    }

    pub fn record_success_at(&self, capability: &str, latency_ms: u64, _now: Instant) {
        let window = self.window();
        let mut state = self
            .states
            .entry(capability.to_string())
            .or_insert_with(|| CapabilityState::new(window));

        state.successes += 1;
        if state.latencies.len() == window {
            state.latencies.pop_front();
        }
        state.latencies.push_back(latency_ms);

        if state.status == HealthStatus::Degraded {
            let rate = state.error_rate(window);
            let p99 = state.p99();
            if rate <= self.cfg.degraded_error_rate && p99 <= self.cfg.degraded_p99_ms {
                state.status = HealthStatus::Healthy;
                transition(capability, HealthStatus::Degraded, HealthStatus::Healthy, rate, p99);
            }
        }
    }

    pub fn record_failure(&self, capability: &str, error: &str) {
        self.record_failure_at(capability, error, Instant::now());
    }

    pub fn record_failure_at(&self, capability: &str, error: &str, now: Instant) {
        let window = self.window();
        let mut state = self
            .states
            .entry(capability.to_string())
            .or_insert_with(|| CapabilityState::new(window));

        state.failures += 1;
        state.last_failure = Some(now);
        state.last_error = Some(error.to_string());

        if state.status == HealthStatus::Disabled {
            return;
        }

        let rate = state.error_rate(window);
        let p99 = state.p99();

        if state.status == HealthStatus::Healthy
            && (rate > self.cfg.degraded_error_rate || p99 > self.cfg.degraded_p99_ms)
        {
            state.status = HealthStatus::Degraded;
            transition(capability, HealthStatus::Healthy, HealthStatus::Degraded, rate, p99);
        }

        if state.status == HealthStatus::Degraded
            && state.total() >= self.cfg.min_samples
            && (rate > self.cfg.disabled_error_rate || p99 > self.cfg.disabled_p99_ms)
        {
            state.status = HealthStatus::Disabled;
            state.disabled_at = Some(now);
            transition(capability, HealthStatus::Degraded, HealthStatus::Disabled, rate, p99);
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Whether a turn may use `capability` right now. Unknown capabilities
    /// are available. A disabled capability whose recovery delay has passed
    /// is re-armed as degraded with empty counts and reported available.
    pub fn is_available(&self, capability: &str) -> bool {
        self.is_available_at(capability, Instant::now())
    }

    pub fn is_available_at(&self, capability: &str, now: Instant) -> bool {
        let Some(mut state) = self.states.get_mut(capability) else {
            return true;
        };
        if state.status != HealthStatus::Disabled {
            return true;
        }
        let recovery = Duration::from_secs(self.cfg.recovery_after_secs);
        let elapsed = state
            .disabled_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::MAX);
        if elapsed < recovery {
            return false;
        }
        state.rearm();
        transition(capability, HealthStatus::Disabled, HealthStatus::Degraded, 0.0, 0);
        true
    }

    pub fn status(&self, capability: &str) -> HealthStatus {
        self.states
            .get(capability)
            .map(|s| s.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Capabilities currently degraded or disabled, sorted by name.
    pub fn list_degraded(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .states
            .iter()
            .filter(|e| e.status != HealthStatus::Healthy)
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }

    pub fn snapshot(&self) -> Vec<HealthSnapshot> {
        let window = self.window();
        let now = Instant::now();
        let mut out: Vec<HealthSnapshot> = self
            .states
            .iter()
            .map(|e| HealthSnapshot {
                capability: e.key().clone(),
                status: e.status,
                successes: e.successes,
                failures: e.failures,
                error_rate: e.error_rate(window),
                p99_ms: e.p99(),
                last_error: e.last_error.clone(),
                last_failure_secs_ago: e
                    .last_failure
                    .map(|t| now.saturating_duration_since(t).as_secs()),
            })
            .collect();
        out.sort_by(|a, b| a.capability.cmp(&b.capability));
        out
    }

    /// Current p99 latency for `capability`; 0 when nothing was recorded.
    pub fn p99_ms(&self, capability: &str) -> u64 {
        self.states.get(capability).map(|s| s.p99()).unwrap_or(0)
    }

    pub fn error_rate(&self, capability: &str) -> f64 {
        let window = self.window();
        self.states
            .get(capability)
            .map(|s| s.error_rate(window))
            .unwrap_or(0.0)
    }
}

fn transition(capability: &str, from: HealthStatus, to: HealthStatus, error_rate: f64, p99_ms: u64) {
    if to == HealthStatus::Healthy {
        tracing::info!(capability, %from, %to, "capability recovered");
    } else {
        tracing::warn!(capability, %from, %to, error_rate, p99_ms, "capability health changed");
    }
    TraceEvent::HealthTransition {
        capability: capability.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        error_rate,
        p99_ms,
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: &str = "model:openai/gpt-5.2";

    fn tracker() -> FeatureHealthTracker {
        FeatureHealthTracker::new(HealthConfig::default())
    }

    #[test]
    fn unknown_capability_is_healthy_and_available() {
        let t = tracker();
        assert!(t.is_available("never-seen"));
        assert_eq!(t.status("never-seen"), HealthStatus::Healthy);
        assert!(t.list_degraded().is_empty());
    }

    #[test]
    fn eight_successes_three_failures_not_healthy() {
        let t = tracker();
        for _ in 0..8 {
            t.record_success(CAP, 100);
        }
        for _ in 0..3 {
            t.record_failure(CAP, "HTTP 503");
        }
        assert_ne!(t.status(CAP), HealthStatus::Healthy);
        assert_eq!(t.list_degraded(), vec![CAP.to_string()]);
    }

    #[test]
    fn five_successes_eight_failures_disables() {
        let t = tracker();
        let now = Instant::now();
        for _ in 0..5 {
            t.record_success_at(CAP, 100, now);
        }
        for _ in 0..8 {
            t.record_failure_at(CAP, "HTTP 503", now);
        }
        assert_eq!(t.status(CAP), HealthStatus::Disabled);
        assert!(!t.is_available_at(CAP, now));
    }

    #[test]
    fn half_open_after_recovery_delay() {
        let t = tracker();
        let t0 = Instant::now();
        for _ in 0..5 {
            t.record_success_at(CAP, 100, t0);
        }
        for _ in 0..8 {
            t.record_failure_at(CAP, "boom", t0);
        }
        assert!(!t.is_available_at(CAP, t0 + Duration::from_secs(30)));
        assert_eq!(t.status(CAP), HealthStatus::Disabled);

        assert!(t.is_available_at(CAP, t0 + Duration::from_secs(61)));
        assert_eq!(t.status(CAP), HealthStatus::Degraded);
        let snap = t.snapshot();
        assert_eq!(snap[0].successes, 0);
        assert_eq!(snap[0].failures, 0);
        assert_eq!(snap[0].p99_ms, 0);
    }

    #[test]
    fn degraded_recovers_on_good_success() {
        let t = tracker();
        t.record_success(CAP, 100);
        t.record_failure(CAP, "blip");
        assert_eq!(t.status(CAP), HealthStatus::Degraded);
        // 1 failure in 11 is 9%: back under the degraded threshold.
        for _ in 0..9 {
            t.record_success(CAP, 100);
        }
        assert_eq!(t.status(CAP), HealthStatus::Healthy);
    }

    #[test]
    fn list_degraded_names_only_unhealthy_capabilities() {
        let t = tracker();
        let other = "memory_search";
        for _ in 0..20 {
            t.record_success(other, 40);
        }
        t.record_success(CAP, 100);
        t.record_failure(CAP, "blip");
        assert_eq!(t.list_degraded(), vec![CAP.to_string()]);

        for _ in 0..9 {
            t.record_success(CAP, 100);
        }
        assert_eq!(t.status(other), HealthStatus::Healthy);
        assert!(t.list_degraded().is_empty());
    }

    #[test]
    fn p99_picks_the_outlier() {
        let t = tracker();
        for _ in 0..99 {
            t.record_success(CAP, 50);
        }
        t.record_success(CAP, 6_000);
        assert_eq!(t.p99_ms(CAP), 6_000);
    }

    #[test]
    fn p99_of_empty_window_is_zero() {
        let t = tracker();
        assert_eq!(t.p99_ms(CAP), 0);
        t.record_failure(CAP, "no latency recorded for failures");
        assert_eq!(t.p99_ms(CAP), 0);
    }

    #[test]
    fn latency_window_is_bounded() {
        let t = tracker();
        t.record_success(CAP, 9_000);
        for _ in 0..100 {
            t.record_success(CAP, 10);
        }
        // The 9s sample has been evicted.
        assert_eq!(t.p99_ms(CAP), 10);
    }

    #[test]
    fn error_rate_denominator_is_capped_at_window() {
        let t = tracker();
        for _ in 0..200 {
            t.record_success(CAP, 10);
        }
        t.record_failure(CAP, "x");
        // 1 / min(201, 100)
        assert!((t.error_rate(CAP) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn disabled_ignores_further_failures() {
        let t = tracker();
        let t0 = Instant::now();
        for _ in 0..10 {
            t.record_failure_at(CAP, "down", t0);
        }
        assert_eq!(t.status(CAP), HealthStatus::Disabled);
        // A later failure must not push the recovery deadline out.
        t.record_failure_at(CAP, "down", t0 + Duration::from_secs(50));
        assert!(t.is_available_at(CAP, t0 + Duration::from_secs(61)));
    }

    #[test]
    fn latency_alone_degrades() {
        let t = tracker();
        for _ in 0..20 {
            t.record_success(CAP, 5_500);
        }
        assert_eq!(t.status(CAP), HealthStatus::Healthy);
        t.record_failure(CAP, "slow");
        assert_ne!(t.status(CAP), HealthStatus::Healthy);
    }
}
