use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Feature health (circuit breaker) thresholds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Number of recent latency samples kept per capability, and the
    /// denominator cap for the error-rate approximation.
    #[serde(default = "d_100")]
    pub window_size: usize,
    /// Error rate above which a healthy capability becomes degraded.
    #[serde(default = "d_degraded_rate")]
    pub degraded_error_rate: f64,
    /// p99 latency above which a healthy capability becomes degraded.
    #[serde(default = "d_5000")]
    pub degraded_p99_ms: u64,
    /// Error rate above which a degraded capability is disabled.
    #[serde(default = "d_disabled_rate")]
    pub disabled_error_rate: f64,
    /// p99 latency above which a degraded capability is disabled.
    #[serde(default = "d_7500")]
    pub disabled_p99_ms: u64,
    /// Samples required before a capability may be disabled.
    #[serde(default = "d_10")]
    pub min_samples: u64,
    /// How long a disabled capability stays closed before a probe.
    #[serde(default = "d_60")]
    pub recovery_after_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            degraded_error_rate: 0.10,
            degraded_p99_ms: 5_000,
            disabled_error_rate: 0.20,
            disabled_p99_ms: 7_500,
            min_samples: 10,
            recovery_after_secs: 60,
        }
    }
}

fn d_100() -> usize {
    100
}
fn d_degraded_rate() -> f64 {
    0.10
}
fn d_5000() -> u64 {
    5_000
}
fn d_disabled_rate() -> f64 {
    0.20
}
fn d_7500() -> u64 {
    7_500
}
fn d_10() -> u64 {
    10
}
fn d_60() -> u64 {
    60
}
