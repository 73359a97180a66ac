use serde::{Deserialize, Serialize};

/// Idempotency guard window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// How long a registered key blocks a duplicate (seconds).
    #[serde(default = "d_600")]
    pub ttl_secs: u64,
    /// Interval of the background sweep that drops expired keys.
    #[serde(default = "d_300")]
    pub sweep_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            sweep_interval_secs: 300,
        }
    }
}

fn d_600() -> u64 {
    600
}
fn d_300() -> u64 {
    300
}
