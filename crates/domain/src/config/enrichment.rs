use serde::{Deserialize, Serialize};

use crate::billing::Tier;

/// Post-turn background work (memory extraction, self-reflection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "d_2")]
    pub workers: usize,
    /// Jobs beyond this backlog are dropped, never queued unbounded.
    #[serde(default = "d_256")]
    pub queue_capacity: usize,
    #[serde(default = "d_pro")]
    pub extraction_min_tier: Tier,
    #[serde(default = "d_ultra")]
    pub reflection_min_tier: Tier,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 256,
            extraction_min_tier: Tier::Pro,
            reflection_min_tier: Tier::Ultra,
        }
    }
}

fn d_2() -> usize {
    2
}
fn d_256() -> usize {
    256
}
fn d_pro() -> Tier {
    Tier::Pro
}
fn d_ultra() -> Tier {
    Tier::Ultra
}
