use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory backend connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// REST memory service. When unset, an in-process store is used.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the memory service API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_5000")]
    pub timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Maximum memories retrieved per turn.
    #[serde(default = "d_5")]
    pub search_limit: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: d_api_key_env(),
            timeout_ms: 5_000,
            max_retries: 2,
            search_limit: 5,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_api_key_env() -> String {
    "ASP_MEMORY_API_KEY".into()
}
fn d_5000() -> u64 {
    5_000
}
fn d_2() -> u32 {
    2
}
fn d_5() -> u32 {
    5
}
