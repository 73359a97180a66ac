use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Inbound messages longer than this (in chars) are rejected.
    #[serde(default = "d_32000")]
    pub max_message_chars: usize,
    /// Base system instruction; retrieved memory is appended below it.
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    /// Case-insensitive terms rejected by the built-in moderator.
    #[serde(default)]
    pub blocked_terms: Vec<String>,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Capacity of the per-turn event channel.
    #[serde(default = "d_64")]
    pub event_buffer: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 32_000,
            system_prompt: d_system_prompt(),
            blocked_terms: Vec::new(),
            temperature: 0.7,
            event_buffer: 64,
        }
    }
}

fn d_32000() -> usize {
    32_000
}
fn d_system_prompt() -> String {
    "You are Aspendos, a helpful assistant. Answer clearly and concisely.".into()
}
fn d_temperature() -> f32 {
    0.7
}
fn d_64() -> usize {
    64
}
