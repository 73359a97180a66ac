use serde::{Deserialize, Serialize};

use crate::billing::Tier;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM gateway + model registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible gateway that fronts every model (OpenRouter).
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the gateway API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Model used when a request names none, or names one the registry
    /// does not know.
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// Upper bound for one generation call, streaming included.
    #[serde(default = "d_60000")]
    pub request_timeout_ms: u64,
    /// Downgrade expensive models to their `downgrade_to` target for
    /// short, simple prompts.
    #[serde(default = "d_true")]
    pub smart_routing: bool,
    #[serde(default = "default_models")]
    pub models: Vec<ModelEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            default_model: d_default_model(),
            request_timeout_ms: 60_000,
            smart_routing: true,
            models: default_models(),
        }
    }
}

/// One registry entry: pricing, tier gate, and the substitutes used when
/// the model's health capability is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Full model id, `provider/model`.
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(flatten)]
    pub pricing: ModelPricing,
    /// Lowest tier allowed to use the model.
    #[serde(default)]
    pub min_tier: Tier,
    /// Ordered substitutes, consulted only when this model is unavailable.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Cheaper model used for simple prompts when smart routing is on.
    #[serde(default)]
    pub downgrade_to: Option<String>,
    #[serde(default = "d_128k")]
    pub context_window: u32,
}

/// Pricing per thousand tokens for a specific model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per 1 thousand input (prompt) tokens.
    #[serde(default, alias = "input_cost_per_1k")]
    pub input_per_1k: f64,
    /// Dollars per 1 thousand output (completion) tokens.
    #[serde(default, alias = "output_cost_per_1k")]
    pub output_per_1k: f64,
}

impl ModelPricing {
    /// Calculate estimated cost in USD for the given token counts.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_1k + output_tokens as f64 * self.output_per_1k)
            / 1_000.0
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    id: &str,
    display_name: &str,
    input_per_1k: f64,
    output_per_1k: f64,
    min_tier: Tier,
    fallbacks: &[&str],
    downgrade_to: Option<&str>,
    context_window: u32,
) -> ModelEntry {
    ModelEntry {
        id: id.into(),
        display_name: display_name.into(),
        pricing: ModelPricing {
            input_per_1k,
            output_per_1k,
        },
        min_tier,
        fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
        downgrade_to: downgrade_to.map(String::from),
        context_window,
    }
}

/// Built-in registry used when the config file has no `[[llm.models]]`.
pub fn default_models() -> Vec<ModelEntry> {
    vec![
        entry(
            "openai/gpt-5.2-pro",
            "GPT-5.2 Pro",
            0.15,
            0.60,
            Tier::Ultra,
            &["openai/gpt-5.2", "anthropic/claude-sonnet-4.5"],
            None,
            256_000,
        ),
        entry(
            "openai/gpt-5.2",
            "GPT-5.2",
            0.10,
            0.40,
            Tier::Free,
            &["anthropic/claude-sonnet-4.5", "google/gemini-3-flash-preview"],
            Some("openai/gpt-5.2-chat"),
            256_000,
        ),
        entry(
            "openai/gpt-5.2-chat",
            "GPT-5.2 Chat",
            0.005,
            0.015,
            Tier::Free,
            &["anthropic/claude-haiku-4.5", "google/gemini-3-flash-preview"],
            None,
            128_000,
        ),
        entry(
            "openai/o3-pro",
            "o3 Pro",
            0.20,
            0.80,
            Tier::Ultra,
            &["openai/gpt-5.2-pro", "anthropic/claude-opus-4.5"],
            None,
            200_000,
        ),
        entry(
            "anthropic/claude-opus-4.5",
            "Claude Opus 4.5",
            0.15,
            0.75,
            Tier::Ultra,
            &["anthropic/claude-sonnet-4.5", "openai/gpt-5.2"],
            None,
            200_000,
        ),
        entry(
            "anthropic/claude-sonnet-4.5",
            "Claude Sonnet 4.5",
            0.003,
            0.015,
            Tier::Pro,
            &["openai/gpt-5.2", "google/gemini-3-flash-preview"],
            Some("anthropic/claude-haiku-4.5"),
            200_000,
        ),
        entry(
            "anthropic/claude-haiku-4.5",
            "Claude Haiku 4.5",
            0.0008,
            0.004,
            Tier::Free,
            &["openai/gpt-5.2-chat", "google/gemini-3-flash-preview"],
            None,
            200_000,
        ),
        entry(
            "google/gemini-3-pro-preview",
            "Gemini 3 Pro",
            0.00125,
            0.005,
            Tier::Pro,
            &["google/gemini-3-flash-preview", "openai/gpt-5.2"],
            Some("google/gemini-3-flash-preview"),
            2_000_000,
        ),
        entry(
            "google/gemini-3-flash-preview",
            "Gemini 3 Flash",
            0.000075,
            0.0003,
            Tier::Free,
            &["openai/gpt-5.2-chat"],
            None,
            1_000_000,
        ),
    ]
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn d_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn d_default_model() -> String {
    "openai/gpt-5.2".into()
}
fn d_60000() -> u64 {
    60_000
}
fn d_true() -> bool {
    true
}
fn d_128k() -> u32 {
    128_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_cost_per_thousand() {
        let p = ModelPricing {
            input_per_1k: 0.10,
            output_per_1k: 0.40,
        };
        let cost = p.estimate_cost(2_000, 500);
        assert!((cost - 0.40).abs() < 1e-9);
    }

    #[test]
    fn default_registry_contains_default_model() {
        let cfg = LlmConfig::default();
        assert!(cfg.models.iter().any(|m| m.id == cfg.default_model));
    }

    #[test]
    fn model_entry_parses_flattened_pricing() {
        let toml_str = r#"
            id = "acme/fast"
            input_per_1k = 0.001
            output_per_1k = 0.002
            min_tier = "pro"
            fallbacks = ["acme/slow"]
        "#;
        let m: ModelEntry = toml::from_str(toml_str).unwrap();
        assert_eq!(m.id, "acme/fast");
        assert_eq!(m.min_tier, Tier::Pro);
        assert!((m.pricing.output_per_1k - 0.002).abs() < f64::EPSILON);
        assert_eq!(m.fallbacks, vec!["acme/slow".to_string()]);
        assert_eq!(m.context_window, 128_000);
        assert!(m.downgrade_to.is_none());
    }
}
