mod enrichment;
mod health;
mod idempotency;
mod llm;
mod memory;
mod observability;
mod quota;
mod server;
mod turn;

pub use enrichment::*;
pub use health::*;
pub use idempotency::*;
pub use llm::*;
pub use memory::*;
pub use observability::*;
pub use quota::*;
pub use server::*;
pub use turn::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: String, message: String| {
            errors.push(ConfigError {
                severity,
                field,
                message,
            })
        };

        if self.server.port == 0 {
            push(
                ConfigSeverity::Error,
                "server.port".into(),
                "port must be greater than 0".into(),
            );
        }
        if self.server.host.is_empty() {
            push(
                ConfigSeverity::Error,
                "server.host".into(),
                "host must not be empty".into(),
            );
        }

        // ── Model registry ───────────────────────────────────────────
        if self.llm.models.is_empty() {
            push(
                ConfigSeverity::Error,
                "llm.models".into(),
                "model registry is empty".into(),
            );
        }
        let mut ids: HashSet<&str> = HashSet::new();
        for (i, m) in self.llm.models.iter().enumerate() {
            if m.id.is_empty() {
                push(
                    ConfigSeverity::Error,
                    format!("llm.models[{i}].id"),
                    "model id must not be empty".into(),
                );
            }
            if !ids.insert(m.id.as_str()) {
                push(
                    ConfigSeverity::Error,
                    format!("llm.models[{i}].id"),
                    format!("duplicate model id '{}'", m.id),
                );
            }
        }
        if !ids.contains(self.llm.default_model.as_str()) {
            push(
                ConfigSeverity::Error,
                "llm.default_model".into(),
                format!("'{}' is not in the model registry", self.llm.default_model),
            );
        }
        for (i, m) in self.llm.models.iter().enumerate() {
            for fb in &m.fallbacks {
                if !ids.contains(fb.as_str()) {
                    push(
                        ConfigSeverity::Warning,
                        format!("llm.models[{i}].fallbacks"),
                        format!("fallback '{fb}' is not in the model registry"),
                    );
                }
            }
            if let Some(target) = &m.downgrade_to {
                if !ids.contains(target.as_str()) {
                    push(
                        ConfigSeverity::Warning,
                        format!("llm.models[{i}].downgrade_to"),
                        format!("downgrade target '{target}' is not in the model registry"),
                    );
                }
            }
        }

        // ── Health thresholds ────────────────────────────────────────
        if self.health.window_size == 0 {
            push(
                ConfigSeverity::Error,
                "health.window_size".into(),
                "window_size must be greater than 0".into(),
            );
        }
        if self.health.disabled_error_rate < self.health.degraded_error_rate {
            push(
                ConfigSeverity::Warning,
                "health.disabled_error_rate".into(),
                "disabled threshold is below the degraded threshold".into(),
            );
        }

        // ── Turn + enrichment ────────────────────────────────────────
        if self.turn.max_message_chars == 0 {
            push(
                ConfigSeverity::Error,
                "turn.max_message_chars".into(),
                "max_message_chars must be greater than 0".into(),
            );
        }
        if self.enrichment.workers == 0 {
            push(
                ConfigSeverity::Warning,
                "enrichment.workers".into(),
                "no enrichment workers: memory extraction and reflection are off".into(),
            );
        }
        if self.idempotency.ttl_secs == 0 {
            push(
                ConfigSeverity::Warning,
                "idempotency.ttl_secs".into(),
                "ttl of 0 disables duplicate detection".into(),
            );
        }

        errors
    }
}
