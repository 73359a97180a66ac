use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Logging and OpenTelemetry export.
///
/// With no `otlp_endpoint` only the local log layer is installed. Setting
/// it forwards every `tracing` span (turns, LLM calls, memory lookups)
/// to an OTLP/gRPC collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// OTLP gRPC endpoint (e.g. `http://localhost:4317`).
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// The `service.name` resource attribute reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Trace sampling ratio, `0.0..=1.0`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,

    /// Emit JSON log lines (production) instead of the compact text format.
    #[serde(default = "d_true")]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
            json_logs: true,
        }
    }
}

fn d_service_name() -> String {
    "aspendos".into()
}

fn d_sample_rate() -> f64 {
    1.0
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert!(cfg.otlp_endpoint.is_none());
        assert_eq!(cfg.service_name, "aspendos");
        assert!((cfg.sample_rate - 1.0).abs() < f64::EPSILON);
        assert!(cfg.json_logs);
    }

    #[test]
    fn collector_settings_parse() {
        let toml_str = r#"
            otlp_endpoint = "http://otel:4317"
            sample_rate = 0.25
            json_logs = false
        "#;
        let cfg: ObservabilityConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.otlp_endpoint.as_deref(), Some("http://otel:4317"));
        assert!((cfg.sample_rate - 0.25).abs() < f64::EPSILON);
        assert!(!cfg.json_logs);
    }
}
