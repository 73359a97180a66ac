use serde::Serialize;

/// Structured trace events emitted across all Aspendos crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_model: String,
        to_model: String,
        reason: String,
    },
    ModelDowngraded {
        from_model: String,
        to_model: String,
    },
    HealthTransition {
        capability: String,
        from: String,
        to: String,
        error_rate: f64,
        p99_ms: u64,
    },
    MemoryDecided {
        user_id: String,
        query_type: String,
        use_memory: bool,
        sectors: Vec<String>,
        confidence: f32,
    },
    MemoryCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    TurnFinalized {
        turn_id: String,
        chat_id: String,
        model: String,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
        billed: bool,
    },
    ReflectionScored {
        user_id: String,
        satisfied: bool,
        reasoning: String,
        retry_strategy: Option<String>,
    },
    EnrichmentDropped {
        job: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "asp_event");
    }
}
