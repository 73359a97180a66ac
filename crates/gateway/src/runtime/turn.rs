//! The turn executor: one request lifecycle from admission to billing.
//!
//! [`start_turn`] runs the synchronous prelude (validation, idempotency,
//! admission, user-message persistence, commitments, memory, routing) and
//! returns a [`TurnHandle`] whose channel yields [`TurnEvent`]s from the
//! spawned generation task. Streaming and blocking requests share every
//! step; they differ only in which provider call the task makes.
//!
//! ```text
//! Admitted → Persisted → MemoryResolved → Generating → Finalizing → Completed | Failed
//! ```

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use asp_domain::billing::Tier;
use asp_domain::chat::{MessageRole, NewMessage, StoredMessage};
use asp_domain::error::Error;
use asp_domain::stream::{StreamEvent, Usage};
use asp_domain::trace::TraceEvent;
use asp_memory::{MemoryDecision, MemoryHit};
use asp_providers::health::{model_capability, MEMORY_SEARCH};
use asp_providers::{ChatRequest, LlmProvider, ProviderErrorKind, RouteOutcome};

use crate::state::AppState;

use super::enrichment::TurnSummary;
use super::error::TurnError;
use super::idempotency::IdempotencyCheck;
use super::{moderation, prompt, quota};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent - the SSE event type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted by the generation task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Incremental text from the assistant.
    #[serde(rename = "assistant_delta")]
    AssistantDelta { text: String },

    /// The persisted assistant message.
    #[serde(rename = "final")]
    Final {
        message_id: Uuid,
        content: String,
        model: String,
    },

    /// Token usage and cost billed for the turn.
    #[serde(rename = "usage")]
    UsageEvent {
        input_tokens: u32,
        output_tokens: u32,
        total_tokens: u32,
        cost_usd: f64,
    },

    /// The turn failed after admission.
    #[serde(rename = "error")]
    Error(TurnError),
}

impl TurnEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::AssistantDelta { .. } => "assistant_delta",
            Self::Final { .. } => "final",
            Self::UsageEvent { .. } => "usage",
            Self::Error(_) => "error",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    Streaming,
    Blocking,
}

/// Input to a single turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_id: String,
    pub chat_id: Uuid,
    pub content: String,
    /// Model override. `None` uses the chat's preferred model, then the
    /// registry default.
    pub model: Option<String>,
    pub idempotency_key: Option<String>,
    pub mode: TurnMode,
}

/// What the caller gets back once the turn has been admitted.
pub struct TurnHandle {
    pub turn_id: Uuid,
    pub user_message_id: Uuid,
    pub route: RouteOutcome,
    pub memory_decision: MemoryDecision,
    pub rx: mpsc::Receiver<TurnEvent>,
}

/// Everything the generation task needs, captured at admission.
struct Generation {
    state: AppState,
    turn_id: Uuid,
    chat_id: Uuid,
    user_id: String,
    tier: Tier,
    query: String,
    route: RouteOutcome,
    decision: MemoryDecision,
    memory_used: bool,
    request: ChatRequest,
    mode: TurnMode,
}

/// What a provider call produced before finalization.
struct Generated {
    text: String,
    usage: Option<Usage>,
    client_gone: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// start_turn - the admission prelude
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Admit a turn and spawn its generation.
///
/// Every rejection here is synchronous: nothing is generated and nothing
/// is billed. Rejections in step 1 happen before any side effect.
pub async fn start_turn(state: &AppState, input: TurnInput) -> Result<TurnHandle, TurnError> {
    let turn_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "turn",
        %turn_id,
        chat_id = %input.chat_id,
        user_id = %input.user_id,
        "otel.kind" = "SERVER",
    );
    admit_and_spawn(state, input, turn_id, span.clone())
        .instrument(span)
        .await
}

async fn admit_and_spawn(
    state: &AppState,
    input: TurnInput,
    turn_id: Uuid,
    span: tracing::Span,
) -> Result<TurnHandle, TurnError> {
    let cfg = &state.config;

    // ── 1. Validate ──────────────────────────────────────────────────
    let len = input.content.chars().count();
    if len > cfg.turn.max_message_chars {
        return Err(TurnError::MessageTooLong {
            len,
            max: cfg.turn.max_message_chars,
        });
    }
    moderation::screen(state.moderator.as_ref(), &input.content).await?;

    let chat = state
        .chats
        .get(input.chat_id)
        .await
        .map_err(|e| TurnError::persistence(&e))?
        .filter(|c| c.is_owned_by(&input.user_id))
        .ok_or(TurnError::ChatNotFound)?;

    // ── 2. Idempotency ───────────────────────────────────────────────
    if state
        .idempotency
        .check_and_register(input.idempotency_key.as_deref(), chat.id)
        == IdempotencyCheck::Conflict
    {
        return Err(TurnError::IdempotencyConflict);
    }

    // ── 3. Admission ─────────────────────────────────────────────────
    quota::admit(
        state.billing.as_ref(),
        &cfg.quota,
        &input.user_id,
        &input.content,
    )
    .await?;
    let tier = state
        .billing
        .account(&input.user_id)
        .await
        .map_err(|e| TurnError::persistence(&e))?
        .tier;

    // ── 4. Persist the user message ──────────────────────────────────
    let user_message = state
        .messages
        .create_message(NewMessage::user(chat.id, input.content.clone()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to persist user message");
            TurnError::persistence(&e)
        })?;
    if let Err(e) = state.chats.touch(chat.id).await {
        tracing::warn!(error = %e, "failed to bump chat updated_at");
    }

    // ── 5. Commitments (best-effort) ─────────────────────────────────
    state
        .commitments
        .capture(state.memory.as_ref(), &input.user_id, &input.content)
        .await;

    // ── 6. Memory decision & retrieval ───────────────────────────────
    let decision = state
        .decisions
        .decide(&input.user_id, &input.content, None);
    let memories = if decision.use_memory {
        retrieve_memory(state, &input.user_id, &input.content, &decision).await
    } else {
        Vec::new()
    };

    // ── 7. Route ─────────────────────────────────────────────────────
    let requested = input.model.as_deref().or(chat.model_id.as_deref());
    let route = state.router.resolve(requested, tier, &input.content)?;

    // ── 8. Build the request ─────────────────────────────────────────
    let history = state
        .messages
        .get_messages(chat.id)
        .await
        .map_err(|e| TurnError::persistence(&e))?;
    let system = prompt::build_system_prompt(&cfg.turn.system_prompt, &memories);
    let mut request = ChatRequest::new(
        route.actual_model_id.clone(),
        prompt::build_messages(system, &history),
    );
    request.temperature = Some(cfg.turn.temperature);

    let (tx, rx) = mpsc::channel::<TurnEvent>(cfg.turn.event_buffer.max(1));
    let generation = Generation {
        state: state.clone(),
        turn_id,
        chat_id: chat.id,
        user_id: input.user_id,
        tier,
        query: input.content,
        route: route.clone(),
        decision: decision.clone(),
        memory_used: !memories.is_empty(),
        request,
        mode: input.mode,
    };
    tokio::spawn(generate(generation, tx).instrument(span));

    Ok(TurnHandle {
        turn_id,
        user_message_id: user_message.id,
        route,
        memory_decision: decision,
        rx,
    })
}

/// Search memory behind the `memory.search` breaker. Any failure yields
/// an empty context.
async fn retrieve_memory(
    state: &AppState,
    user_id: &str,
    query: &str,
    decision: &MemoryDecision,
) -> Vec<MemoryHit> {
    if !state.health.is_available(MEMORY_SEARCH) {
        tracing::debug!("memory search disabled by health tracker; skipping retrieval");
        return Vec::new();
    }
    let started = Instant::now();
    match state
        .memory
        .search(query, user_id, state.config.memory.search_limit)
        .await
    {
        Ok(hits) => {
            state
                .health
                .record_success(MEMORY_SEARCH, started.elapsed().as_millis() as u64);
            let mut hits: Vec<MemoryHit> = hits
                .into_iter()
                .filter(|h| decision.sectors.contains(&h.sector))
                .collect();
            hits.sort_by_key(|h| {
                decision
                    .sectors
                    .iter()
                    .position(|s| *s == h.sector)
                    .unwrap_or(usize::MAX)
            });
            tracing::debug!(hits = hits.len(), "memory retrieved");
            hits
        }
        Err(e) => {
            state.health.record_failure(MEMORY_SEARCH, &e.to_string());
            tracing::warn!(error = %e, "memory search failed; continuing without memory");
            Vec::new()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generation task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn generate(gen: Generation, tx: mpsc::Sender<TurnEvent>) {
    let state = &gen.state;
    let provider = state.llm.clone();
    let model = gen.route.actual_model_id.clone();
    let capability = model_capability(&model);
    let timeout_ms = state.config.llm.request_timeout_ms;
    let streaming = gen.mode == TurnMode::Streaming;

    let llm_span = tracing::info_span!(
        "llm.call",
        "otel.kind" = "CLIENT",
        provider = provider.provider_id(),
        model = %model,
        streaming,
        input_tokens = tracing::field::Empty,
        output_tokens = tracing::field::Empty,
    );

    // Blocking calls are bounded as a whole. Streams are bounded per chunk
    // so a long healthy stream or a slow reader never times out.
    let limit = Duration::from_millis(timeout_ms);
    let started = Instant::now();
    let outcome = async {
        match gen.mode {
            TurnMode::Streaming => {
                stream_completion(provider.as_ref(), &gen.request, &tx, limit).await
            }
            TurnMode::Blocking => {
                match tokio::time::timeout(limit, provider.chat(&gen.request)).await {
                    Ok(res) => res.map(|r| Generated {
                        text: r.content,
                        usage: r.usage,
                        client_gone: false,
                    }),
                    Err(_elapsed) => Err(Error::Timeout(format!(
                        "generation timed out after {timeout_ms}ms"
                    ))),
                }
            }
        }
    }
    .instrument(llm_span.clone())
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let generated = match outcome {
        Err(e) => {
            let kind = ProviderErrorKind::classify(&e);
            if kind.counts_against_health() {
                state.health.record_failure(&capability, &e.to_string());
            }
            emit_llm_request(provider.as_ref(), &model, streaming, duration_ms, None);
            tracing::warn!(error = %e, code = kind.code(), "generation failed");
            let _ = tx.send(TurnEvent::Error(TurnError::generation(&e))).await;
            return;
        }
        Ok(generated) => generated,
    };

    state.health.record_success(&capability, duration_ms);
    emit_llm_request(
        provider.as_ref(),
        &model,
        streaming,
        duration_ms,
        generated.usage.as_ref(),
    );

    if generated.text.is_empty() {
        if generated.client_gone {
            tracing::warn!("client disconnected before any output; turn failed");
        } else {
            let err = Error::Provider {
                provider: provider.provider_id().to_string(),
                message: "model returned an empty response".into(),
            };
            let _ = tx.send(TurnEvent::Error(TurnError::generation(&err))).await;
        }
        return;
    }
    if generated.client_gone {
        tracing::info!(chars = generated.text.len(), "client disconnected; finalizing partial response");
    }

    let usage = generated.usage.unwrap_or_else(|| {
        Usage::estimate(gen.request.prompt_chars(), generated.text.chars().count())
    });
    llm_span.record("input_tokens", usage.prompt_tokens);
    llm_span.record("output_tokens", usage.completion_tokens);

    match finalize_turn(&gen, &generated.text, usage).await {
        Ok(finalized) => {
            let _ = tx
                .send(TurnEvent::Final {
                    message_id: finalized.message.id,
                    content: finalized.message.content.clone(),
                    model: model.clone(),
                })
                .await;
            let _ = tx
                .send(TurnEvent::UsageEvent {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                    cost_usd: finalized.cost_usd,
                })
                .await;
            state.enrichment.dispatch(TurnSummary {
                user_id: gen.user_id.clone(),
                tier: gen.tier,
                query: gen.query.clone(),
                response: finalized.message.content,
                memory_used: gen.memory_used,
            });
        }
        Err(e) => {
            let _ = tx.send(TurnEvent::Error(e)).await;
        }
    }
}

/// Read the provider stream, forwarding tokens until the client goes away.
///
/// `idle` bounds stream setup and each wait for the next chunk. Time spent
/// handing tokens to the client does not count. Only text the client
/// accepted is kept.
async fn stream_completion(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    tx: &mpsc::Sender<TurnEvent>,
    idle: Duration,
) -> asp_domain::error::Result<Generated> {
    let idle_timeout = || Error::Timeout(format!("no stream chunk within {}ms", idle.as_millis()));
    let mut stream = tokio::time::timeout(idle, provider.chat_stream(request))
        .await
        .map_err(|_| idle_timeout())??;
    let mut out = Generated {
        text: String::new(),
        usage: None,
        client_gone: false,
    };

    loop {
        let event = match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(event)) => event?,
            Ok(None) => break,
            Err(_elapsed) => return Err(idle_timeout()),
        };
        match event {
            StreamEvent::Token { text } => {
                if tx
                    .send(TurnEvent::AssistantDelta { text: text.clone() })
                    .await
                    .is_err()
                {
                    out.client_gone = true;
                    break;
                }
                out.text.push_str(&text);
            }
            StreamEvent::Done { usage, .. } => {
                out.usage = usage;
                break;
            }
            StreamEvent::Error { message } => {
                return Err(Error::Provider {
                    provider: provider.provider_id().to_string(),
                    message,
                });
            }
        }
    }
    Ok(out)
}

fn emit_llm_request(
    provider: &dyn LlmProvider,
    model: &str,
    streaming: bool,
    duration_ms: u64,
    usage: Option<&Usage>,
) {
    TraceEvent::LlmRequest {
        provider: provider.provider_id().to_string(),
        model: model.to_string(),
        streaming,
        duration_ms,
        prompt_tokens: usage.map(|u| u.prompt_tokens),
        completion_tokens: usage.map(|u| u.completion_tokens),
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// finalize_turn - persist, then bill
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Finalized {
    message: StoredMessage,
    cost_usd: f64,
}

/// Persist the assistant message, then (only if that succeeded) record
/// chat usage, then token usage. Billing failures are logged and do not
/// fail the turn. There is no compensation if billing fails after the
/// message was written.
async fn finalize_turn(gen: &Generation, text: &str, usage: Usage) -> Result<Finalized, TurnError> {
    let state = &gen.state;
    let model = gen.route.actual_model_id.as_str();
    let cost_usd = state
        .registry
        .estimate_cost(model, usage.prompt_tokens, usage.completion_tokens);

    let mut metadata = serde_json::Map::new();
    if let Ok(v) = serde_json::to_value(&gen.decision) {
        metadata.insert("memory_decision".into(), v);
    }
    if let Ok(v) = serde_json::to_value(&gen.route) {
        metadata.insert("route".into(), v);
    }
    metadata.insert("turn_id".into(), serde_json::json!(gen.turn_id));

    let message = match state
        .messages
        .create_message(NewMessage {
            chat_id: gen.chat_id,
            role: MessageRole::Assistant,
            content: text.to_string(),
            model_used: Some(model.to_string()),
            tokens_in: Some(usage.prompt_tokens),
            tokens_out: Some(usage.completion_tokens),
            cost_usd: Some(cost_usd),
            metadata,
        })
        .await
    {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to persist assistant message; turn not billed");
            emit_finalized(gen, model, usage, cost_usd, false);
            return Err(TurnError::persistence(&e));
        }
    };
    if let Err(e) = state.chats.touch(gen.chat_id).await {
        tracing::warn!(error = %e, "failed to bump chat updated_at");
    }

    let mut billed = true;
    if let Err(e) = state.billing.record_chat_usage(&gen.user_id).await {
        tracing::error!(error = %e, "failed to record chat usage");
        billed = false;
    }
    if let Err(e) = state
        .billing
        .record_token_usage(
            &gen.user_id,
            model,
            usage.prompt_tokens,
            usage.completion_tokens,
            cost_usd,
        )
        .await
    {
        tracing::error!(error = %e, "failed to record token usage");
        billed = false;
    }

    emit_finalized(gen, model, usage, cost_usd, billed);
    Ok(Finalized { message, cost_usd })
}

fn emit_finalized(gen: &Generation, model: &str, usage: Usage, cost_usd: f64, billed: bool) {
    TraceEvent::TurnFinalized {
        turn_id: gen.turn_id.to_string(),
        chat_id: gen.chat_id.to_string(),
        model: model.to_string(),
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cost_usd,
        billed,
    }
    .emit();
}

/// Drain a handle's events for a non-streaming caller.
pub async fn collect(mut rx: mpsc::Receiver<TurnEvent>) -> Result<CollectedTurn, TurnError> {
    let mut out = CollectedTurn::default();
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::AssistantDelta { .. } => {}
            TurnEvent::Final {
                message_id,
                content,
                model,
            } => {
                out.message_id = Some(message_id);
                out.content = content;
                out.model = model;
            }
            TurnEvent::UsageEvent {
                input_tokens,
                output_tokens,
                total_tokens,
                cost_usd,
            } => {
                out.usage = Some(serde_json::json!({
                    "input_tokens": input_tokens,
                    "output_tokens": output_tokens,
                    "total_tokens": total_tokens,
                    "cost_usd": cost_usd,
                }));
            }
            TurnEvent::Error(e) => return Err(e),
        }
    }
    Ok(out)
}

#[derive(Debug, Default)]
pub struct CollectedTurn {
    pub message_id: Option<Uuid>,
    pub content: String,
    pub model: String,
    pub usage: Option<serde_json::Value>,
}
