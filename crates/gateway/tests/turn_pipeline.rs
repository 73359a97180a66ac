//! End-to-end turn pipeline tests against scripted collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use uuid::Uuid;

use asp_domain::chat::{MessagePage, MessageRole, NewMessage, StoredMessage};
use asp_domain::config::Config;
use asp_domain::error::{Error, Result};
use asp_domain::stream::{BoxStream, StreamEvent, Usage};
use asp_gateway::bootstrap::{assemble, Collaborators};
use asp_gateway::runtime::{collect, start_turn, TurnError, TurnEvent, TurnInput, TurnMode};
use asp_gateway::state::AppState;
use asp_gateway::store::{InMemoryMessageStore, MessageStore};
use asp_memory::LocalMemory;
use asp_providers::health::{model_capability, HealthStatus, MEMORY_SEARCH};
use asp_providers::{ChatRequest, ChatResponse, LlmProvider};

// ── Collaborators ───────────────────────────────────────────────────

/// Replies with a fixed answer and records which model it was asked for.
struct ScriptedLlm {
    reply: Vec<&'static str>,
    calls: AtomicUsize,
    last_model: parking_lot::Mutex<Option<String>>,
}

impl ScriptedLlm {
    fn new(reply: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            last_model: parking_lot::Mutex::new(None),
        })
    }

    fn last_model(&self) -> Option<String> {
        self.last_model.lock().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock() = Some(req.model.clone());
        Ok(ChatResponse {
            content: self.reply.concat(),
            usage: Some(Usage::new(120, 30)),
            model: req.model.clone(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock() = Some(req.model.clone());
        let mut events: Vec<Result<StreamEvent>> = self
            .reply
            .iter()
            .map(|t| Ok(StreamEvent::Token { text: t.to_string() }))
            .collect();
        events.push(Ok(StreamEvent::Done {
            usage: Some(Usage::new(120, 30)),
            finish_reason: Some("stop".into()),
        }));
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// Streams `t0 t1 ...` with a pause before every chunk and no reported usage.
struct PacedLlm {
    tokens: usize,
    stall: Duration,
    gap: Duration,
}

impl PacedLlm {
    fn new(tokens: usize, stall_ms: u64, gap_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            stall: Duration::from_millis(stall_ms),
            gap: Duration::from_millis(gap_ms),
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for PacedLlm {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        tokio::time::sleep(self.stall).await;
        Ok(ChatResponse {
            content: (0..self.tokens).map(|i| format!("t{i} ")).collect(),
            usage: None,
            model: req.model.clone(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let (tokens, stall, gap) = (self.tokens, self.stall, self.gap);
        Ok(Box::pin(async_stream::stream! {
            tokio::time::sleep(stall).await;
            for i in 0..tokens {
                tokio::time::sleep(gap).await;
                yield Ok::<_, Error>(StreamEvent::Token { text: format!("t{i} ") });
            }
            yield Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) });
        }))
    }

    fn provider_id(&self) -> &str {
        "paced"
    }
}

/// Accepts user messages but refuses to store assistant replies.
#[derive(Default)]
struct FailingAssistantStore {
    inner: InMemoryMessageStore,
}

#[async_trait::async_trait]
impl MessageStore for FailingAssistantStore {
    async fn create_message(&self, msg: NewMessage) -> Result<StoredMessage> {
        if msg.role == MessageRole::Assistant {
            return Err(Error::Store("disk full".into()));
        }
        self.inner.create_message(msg).await
    }

    async fn get_messages(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>> {
        self.inner.get_messages(chat_id).await
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<StoredMessage>> {
        self.inner.get_message(message_id).await
    }

    async fn list_messages(
        &self,
        chat_id: Uuid,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<MessagePage> {
        self.inner.list_messages(chat_id, cursor, limit).await
    }

    async fn update_metadata(
        &self,
        message_id: Uuid,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<StoredMessage> {
        self.inner.update_metadata(message_id, patch).await
    }

    async fn delete_chat_messages(&self, chat_id: Uuid) -> Result<usize> {
        self.inner.delete_chat_messages(chat_id).await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn state_with(llm: Arc<ScriptedLlm>, messages: Option<Arc<dyn MessageStore>>) -> AppState {
    state_with_config(Config::default(), llm, messages)
}

fn state_with_timeout(llm: Arc<dyn LlmProvider>, request_timeout_ms: u64) -> AppState {
    let mut config = Config::default();
    config.llm.request_timeout_ms = request_timeout_ms;
    state_with_config(config, llm, None)
}

fn state_with_config(
    config: Config,
    llm: Arc<dyn LlmProvider>,
    messages: Option<Arc<dyn MessageStore>>,
) -> AppState {
    let config = Arc::new(config);
    let mut c = Collaborators::in_memory(&config, llm, Arc::new(LocalMemory::new()));
    if let Some(messages) = messages {
        c.messages = messages;
    }
    assemble(config, c).unwrap()
}

async fn new_chat(state: &AppState, owner: &str) -> Uuid {
    state.chats.create(owner, "test chat", None).await.unwrap().id
}

fn input(user: &str, chat_id: Uuid, content: &str, mode: TurnMode) -> TurnInput {
    TurnInput {
        user_id: user.into(),
        chat_id,
        content: content.into(),
        model: None,
        idempotency_key: None,
        mode,
    }
}

/// Fail a capability until the default thresholds disable it.
fn disable(state: &AppState, capability: &str) {
    for _ in 0..state.config.health.min_samples {
        state.health.record_failure(capability, "boom");
    }
    assert!(!state.health.is_available(capability));
}

// ── Runtime ─────────────────────────────────────────────────────────

#[tokio::test]
async fn blocking_turn_persists_and_bills() {
    let llm = ScriptedLlm::new(vec!["Tides are ", "caused by the moon."]);
    let state = state_with(llm.clone(), None);
    let chat_id = new_chat(&state, "alice").await;

    let handle = start_turn(
        &state,
        input("alice", chat_id, "explain how tides work", TurnMode::Blocking),
    )
    .await
    .unwrap();
    let turn = collect(handle.rx).await.unwrap();

    assert_eq!(turn.content, "Tides are caused by the moon.");
    assert_eq!(turn.model, "openai/gpt-5.2");
    assert_eq!(turn.usage.as_ref().unwrap()["total_tokens"], 150);

    let history = state.messages.get_messages(chat_id).await.unwrap();
    assert_eq!(history.len(), 2);
    let assistant = &history[1];
    assert_eq!(assistant.role, MessageRole::Assistant);
    assert_eq!(Some(assistant.id), turn.message_id);
    assert_eq!(assistant.tokens_in, Some(120));
    assert!(assistant.metadata.contains_key("memory_decision"));
    assert!(assistant.metadata.contains_key("route"));

    let account = state.billing.account("alice").await.unwrap();
    assert_eq!(account.tokens_used, 150);
    assert_eq!(account.chats_remaining, 99);
    assert!(account.daily_spend_usd > 0.0);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn streaming_turn_yields_deltas_then_final() {
    let llm = ScriptedLlm::new(vec!["one ", "two ", "three"]);
    let state = state_with(llm, None);
    let chat_id = new_chat(&state, "bob").await;

    let mut handle = start_turn(
        &state,
        input("bob", chat_id, "explain counting", TurnMode::Streaming),
    )
    .await
    .unwrap();

    let mut deltas = Vec::new();
    let mut names = Vec::new();
    while let Some(event) = handle.rx.recv().await {
        names.push(event.event_name());
        match event {
            TurnEvent::AssistantDelta { text } => deltas.push(text),
            TurnEvent::Final { content, .. } => assert_eq!(content, "one two three"),
            TurnEvent::UsageEvent { total_tokens, .. } => assert_eq!(total_tokens, 150),
            TurnEvent::Error(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(deltas, vec!["one ", "two ", "three"]);
    assert_eq!(names.last(), Some(&"usage"));
    assert_eq!(names[names.len() - 2], "final");
}

#[tokio::test]
async fn failed_assistant_persist_is_not_billed() {
    let llm = ScriptedLlm::new(vec!["an answer"]);
    let state = state_with(llm, Some(Arc::new(FailingAssistantStore::default())));
    let chat_id = new_chat(&state, "carol").await;

    let handle = start_turn(
        &state,
        input("carol", chat_id, "explain rainbows", TurnMode::Blocking),
    )
    .await
    .unwrap();
    let err = collect(handle.rx).await.unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_FAILED");
    assert!(err.retryable());

    let account = state.billing.account("carol").await.unwrap();
    assert_eq!(account.tokens_used, 0);
    assert_eq!(account.chats_remaining, 100);
    assert!(state.billing.ledger("carol", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_idempotency_key_conflicts() {
    let llm = ScriptedLlm::new(vec!["ok"]);
    let state = state_with(llm.clone(), None);
    let chat_id = new_chat(&state, "dave").await;

    let mut first = input("dave", chat_id, "explain gravity", TurnMode::Blocking);
    first.idempotency_key = Some("k-1".into());
    let second = first.clone();

    let handle = start_turn(&state, first).await.unwrap();
    collect(handle.rx).await.unwrap();

    let err = start_turn(&state, second).await.err().unwrap();
    assert!(matches!(err, TurnError::IdempotencyConflict));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

    // Only the first turn's two messages exist.
    assert_eq!(state.messages.get_messages(chat_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn foreign_chat_is_not_found() {
    let state = state_with(ScriptedLlm::new(vec!["x"]), None);
    let chat_id = new_chat(&state, "erin").await;

    let err = start_turn(
        &state,
        input("mallory", chat_id, "explain", TurnMode::Blocking),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(err.code(), "CHAT_NOT_FOUND");
}

#[tokio::test]
async fn disabled_model_routes_to_tier_allowed_fallback() {
    let llm = ScriptedLlm::new(vec!["fallback answer"]);
    let state = state_with(llm.clone(), None);
    let chat_id = new_chat(&state, "frank").await;
    disable(&state, &model_capability("openai/gpt-5.2"));

    let handle = start_turn(
        &state,
        input("frank", chat_id, "explain photosynthesis", TurnMode::Blocking),
    )
    .await
    .unwrap();
    assert!(handle.route.fallback_used);
    // Sonnet requires pro; a free user skips to the next fallback.
    assert_eq!(handle.route.actual_model_id, "google/gemini-3-flash-preview");

    let turn = collect(handle.rx).await.unwrap();
    assert_eq!(turn.model, "google/gemini-3-flash-preview");
    assert_eq!(
        llm.last_model().as_deref(),
        Some("google/gemini-3-flash-preview")
    );
}

#[tokio::test]
async fn premium_model_rejected_for_free_tier() {
    let llm = ScriptedLlm::new(vec!["never"]);
    let state = state_with(llm.clone(), None);
    let chat_id = new_chat(&state, "gina").await;

    let mut req = input("gina", chat_id, "explain quantum tunnelling", TurnMode::Blocking);
    req.model = Some("openai/o3-pro".into());
    let err = start_turn(&state, req).await.err().unwrap();
    assert_eq!(err.code(), "MODEL_NOT_AVAILABLE_FOR_TIER");
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        state.billing.account("gina").await.unwrap().chats_remaining,
        100
    );
}

#[tokio::test]
async fn long_stream_outlasting_request_timeout_completes() {
    // Ten chunks 30ms apart run well past the 150ms budget.
    let state = state_with_timeout(PacedLlm::new(10, 0, 30), 150);
    let chat_id = new_chat(&state, "erin").await;

    let handle = start_turn(
        &state,
        input("erin", chat_id, "explain the water cycle", TurnMode::Streaming),
    )
    .await
    .unwrap();
    let turn = collect(handle.rx).await.unwrap();

    let expected: String = (0..10).map(|i| format!("t{i} ")).collect();
    assert_eq!(turn.content, expected);
    assert_eq!(state.messages.get_messages(chat_id).await.unwrap().len(), 2);

    let account = state.billing.account("erin").await.unwrap();
    assert!(account.tokens_used > 0);
    assert_eq!(account.chats_remaining, 99);

    let capability = model_capability(&turn.model);
    assert_eq!(state.health.status(&capability), HealthStatus::Healthy);
    let snap = state
        .health
        .snapshot()
        .into_iter()
        .find(|s| s.capability == capability)
        .unwrap();
    assert_eq!(snap.failures, 0);
    assert!(state.health.list_degraded().is_empty());
}

#[tokio::test]
async fn stalled_stream_times_out() {
    let state = state_with_timeout(PacedLlm::new(3, 400, 0), 100);
    let chat_id = new_chat(&state, "frank").await;

    let handle = start_turn(
        &state,
        input("frank", chat_id, "explain glaciers", TurnMode::Streaming),
    )
    .await
    .unwrap();
    let err = collect(handle.rx).await.unwrap_err();
    assert_eq!(err.code(), "TIMEOUT");
    assert!(err.retryable());

    assert_eq!(state.messages.get_messages(chat_id).await.unwrap().len(), 1);
    let account = state.billing.account("frank").await.unwrap();
    assert_eq!(account.tokens_used, 0);
    assert_eq!(account.chats_remaining, 100);
}

#[tokio::test]
async fn client_leaving_mid_stream_keeps_partial_answer() {
    let state = state_with_timeout(PacedLlm::new(10, 0, 30), 1_000);
    let chat_id = new_chat(&state, "gina").await;

    let mut handle = start_turn(
        &state,
        input("gina", chat_id, "explain volcanoes", TurnMode::Streaming),
    )
    .await
    .unwrap();

    let mut seen = 0;
    while let Some(event) = handle.rx.recv().await {
        if let TurnEvent::AssistantDelta { .. } = event {
            seen += 1;
            if seen == 3 {
                break;
            }
        }
    }
    drop(handle);

    let mut history = Vec::new();
    for _ in 0..100 {
        history = state.messages.get_messages(chat_id).await.unwrap();
        if history.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].content, "t0 t1 t2 ");

    // Usage is estimated since the stream never reported any.
    let mut account = state.billing.account("gina").await.unwrap();
    for _ in 0..50 {
        if account.tokens_used > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        account = state.billing.account("gina").await.unwrap();
    }
    assert!(account.tokens_used > 0);
    assert_eq!(account.chats_remaining, 99);
}

#[tokio::test]
async fn client_leaving_before_first_token_is_not_billed() {
    let state = state_with_timeout(PacedLlm::new(5, 50, 10), 1_000);
    let chat_id = new_chat(&state, "hank").await;

    let handle = start_turn(
        &state,
        input("hank", chat_id, "explain earthquakes", TurnMode::Streaming),
    )
    .await
    .unwrap();
    drop(handle);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let history = state.messages.get_messages(chat_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, MessageRole::User);

    let account = state.billing.account("hank").await.unwrap();
    assert_eq!(account.tokens_used, 0);
    assert_eq!(account.chats_remaining, 100);
    assert!(state.billing.ledger("hank", 10).await.unwrap().is_empty());
}

// ── HTTP ────────────────────────────────────────────────────────────

fn app(state: &AppState) -> axum::Router {
    asp_gateway::api::router(state.clone()).with_state(state.clone())
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn http_turn_reports_degraded_memory() {
    let state = state_with(ScriptedLlm::new(vec!["hello"]), None);
    let chat_id = new_chat(&state, "hank").await;
    disable(&state, MEMORY_SEARCH);

    let resp = app(&state)
        .oneshot(
            Request::post(format!("/v1/chats/{chat_id}/messages"))
                .header("content-type", "application/json")
                .header("x-user-id", "hank")
                .body(Body::from(
                    r#"{"content":"remember what I told you about my sister?"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("x-degraded-features").unwrap(),
        MEMORY_SEARCH
    );
    let body = body_json(resp).await;
    assert_eq!(body["content"], "hello");
    assert_eq!(body["degraded_features"][0], MEMORY_SEARCH);
    // Memory was wanted but the breaker skipped retrieval.
    assert_eq!(body["memory_decision"]["use_memory"], true);
}

#[tokio::test]
async fn http_requires_user_header() {
    let state = state_with(ScriptedLlm::new(vec!["x"]), None);
    let resp = app(&state)
        .oneshot(Request::get("/v1/chats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn http_idempotency_header_conflicts_with_409() {
    let state = state_with(ScriptedLlm::new(vec!["ok"]), None);
    let chat_id = new_chat(&state, "ivy").await;

    let send = || {
        Request::post(format!("/v1/chats/{chat_id}/messages"))
            .header("content-type", "application/json")
            .header("x-user-id", "ivy")
            .header("idempotency-key", "retry-me")
            .body(Body::from(r#"{"content":"explain tides"}"#))
            .unwrap()
    };

    let first = app(&state).oneshot(send()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app(&state).oneshot(send()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["error"]["code"], "IDEMPOTENCY_CONFLICT");
}
