//! OpenAI-compatible adapter.
//!
//! Every registry model is served through one OpenAI-compatible gateway
//! (OpenRouter by default), so a single adapter covers all of them; the
//! registry id travels verbatim as the `model` field.

use crate::sse::{sse_response_stream, ChunkParser};
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{api_key_from_env, from_reqwest};
use asp_domain::config::LlmConfig;
use asp_domain::error::{Error, Result};
use asp_domain::stream::{BoxStream, StreamEvent, Usage};
use asp_domain::message::Message;
use serde_json::Value;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build the gateway adapter from `[llm]`. The API key is read from the
    /// configured environment variable at this point.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = api_key_from_env(&cfg.api_key_env)?;
        Self::new(
            "openrouter",
            &cfg.base_url,
            api_key,
            Duration::from_millis(cfg.request_timeout_ms),
        )
    }

    pub fn new(
        id: impl Into<String>,
        base_url: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .header("X-Title", "Aspendos")
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .authed_post(&self.chat_url())
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }
        Ok(resp)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire format
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &Message) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}

pub(crate) fn build_chat_body(req: &ChatRequest, stream: bool) -> Value {
    let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "stream": stream,
    });
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    if let Some(max) = req.max_tokens {
        body["max_tokens"] = serde_json::json!(max);
    }
    if stream {
        body["stream_options"] = serde_json::json!({"include_usage": true});
    }
    body
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let prompt = v.get("prompt_tokens")?.as_u64()? as u32;
    let completion = v.get("completion_tokens")?.as_u64()? as u32;
    Some(Usage::new(prompt, completion))
}

pub(crate) fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let content = choice
        .pointer("/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(ChatResponse {
        content,
        usage: body.get("usage").and_then(parse_usage),
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

// ── Streaming chunk parser ──────────────────────────────────────────

/// Holds the finish reason and usage across chunks: with
/// `include_usage`, usage arrives in its own chunk after the one carrying
/// `finish_reason`, and `[DONE]` closes the stream.
#[derive(Debug, Default)]
pub(crate) struct OpenAiChunkParser {
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

impl OpenAiChunkParser {
    fn done(&mut self) -> StreamEvent {
        StreamEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take().or_else(|| Some("stop".into())),
        }
    }
}

impl ChunkParser for OpenAiChunkParser {
    fn on_data(&mut self, data: &str) -> Vec<Result<StreamEvent>> {
        if data == "[DONE]" {
            return vec![Ok(self.done())];
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return vec![Err(Error::Json(e))],
        };

        // Mid-stream provider error (OpenRouter forwards upstream failures
        // as a chunk with an `error` object).
        if let Some(err) = v.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("stream error");
            let code = err.get("code").and_then(|c| c.as_u64());
            let message = match code {
                Some(code) => format!("HTTP {code} - {message}"),
                None => message.to_string(),
            };
            return vec![Ok(StreamEvent::Error { message })];
        }

        if let Some(usage) = v.get("usage").and_then(parse_usage) {
            self.usage = Some(usage);
        }

        let Some(choice) = v
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
        else {
            return Vec::new();
        };

        if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            self.finish_reason = Some(fr.to_string());
        }

        match choice.pointer("/delta/content").and_then(|v| v.as_str()) {
            Some(text) if !text.is_empty() => vec![Ok(StreamEvent::Token {
                text: text.to_string(),
            })],
            _ => Vec::new(),
        }
    }

    fn finish(&mut self) -> StreamEvent {
        self.done()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(provider = %self.id, model = %req.model, "chat request");
        let resp = self.send(&build_chat_body(req, false)).await?;
        let text = resp.text().await.map_err(from_reqwest)?;
        let json: Value = serde_json::from_str(&text)?;
        parse_chat_response(&self.id, &json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        tracing::debug!(provider = %self.id, model = %req.model, "stream request");
        let resp = self.send(&build_chat_body(req, true)).await?;
        Ok(sse_response_stream(resp, OpenAiChunkParser::default()))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(events: &[Result<StreamEvent>]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::Token { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn body_carries_model_and_stream_options() {
        let mut req = ChatRequest::new(
            "anthropic/claude-sonnet-4.5",
            vec![Message::system("be brief"), Message::user("hi")],
        );
        req.temperature = Some(0.5);

        let body = build_chat_body(&req, true);
        assert_eq!(body["model"], "anthropic/claude-sonnet-4.5");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("max_tokens").is_none());

        let body = build_chat_body(&req, false);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn non_streaming_response_parsed() {
        let json = serde_json::json!({
            "model": "openai/gpt-5.2",
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });
        let resp = parse_chat_response("openrouter", &json).unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.usage, Some(Usage::new(12, 3)));
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn empty_choices_is_provider_error() {
        let json = serde_json::json!({"choices": []});
        let err = parse_chat_response("openrouter", &json).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn stream_usage_after_finish_reason_lands_on_done() {
        let mut p = OpenAiChunkParser::default();
        let mut events = Vec::new();
        events.extend(p.on_data(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#));
        events.extend(p.on_data(r#"{"choices":[{"delta":{"content":"lo"}}]}"#));
        events.extend(p.on_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#));
        events.extend(p.on_data(
            r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#,
        ));
        assert_eq!(tokens(&events), "Hello");
        assert_eq!(events.len(), 2);

        match p.on_data("[DONE]").pop() {
            Some(Ok(StreamEvent::Done {
                usage,
                finish_reason,
            })) => {
                assert_eq!(usage, Some(Usage::new(9, 2)));
                assert_eq!(finish_reason.as_deref(), Some("stop"));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn stream_without_done_sentinel_finishes_without_usage() {
        let mut p = OpenAiChunkParser::default();
        p.on_data(r#"{"choices":[{"delta":{"content":"x"}}]}"#);
        match p.finish() {
            StreamEvent::Done { usage, .. } => assert!(usage.is_none()),
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn mid_stream_error_chunk_carries_status() {
        let mut p = OpenAiChunkParser::default();
        let events = p.on_data(r#"{"error":{"code":429,"message":"Rate limit exceeded"}}"#);
        match &events[0] {
            Ok(StreamEvent::Error { message }) => {
                assert_eq!(message, "HTTP 429 - Rate limit exceeded");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_chunk_is_json_error() {
        let mut p = OpenAiChunkParser::default();
        let events = p.on_data("{not json");
        assert!(matches!(events[0], Err(Error::Json(_))));
    }
}
