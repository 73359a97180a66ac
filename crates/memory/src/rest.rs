//! REST implementation of [`MemoryBackend`].
//!
//! Transient failures (5xx, timeouts, connection errors) are retried with
//! exponential back-off; 4xx responses fail immediately.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use asp_domain::config::MemoryConfig;
use asp_domain::error::{Error, Result};
use asp_domain::trace::TraceEvent;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use uuid::Uuid;

use crate::provider::MemoryBackend;
use crate::types::{AddMemoryRequest, MemoryHit, SearchRequest, SearchResponse, Sector};

/// Base back-off; attempt `n` waits `BACKOFF_BASE_MS * 2^(n-1)`.
const BACKOFF_BASE_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct RestMemoryClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl RestMemoryClient {
    /// The API key is optional: it is read from `cfg.api_key_env` when set.
    pub fn new(base_url: &str, cfg: &MemoryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %cfg.api_key_env, "memory service API key not set; sending unauthenticated requests");
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            max_retries: cfg.max_retries,
        })
    }

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        let rb = rb
            .header("X-Client-Type", "aspendos")
            .header("X-Trace-Id", Uuid::new_v4().to_string());
        match &self.api_key {
            Some(key) => rb.header("X-Api-Key", key),
            None => rb,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── retry engine ─────────────────────────────────────────────────

    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let start = Instant::now();
            let result = self.decorate(build_request()).send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    TraceEvent::MemoryCall {
                        endpoint: endpoint.to_owned(),
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                        duration_ms,
                    }
                    .emit();
                    last_err = Some(from_reqwest(e));
                    continue;
                }
            };

            let status = resp.status();
            TraceEvent::MemoryCall {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
                duration_ms,
            }
            .emit();

            if status.is_success() {
                return Ok(resp);
            }

            let body = resp.text().await.unwrap_or_default();
            if status.is_server_error() {
                last_err = Some(Error::Memory(format!("{endpoint} returned {status}: {body}")));
                continue;
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(Error::Auth(format!("{endpoint} auth failed ({status}): {body}")));
            }
            return Err(Error::Memory(format!("{endpoint} returned {status}: {body}")));
        }

        Err(last_err.unwrap_or_else(|| Error::Memory(format!("{endpoint}: all retries exhausted"))))
    }
}

#[async_trait]
impl MemoryBackend for RestMemoryClient {
    async fn search(&self, query: &str, user_id: &str, limit: u32) -> Result<Vec<MemoryHit>> {
        let url = self.url("/api/memories/search");
        let req = SearchRequest {
            query,
            user_id,
            limit,
        };
        let resp = self
            .execute_with_retry("POST /api/memories/search", || self.http.post(&url).json(&req))
            .await?;

        let body = resp.text().await.map_err(from_reqwest)?;
        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Memory(format!("failed to parse search response: {e}: {body}")))?;
        let mut hits = parsed.memories;
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn add(
        &self,
        content: &str,
        user_id: &str,
        sector: Sector,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let url = self.url("/api/memories");
        let req = AddMemoryRequest {
            content,
            user_id,
            sector,
            metadata,
        };
        self.execute_with_retry("POST /api/memories", || self.http.post(&url).json(&req))
            .await?;
        Ok(())
    }
}

/// Timeouts become [`Error::Timeout`]; everything else [`Error::Http`].
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let cfg = MemoryConfig::default();
        let client = RestMemoryClient::new("http://memory.local/", &cfg).unwrap();
        assert_eq!(client.url("/api/memories"), "http://memory.local/api/memories");
    }

    #[tokio::test]
    async fn unreachable_service_surfaces_error_after_retries() {
        let cfg = MemoryConfig {
            timeout_ms: 200,
            max_retries: 1,
            ..Default::default()
        };
        // Port 9 (discard) on localhost is closed in test environments.
        let client = RestMemoryClient::new("http://127.0.0.1:9", &cfg).unwrap();
        let err = client.search("anything", "u1", 3).await.unwrap_err();
        assert!(matches!(err, Error::Http(_) | Error::Timeout(_)), "{err}");
    }
}
