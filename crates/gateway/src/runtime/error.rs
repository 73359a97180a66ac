//! Client-facing turn failures.
//!
//! Every rejection carries a stable `code`, a human-readable message and
//! a `retryable` flag. Over HTTP it renders as
//! `{"error": {"code", "message", "retryable"}}` with a matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::ser::{Serialize, SerializeStruct, Serializer};

use asp_domain::error::Error;
use asp_providers::{ProviderErrorKind, RouteError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TurnError {
    #[error("message is {len} characters; the limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("message rejected by content moderation: {reason}")]
    ContentBlocked { reason: String },

    #[error("chat not found")]
    ChatNotFound,

    #[error("a request with this idempotency key was already accepted for this chat")]
    IdempotencyConflict,

    #[error("monthly chat limit reached")]
    ChatLimitReached,

    #[error("monthly token budget cannot cover this request")]
    TokenLimitReached,

    #[error("{0}")]
    CostCeilingReached(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("{message}")]
    Generation {
        kind: ProviderErrorKind,
        message: String,
    },
}

impl TurnError {
    /// Classify a provider failure.
    pub fn generation(err: &Error) -> Self {
        Self::Generation {
            kind: ProviderErrorKind::classify(err),
            message: err.to_string(),
        }
    }

    pub fn persistence(err: &Error) -> Self {
        Self::PersistenceFailed(err.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            Self::ContentBlocked { .. } => "CONTENT_BLOCKED",
            Self::ChatNotFound => "CHAT_NOT_FOUND",
            Self::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            Self::ChatLimitReached => "CHAT_LIMIT_REACHED",
            Self::TokenLimitReached => "TOKEN_LIMIT_REACHED",
            Self::CostCeilingReached(_) => "COST_CEILING_REACHED",
            Self::Route(e) => e.code(),
            Self::PersistenceFailed(_) => "PERSISTENCE_FAILED",
            Self::Generation { kind, .. } => kind.code(),
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::PersistenceFailed(_) => true,
            Self::Generation { kind, .. } => kind.retryable(),
            _ => false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MessageTooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ContentBlocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ChatNotFound => StatusCode::NOT_FOUND,
            Self::IdempotencyConflict => StatusCode::CONFLICT,
            Self::ChatLimitReached | Self::TokenLimitReached | Self::CostCeilingReached(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            Self::Route(_) => StatusCode::FORBIDDEN,
            Self::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Generation { kind, .. } => match kind {
                ProviderErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ProviderErrorKind::ContextTooLong => StatusCode::BAD_REQUEST,
                ProviderErrorKind::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ProviderErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ProviderErrorKind::ConfigError => StatusCode::INTERNAL_SERVER_ERROR,
                ProviderErrorKind::ProviderError => StatusCode::BAD_GATEWAY,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }
}

/// Serializes as the `{code, message, retryable}` triple.
impl Serialize for TurnError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TurnError", 3)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("message", &self.to_string())?;
        s.serialize_field("retryable", &self.retryable())?;
        s.end()
    }
}

impl IntoResponse for TurnError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}
