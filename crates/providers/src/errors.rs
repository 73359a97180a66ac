//! Classification of generation failures into the client-facing taxonomy.

use asp_domain::error::Error;

/// What went wrong with a generation call, as far as the caller cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    ContextTooLong,
    ProviderUnavailable,
    Timeout,
    ConfigError,
    ProviderError,
}

impl ProviderErrorKind {
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Timeout(_) => Self::Timeout,
            Error::Http(_) => Self::ProviderUnavailable,
            Error::Auth(_) | Error::Config(_) => Self::ConfigError,
            Error::Provider { message, .. } => classify_message(message),
            _ => Self::ProviderError,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::ContextTooLong => "CONTEXT_TOO_LONG",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::ProviderError => "PROVIDER_ERROR",
        }
    }

    pub fn retryable(self) -> bool {
        !matches!(self, Self::ContextTooLong | Self::ConfigError)
    }

    /// Whether the failure says something about the model's health.
    /// Caller-side problems (oversized prompt, bad key) do not trip the
    /// breaker.
    pub fn counts_against_health(self) -> bool {
        !matches!(self, Self::ContextTooLong | Self::ConfigError)
    }
}

/// Adapters format non-2xx responses as `HTTP {status} - {body}`.
fn http_status(message: &str) -> Option<u16> {
    let rest = message.split("HTTP ").nth(1)?;
    rest.get(..3)?.parse().ok()
}

fn classify_message(message: &str) -> ProviderErrorKind {
    let lower = message.to_ascii_lowercase();
    match http_status(message) {
        Some(429) => return ProviderErrorKind::RateLimited,
        Some(413) => return ProviderErrorKind::ContextTooLong,
        Some(401) | Some(403) => return ProviderErrorKind::ConfigError,
        Some(408) => return ProviderErrorKind::Timeout,
        Some(s) if s >= 500 => return ProviderErrorKind::ProviderUnavailable,
        _ => {}
    }
    if lower.contains("rate limit") {
        ProviderErrorKind::RateLimited
    } else if lower.contains("context_length")
        || lower.contains("context length")
        || lower.contains("maximum context")
    {
        ProviderErrorKind::ContextTooLong
    } else {
        ProviderErrorKind::ProviderError
    }
}
