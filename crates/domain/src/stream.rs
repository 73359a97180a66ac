use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (provider-agnostic).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Rough usage estimate for providers that never report usage
    /// (or streams cut short): one token per four characters.
    pub fn estimate(prompt_chars: usize, completion_chars: usize) -> Self {
        Self::new(
            estimate_tokens(prompt_chars),
            estimate_tokens(completion_chars),
        )
    }
}

/// Characters-per-token heuristic shared by quota estimation and usage
/// fallbacks.
pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(chars: usize) -> u32 {
    (chars / CHARS_PER_TOKEN).min(u32::MAX as usize) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_total_is_sum() {
        let u = Usage::new(120, 30);
        assert_eq!(u.total_tokens, 150);
    }

    #[test]
    fn estimate_uses_four_chars_per_token() {
        let u = Usage::estimate(400, 41);
        assert_eq!(u.prompt_tokens, 100);
        assert_eq!(u.completion_tokens, 10);
        assert_eq!(u.total_tokens, 110);
    }
}
