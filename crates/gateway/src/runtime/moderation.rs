//! Inbound content screening.
//!
//! The [`Moderator`] seam scores a message before any side effect. A
//! scorer that errors is treated as an allow: moderation fails open with
//! a warning rather than taking the chat down with it.

use regex::{Regex, RegexBuilder};

use asp_domain::error::{Error, Result};

use super::error::TurnError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block { reason: String },
}

#[async_trait::async_trait]
pub trait Moderator: Send + Sync {
    async fn check(&self, content: &str) -> Result<Verdict>;
}

/// Case-insensitive whole-word blocklist.
pub struct BlocklistModerator {
    pattern: Option<Regex>,
}

impl BlocklistModerator {
    pub fn new(terms: &[String]) -> Result<Self> {
        let escaped: Vec<String> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(regex::escape)
            .collect();
        if escaped.is_empty() {
            return Ok(Self { pattern: None });
        }
        let pattern = RegexBuilder::new(&format!(r"\b(?:{})\b", escaped.join("|")))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("turn.blocked_terms: {e}")))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }
}

#[async_trait::async_trait]
impl Moderator for BlocklistModerator {
    async fn check(&self, content: &str) -> Result<Verdict> {
        let Some(pattern) = &self.pattern else {
            return Ok(Verdict::Allow);
        };
        Ok(match pattern.find(content) {
            Some(m) => Verdict::Block {
                reason: format!("contains blocked term '{}'", m.as_str().to_lowercase()),
            },
            None => Verdict::Allow,
        })
    }
}

/// Run the moderator, failing open on scorer errors.
pub async fn screen(moderator: &dyn Moderator, content: &str) -> std::result::Result<(), TurnError> {
    match moderator.check(content).await {
        Ok(Verdict::Allow) => Ok(()),
        Ok(Verdict::Block { reason }) => Err(TurnError::ContentBlocked { reason }),
        Err(e) => {
            tracing::warn!(error = %e, "moderation check failed; allowing message");
            Ok(())
        }
    }
}
