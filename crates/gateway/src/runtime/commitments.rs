//! Commitment and reminder detection.
//!
//! Sentences where the user commits to something ("I'll send the report
//! on Friday") or asks to be reminded are stored as procedural memories so
//! later turns can follow up. Detection and storage are best-effort.

use regex::Regex;
use serde_json::json;

use asp_domain::error::{Error, Result};
use asp_memory::{MemoryBackend, Sector};

/// Evaluated per sentence against the lower-cased text.
const PATTERNS: &[(&str, &str)] = &[
    (r"\bremind me\b", "reminder"),
    (r"\b(don'?t|do not) let me forget\b", "reminder"),
    (
        r"\bi(?:'ll| will| need to| have to| must| promise to| plan to| am going to|'m going to)\s+\w+",
        "commitment",
    ),
    (r"\b(by|before|on|until) (tomorrow|tonight|monday|tuesday|wednesday|thursday|friday|saturday|sunday|next week|end of (the )?(day|week|month))\b", "deadline"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub text: String,
    pub kind: &'static str,
}

pub struct CommitmentDetector {
    rules: Vec<(Regex, &'static str)>,
}

impl CommitmentDetector {
    pub fn new() -> Result<Self> {
        let rules = PATTERNS
            .iter()
            .map(|(p, kind)| {
                Regex::new(p)
                    .map(|re| (re, *kind))
                    .map_err(|e| Error::Config(format!("commitment pattern: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// One entry per sentence; the first matching rule names its kind.
    pub fn detect(&self, text: &str) -> Vec<Commitment> {
        text.split(['.', '!', '?', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|sentence| {
                let lower = sentence.to_lowercase();
                self.rules
                    .iter()
                    .find(|(re, _)| re.is_match(&lower))
                    .map(|(_, kind)| Commitment {
                        text: sentence.to_string(),
                        kind,
                    })
            })
            .collect()
    }

    /// Detect and write to memory. Failures are logged and swallowed.
    pub async fn capture(&self, memory: &dyn MemoryBackend, user_id: &str, text: &str) -> usize {
        let found = self.detect(text);
        let mut stored = 0;
        for c in &found {
            let metadata = json!({ "source": "commitment", "kind": c.kind });
            match memory.add(&c.text, user_id, Sector::Procedural, metadata).await {
                Ok(()) => stored += 1,
                Err(e) => tracing::warn!(error = %e, kind = c.kind, "failed to store commitment"),
            }
        }
        if stored > 0 {
            tracing::debug!(user_id, stored, "commitments captured");
        }
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asp_memory::LocalMemory;

    #[test]
    fn finds_reminders_and_commitments() {
        let d = CommitmentDetector::new().unwrap();
        let found = d.detect("Remind me to call mom. The weather is nice! I'll finish the draft tonight.");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, "reminder");
        assert_eq!(found[1].kind, "commitment");
        assert_eq!(found[1].text, "I'll finish the draft tonight");
    }

    #[test]
    fn ordinary_questions_are_ignored() {
        let d = CommitmentDetector::new().unwrap();
        assert!(d.detect("What is the capital of France?").is_empty());
    }

    #[tokio::test]
    async fn captured_commitments_land_in_procedural_memory() {
        let d = CommitmentDetector::new().unwrap();
        let memory = LocalMemory::new();
        let n = d.capture(&memory, "u1", "I promise to review the PR by Friday.").await;
        assert_eq!(n, 1);
        assert_eq!(memory.contents_in("u1", Sector::Procedural).len(), 1);
    }
}
