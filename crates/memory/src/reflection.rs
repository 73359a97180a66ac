//! Post-turn self-reflection: a cheap check of whether a response looks
//! like it addressed the query. Advisory only; the response has already
//! been delivered when this runs.

use serde::Serialize;
use std::collections::HashSet;

use crate::local::terms;

/// Responses shorter than this are never satisfying.
pub const MIN_RESPONSE_CHARS: usize = 50;
/// Low overlap only counts against responses shorter than this.
pub const SHORT_RESPONSE_CHARS: usize = 500;
pub const MIN_KEYWORD_OVERLAP: f64 = 0.30;

/// Function words ignored when measuring overlap.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "this", "that", "what",
    "how", "why", "can", "was", "were", "has", "have", "had", "does", "did", "from", "about",
    "into", "there", "their", "them", "they", "then", "than", "would", "could", "should",
    "will", "just", "some", "any", "all", "who", "which", "when", "where", "its",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    EnableMemory,
    DisableMemory,
}

impl RetryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnableMemory => "enable_memory",
            Self::DisableMemory => "disable_memory",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reflection {
    pub satisfied: bool,
    pub reasoning: String,
    /// Set only when not satisfied: try the turn the other way round.
    pub retry_strategy: Option<RetryStrategy>,
    pub keyword_overlap: f64,
}

fn keywords(text: &str) -> HashSet<String> {
    terms(text)
        .into_iter()
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Share of the query's keywords that appear in the response. A query with
/// no keywords overlaps fully.
pub fn keyword_overlap(query: &str, response: &str) -> f64 {
    let q = keywords(query);
    if q.is_empty() {
        return 1.0;
    }
    let r = keywords(response);
    q.intersection(&r).count() as f64 / q.len() as f64
}

pub fn reflect(query: &str, response: &str, memory_used: bool) -> Reflection {
    let len = response.chars().count();
    let overlap = keyword_overlap(query, response);

    let problem = if len < MIN_RESPONSE_CHARS {
        Some(format!("response is only {len} characters"))
    } else if overlap < MIN_KEYWORD_OVERLAP && len < SHORT_RESPONSE_CHARS {
        Some(format!(
            "short response covers {:.0}% of the query's keywords",
            overlap * 100.0
        ))
    } else {
        None
    };

    match problem {
        None => Reflection {
            satisfied: true,
            reasoning: format!("response addresses the query ({:.0}% keyword overlap)", overlap * 100.0),
            retry_strategy: None,
            keyword_overlap: overlap,
        },
        Some(reasoning) => Reflection {
            satisfied: false,
            reasoning,
            retry_strategy: Some(if memory_used {
                RetryStrategy::DisableMemory
            } else {
                RetryStrategy::EnableMemory
            }),
            keyword_overlap: overlap,
        },
    }
}
