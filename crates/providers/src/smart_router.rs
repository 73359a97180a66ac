//! Smart pre-routing.
//!
//! Pure, synchronous classification of a prompt as "simple" so the router
//! can send it to a model's cheaper `downgrade_to` target. No health or
//! tier logic lives here.

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyword lists
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const CODE_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "class",
    "debug",
    "python",
    "javascript",
    "typescript",
    "implement",
    "fix",
    "error",
    "bug",
];

pub const SEARCH_KEYWORDS: &[&str] = &[
    "search", "find", "latest", "news", "current", "today", "research", "look up",
];

pub const REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "compare",
    "why",
    "explain",
    "reason",
    "think through",
    "step by step",
    "plan",
];

/// Prompts with this many words or more are never simple.
pub const SIMPLE_MAX_WORDS: usize = 20;

/// Which keyword family a prompt hit, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Code,
    Search,
    Reasoning,
    Plain,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// First keyword family found in `query`, checked code → search → reasoning.
///
/// Matching is substring-based on the lower-cased prompt, so `"debugging"`
/// counts as code.
pub fn detect_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();
    let hit = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if hit(CODE_KEYWORDS) {
        QueryIntent::Code
    } else if hit(SEARCH_KEYWORDS) {
        QueryIntent::Search
    } else if hit(REASONING_KEYWORDS) {
        QueryIntent::Reasoning
    } else {
        QueryIntent::Plain
    }
}

/// Short and free of code, search or reasoning keywords.
pub fn is_simple_query(query: &str) -> bool {
    query.split_whitespace().count() < SIMPLE_MAX_WORDS && detect_intent(query) == QueryIntent::Plain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_simple() {
        assert!(is_simple_query("hi there, how are you?"));
    }

    #[test]
    fn long_prompt_is_not_simple() {
        let prompt = "word ".repeat(SIMPLE_MAX_WORDS);
        assert!(!is_simple_query(&prompt));
        let prompt = "word ".repeat(SIMPLE_MAX_WORDS - 1);
        assert!(is_simple_query(&prompt));
    }

    #[test]
    fn keyword_families_detected() {
        assert_eq!(detect_intent("Can you fix this?"), QueryIntent::Code);
        assert_eq!(detect_intent("latest news on rust"), QueryIntent::Search);
        assert_eq!(detect_intent("Explain it STEP BY STEP"), QueryIntent::Reasoning);
        assert_eq!(detect_intent("tell me a joke"), QueryIntent::Plain);
    }

    #[test]
    fn multi_word_keywords_match() {
        assert!(!is_simple_query("look up the capital of peru"));
        assert!(!is_simple_query("let's think through this"));
    }

    #[test]
    fn code_wins_over_reasoning() {
        assert_eq!(detect_intent("why does this python crash"), QueryIntent::Code);
    }
}
