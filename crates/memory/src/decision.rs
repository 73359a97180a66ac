//! Memory decision agent.
//!
//! Decides per turn whether retrieving long-term memory is worth it, and
//! from which sectors. Pure heuristics, no model call:
//!
//! 1. An ordered rule table (regex → [`QueryType`]) classifies the
//!    lower-cased query; first match wins. Short definitional questions
//!    ("what is docker?") are general knowledge even when they name a
//!    technology.
//! 2. A general-knowledge question phrased about the user ("what is *my*…")
//!    is re-classified as personal reflection.
//! 3. A static policy table maps the type to always / never / fallback.
//! 4. Sectors start from the type's priority list, gain secondary cues
//!    (temporal, affect, process), and are capped at three.

use asp_domain::error::{Error, Result};
use asp_domain::trace::TraceEvent;
use regex::Regex;
use serde::Serialize;

use crate::types::Sector;

/// Never more than this many sectors per decision.
pub const MAX_SECTORS: usize = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Casual,
    Calculation,
    TechnicalAdvice,
    PersonalReflection,
    Episodic,
    Emotional,
    Planning,
    Procedural,
    Creative,
    GeneralKnowledge,
    Unknown,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Calculation => "calculation",
            Self::TechnicalAdvice => "technical_advice",
            Self::PersonalReflection => "personal_reflection",
            Self::Episodic => "episodic",
            Self::Emotional => "emotional",
            Self::Planning => "planning",
            Self::Procedural => "procedural",
            Self::Creative => "creative",
            Self::GeneralKnowledge => "general_knowledge",
            Self::Unknown => "unknown",
        }
    }

    pub fn policy(self) -> MemoryPolicy {
        match self {
            Self::GeneralKnowledge | Self::Casual | Self::Calculation => MemoryPolicy::Never,
            Self::TechnicalAdvice
            | Self::PersonalReflection
            | Self::Episodic
            | Self::Emotional
            | Self::Planning => MemoryPolicy::Always,
            Self::Procedural | Self::Creative | Self::Unknown => MemoryPolicy::AskFallback,
        }
    }

    /// Sector priority list, most relevant first.
    pub fn sector_priority(self) -> &'static [Sector] {
        use Sector::*;
        match self {
            Self::TechnicalAdvice => &[Semantic, Procedural],
            Self::PersonalReflection => &[Emotional, Reflective, Episodic],
            Self::Episodic => &[Episodic, Semantic],
            Self::Emotional => &[Emotional, Episodic, Reflective],
            Self::Planning => &[Procedural, Semantic, Episodic],
            Self::Procedural => &[Procedural, Semantic],
            Self::Creative => &[Semantic, Reflective],
            Self::Unknown => &[Semantic, Episodic],
            Self::GeneralKnowledge | Self::Casual | Self::Calculation => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPolicy {
    Always,
    Never,
    /// No strong signal either way; retrieve with low confidence.
    AskFallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryDecision {
    pub query_type: QueryType,
    pub use_memory: bool,
    pub sectors: Vec<Sector>,
    pub confidence: f32,
    pub reasoning: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rule tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Evaluated top to bottom against the lower-cased query.
const RULES: &[(&str, QueryType)] = &[
    (
        r"^(hi|hello|hey|yo|thanks|thank you|good (morning|afternoon|evening|night)|ok|okay|bye|goodbye)\b[\s!.?]*$",
        QueryType::Casual,
    ),
    (
        r"^[\d\s+\-*/^().=%]+$|\b(calculate|compute|convert)\b|\bwhat is \d",
        QueryType::Calculation,
    ),
    // "what is docker?" asks for a definition, not advice.
    (
        r"^(what|who) (is|are) (an? |the )?[\w.+#-]+( [\w.+#-]+)?\s*\?*$",
        QueryType::GeneralKnowledge,
    ),
    (
        r"\b(architect\w*|database|schema|code|coding|api|deploy\w*|debug\w*|refactor\w*|algorithm|framework|library|server|backend|frontend|sql|python|rust|javascript|typescript|compiler|kubernetes|docker)\b",
        QueryType::TechnicalAdvice,
    ),
    (
        r"\b(why (do|am|can't|cant) i|i feel|i'm feeling|i am feeling|stuck|motivat\w*|my life|struggl\w*|what should i do with)\b",
        QueryType::PersonalReflection,
    ),
    (
        r"\b(remember|last time|yesterday|last (week|month|year)|we talked|you told me|i told you|earlier today)\b",
        QueryType::Episodic,
    ),
    (
        r"\b(sad|happy|anxious|angry|stressed|lonely|excited|frustrated|worried|upset|overwhelmed)\b",
        QueryType::Emotional,
    ),
    (
        r"\b(plan|planning|schedule|goal|goals|roadmap|next steps|strategy|organi[sz]e)\b",
        QueryType::Planning,
    ),
    (
        r"^how (do|can|to|should|would)\b|\bhow to\b|\bsteps to\b|\bguide\b|\btutorial\b",
        QueryType::Procedural,
    ),
    (
        r"\b(write|poem|story|imagine|brainstorm|lyrics|slogan|invent)\b",
        QueryType::Creative,
    ),
    (
        r"^(what|who|where|when|which)\b|\b(define|definition of|what's|tell me about|meaning of)\b",
        QueryType::GeneralKnowledge,
    ),
];

const PERSONAL_MARKERS: &str = r"\b(my|mine|myself|me|i|i'm|i've|i'd|your|yours)\b";
const TEMPORAL_CUES: &str =
    r"\b(yesterday|today|tomorrow|last (week|month|year|time)|ago|recently|earlier|when i)\b";
const AFFECT_CUES: &str =
    r"\b(feel|feeling|felt|sad|happy|anxious|angry|stressed|worried|love|hate|frustrat\w*|afraid)\b";
const PROCESS_CUES: &str = r"\b(how to|how do|how should|steps?|process|workflow|procedure|routine)\b";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("memory decision pattern: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compiled rule tables. Build once at startup and share.
pub struct MemoryDecisionAgent {
    rules: Vec<(Regex, QueryType)>,
    personal: Regex,
    temporal: Regex,
    affect: Regex,
    process: Regex,
}

impl MemoryDecisionAgent {
    pub fn new() -> Result<Self> {
        let rules = RULES
            .iter()
            .map(|(p, t)| compile(p).map(|re| (re, *t)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            personal: compile(PERSONAL_MARKERS)?,
            temporal: compile(TEMPORAL_CUES)?,
            affect: compile(AFFECT_CUES)?,
            process: compile(PROCESS_CUES)?,
        })
    }

    pub fn classify(&self, query: &str) -> QueryType {
        let lower = query.trim().to_lowercase();
        let matched = self
            .rules
            .iter()
            .find(|(re, _)| re.is_match(&lower))
            .map(|(_, t)| *t)
            .unwrap_or(QueryType::Unknown);

        if matched == QueryType::GeneralKnowledge && self.personal.is_match(&lower) {
            return QueryType::PersonalReflection;
        }
        matched
    }

    /// Decide for one turn. `query_type` skips classification when the
    /// caller already has it.
    pub fn decide(&self, user_id: &str, query: &str, query_type: Option<QueryType>) -> MemoryDecision {
        let query_type = query_type.unwrap_or_else(|| self.classify(query));

        let decision = match query_type.policy() {
            MemoryPolicy::Never => MemoryDecision {
                query_type,
                use_memory: false,
                sectors: Vec::new(),
                confidence: 1.0,
                reasoning: format!("{} queries do not need personal context", query_type.as_str()),
            },
            MemoryPolicy::Always => MemoryDecision {
                query_type,
                use_memory: true,
                sectors: self.select_sectors(query_type, query),
                confidence: 0.9,
                reasoning: format!("{} queries benefit from personal context", query_type.as_str()),
            },
            MemoryPolicy::AskFallback => MemoryDecision {
                query_type,
                use_memory: true,
                sectors: self.select_sectors(query_type, query),
                confidence: 0.5,
                reasoning: format!(
                    "no strong signal for {} queries; retrieving in case it helps",
                    query_type.as_str()
                ),
            },
        };

        TraceEvent::MemoryDecided {
            user_id: user_id.to_string(),
            query_type: query_type.as_str().to_string(),
            use_memory: decision.use_memory,
            sectors: decision.sectors.iter().map(|s| s.to_string()).collect(),
            confidence: decision.confidence,
        }
        .emit();

        decision
    }

    fn select_sectors(&self, query_type: QueryType, query: &str) -> Vec<Sector> {
        let lower = query.to_lowercase();
        let mut sectors: Vec<Sector> = query_type.sector_priority().to_vec();

        let cues = [
            (&self.temporal, Sector::Episodic),
            (&self.affect, Sector::Emotional),
            (&self.process, Sector::Procedural),
        ];
        for (re, sector) in cues {
            if re.is_match(&lower) && !sectors.contains(&sector) {
                sectors.push(sector);
            }
        }

        sectors.truncate(MAX_SECTORS);
        sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> MemoryDecisionAgent {
        MemoryDecisionAgent::new().unwrap()
    }

    #[test]
    fn factual_question_skips_memory() {
        let d = agent().decide("u1", "What is React?", None);
        assert_eq!(d.query_type, QueryType::GeneralKnowledge);
        assert!(!d.use_memory);
        assert!(d.sectors.is_empty());
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn architecture_question_is_technical() {
        let d = agent().decide("u1", "How should I architect my database schema?", None);
        assert_eq!(d.query_type, QueryType::TechnicalAdvice);
        assert!(d.use_memory);
        assert_eq!(&d.sectors[..2], &[Sector::Semantic, Sector::Procedural]);
    }

    #[test]
    fn definition_of_a_technology_is_general_knowledge() {
        let a = agent();
        for q in ["What is Docker?", "What is Python?", "what are microservices"] {
            let d = a.decide("u1", q, None);
            assert_eq!(d.query_type, QueryType::GeneralKnowledge, "{q}");
            assert!(!d.use_memory, "{q}");
        }
        assert_eq!(
            a.classify("What is the best way to deploy Docker on my server?"),
            QueryType::TechnicalAdvice
        );
        assert_eq!(a.classify("What is my name?"), QueryType::PersonalReflection);
    }

    #[test]
    fn first_person_struggle_is_personal_reflection() {
        let d = agent().decide("u1", "Why do I feel stuck on this project?", None);
        assert_eq!(d.query_type, QueryType::PersonalReflection);
        assert_eq!(
            d.sectors,
            vec![Sector::Emotional, Sector::Reflective, Sector::Episodic]
        );
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn general_knowledge_about_the_user_is_personal() {
        let a = agent();
        assert_eq!(a.classify("What is my favourite colour?"), QueryType::PersonalReflection);
        assert_eq!(a.classify("What is the capital of France?"), QueryType::GeneralKnowledge);
    }

    #[test]
    fn greetings_and_arithmetic_never_use_memory() {
        let a = agent();
        assert_eq!(a.classify("hey!"), QueryType::Casual);
        assert_eq!(a.classify("12 * (3 + 4)"), QueryType::Calculation);
        assert!(!a.decide("u1", "thanks", None).use_memory);
    }

    #[test]
    fn unmatched_query_falls_back_with_low_confidence() {
        let d = agent().decide("u1", "pineapple pizza", None);
        assert_eq!(d.query_type, QueryType::Unknown);
        assert!(d.use_memory);
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn secondary_cues_append_in_order_and_cap_at_three() {
        let a = agent();
        // Technical + temporal + affect cues: semantic, procedural, episodic.
        let d = a.decide(
            "u1",
            "yesterday I felt lost debugging the server",
            Some(QueryType::TechnicalAdvice),
        );
        assert_eq!(
            d.sectors,
            vec![Sector::Semantic, Sector::Procedural, Sector::Episodic]
        );
    }

    #[test]
    fn supplied_type_skips_classification() {
        let d = agent().decide("u1", "What is React?", Some(QueryType::Planning));
        assert_eq!(d.query_type, QueryType::Planning);
        assert!(d.use_memory);
    }

    #[test]
    fn every_type_has_a_policy_and_bounded_sectors() {
        for t in [
            QueryType::Casual,
            QueryType::Calculation,
            QueryType::TechnicalAdvice,
            QueryType::PersonalReflection,
            QueryType::Episodic,
            QueryType::Emotional,
            QueryType::Planning,
            QueryType::Procedural,
            QueryType::Creative,
            QueryType::GeneralKnowledge,
            QueryType::Unknown,
        ] {
            let never = t.policy() == MemoryPolicy::Never;
            assert_eq!(never, t.sector_priority().is_empty(), "{t:?}");
            assert!(t.sector_priority().len() <= MAX_SECTORS);
        }
    }
}
