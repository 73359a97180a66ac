//! Memory sectors and the DTOs exchanged with the memory service.
//!
//! Wire fields are `camelCase`, like the rest of the memory service API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of memory an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    /// Events: what happened, when.
    Episodic,
    /// Facts about the user and their world.
    Semantic,
    /// How-to knowledge and commitments.
    Procedural,
    Emotional,
    /// Insights and conclusions.
    Reflective,
}

impl Sector {
    pub fn as_str(self) -> &'static str {
        match self {
            Sector::Episodic => "episodic",
            Sector::Semantic => "semantic",
            Sector::Procedural => "procedural",
            Sector::Emotional => "emotional",
            Sector::Reflective => "reflective",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Sector::Episodic),
            "semantic" => Ok(Sector::Semantic),
            "procedural" => Ok(Sector::Procedural),
            "emotional" => Ok(Sector::Emotional),
            "reflective" => Ok(Sector::Reflective),
            other => Err(format!("unknown sector '{other}'")),
        }
    }
}

/// One retrieved memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub content: String,
    pub sector: Sector,
    /// Relevance/importance in `0.0..=1.0`.
    #[serde(default)]
    pub salience: f32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// REST DTOs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/memories/search - request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub user_id: &'a str,
    pub limit: u32,
}

/// POST /api/memories/search - response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub memories: Vec<MemoryHit>,
}

/// POST /api/memories - request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemoryRequest<'a> {
    pub content: &'a str,
    pub user_id: &'a str,
    pub sector: Sector,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_is_camel_case() {
        let req = SearchRequest {
            query: "favourite editor",
            user_id: "u1",
            limit: 5,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["limit"], 5);
    }

    #[test]
    fn hit_parses_without_salience() {
        let hit: MemoryHit =
            serde_json::from_str(r#"{"content":"likes vim","sector":"semantic"}"#).unwrap();
        assert_eq!(hit.sector, Sector::Semantic);
        assert_eq!(hit.salience, 0.0);
    }

    #[test]
    fn null_metadata_is_omitted() {
        let req = AddMemoryRequest {
            content: "x",
            user_id: "u1",
            sector: Sector::Procedural,
            metadata: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(json["sector"], "procedural");
    }

    #[test]
    fn sector_round_trips_through_str() {
        for s in [
            Sector::Episodic,
            Sector::Semantic,
            Sector::Procedural,
            Sector::Emotional,
            Sector::Reflective,
        ] {
            assert_eq!(s.as_str().parse::<Sector>().unwrap(), s);
        }
        assert!("mystery".parse::<Sector>().is_err());
    }
}
