//! The result of correlating two captures (C4 output, §6 wire shape).

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::policy::MatchMode;
use crate::score::MatchScore;
use crate::StreamId;

/// An ordered pair of matched connections plus the score that produced the
/// match. Immutable once created; holds owned data, never a reference back
/// into either capture's `StreamTable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMatch {
    #[serde(rename = "conn1")]
    pub a: Connection,
    #[serde(rename = "conn2")]
    pub b: Connection,
    pub score: MatchScore,
}

/// Wire-stable version tag for [`MatchSet`]. Bump only on a breaking change
/// to the JSON shape.
pub const MATCH_SET_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSetMetadata {
    pub total_connections_1: usize,
    pub total_connections_2: usize,
    pub matched_pairs: usize,
    pub unmatched_1: usize,
    pub unmatched_2: usize,
    pub match_rate_1: f64,
    pub match_rate_2: f64,
    pub average_score: f64,
    pub match_mode: MatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_matches_per_conn1: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_matches_per_conn1: Option<f64>,
}

/// The result of correlating capture `file1` against capture `file2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSet {
    pub version: String,
    pub file1: String,
    pub file2: String,
    pub metadata: MatchSetMetadata,
    pub matches: Vec<ConnectionMatch>,
    #[serde(skip)]
    pub unmatched_a: Vec<StreamId>,
    #[serde(skip)]
    pub unmatched_b: Vec<StreamId>,
}

impl MatchSet {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
