//! Matcher policy: the knobs a caller sets before invoking the matcher.

use serde::{Deserialize, Serialize};

/// Assignment strategy (§4.3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    /// Injective partial map `A ↔ B`; each stream matches at most once.
    OneToOne,
    /// Every candidate clearing the threshold and gates is emitted; a
    /// stream may appear in many matches.
    OneToMany,
}

/// Candidate pre-partitioning strategy (§4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketKind {
    /// No pre-partitioning; compare every pair.
    None,
    /// Partition by `server_ip`.
    Server,
    /// Partition by the port-pair gate key.
    Port,
}

/// Matcher policy (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    pub match_mode: MatchMode,
    pub threshold: f64,
    pub bucket: BucketKind,
    pub require_time_overlap: bool,
}

impl MatchPolicy {
    /// The default policy: one-to-one, threshold 0.6, bucketed by port-pair.
    pub fn one_to_one(threshold: f64) -> Self {
        MatchPolicy {
            match_mode: MatchMode::OneToOne,
            threshold,
            bucket: BucketKind::Port,
            require_time_overlap: false,
        }
    }

    /// One-to-many mode mandates time overlap per §4.3.1.
    pub fn one_to_many(threshold: f64) -> Self {
        MatchPolicy {
            match_mode: MatchMode::OneToMany,
            threshold,
            bucket: BucketKind::Port,
            require_time_overlap: true,
        }
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy::one_to_one(0.6)
    }
}
