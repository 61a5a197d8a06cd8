//! Pairwise match scoring (§4.3.2).
//!
//! Evidence kinds are a fixed, tagged-variant enum rather than a registry of
//! late-bound scoring plug-ins (§9, "Dynamic scoring plug-ins"): widening the
//! enum is how a new evidence channel gets added, which keeps `MatchScore`'s
//! serialized shape stable across versions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::{Display, EnumString};

/// A single evidence token contributed to, or withheld from, a pairwise
/// score. Serializes to the exact strings used in spec scenarios (`isnC`,
/// `no-ipid`, ...) so the JSON wire shape and the test fixtures agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum Evidence {
    #[strum(serialize = "no-3tuple")]
    #[serde(rename = "no-3tuple")]
    NoThreeTuple,
    #[strum(serialize = "no-ipid")]
    #[serde(rename = "no-ipid")]
    NoIpid,
    #[strum(serialize = "no-time-overlap")]
    #[serde(rename = "no-time-overlap")]
    NoTimeOverlap,
    #[strum(serialize = "isnC")]
    #[serde(rename = "isnC")]
    ClientIsn,
    #[strum(serialize = "isnS")]
    #[serde(rename = "isnS")]
    ServerIsn,
    #[strum(serialize = "synopts")]
    #[serde(rename = "synopts")]
    SynOptions,
    #[strum(serialize = "payloadC")]
    #[serde(rename = "payloadC")]
    ClientPayload,
    #[strum(serialize = "payloadS")]
    #[serde(rename = "payloadS")]
    ServerPayload,
    #[strum(serialize = "lengthsig")]
    #[serde(rename = "lengthsig")]
    LengthSignature,
    #[strum(serialize = "ipid")]
    #[serde(rename = "ipid")]
    Ipid,
    #[strum(serialize = "force-accept")]
    #[serde(rename = "force-accept")]
    ForceAccept,
    #[strum(serialize = "microflow-accept")]
    #[serde(rename = "microflow-accept")]
    MicroflowAccept,
}

/// The outcome of scoring one `(a, b)` connection pair (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    /// `raw / max(available_weight, epsilon)`, or `0` if any gate failed.
    pub normalized: f64,
    /// Sum of `weight * score` over available features.
    pub raw: f64,
    /// Sum of weights of available features.
    pub available_weight: f64,
    pub ipid_match: bool,
    pub evidence: BTreeSet<Evidence>,
    pub force_accept: bool,
    pub microflow_accept: bool,
}

impl MatchScore {
    pub const EPSILON: f64 = 1e-9;

    /// A score for a pair that failed a mandatory gate.
    pub fn gate_failure(token: Evidence) -> Self {
        let mut evidence = BTreeSet::new();
        evidence.insert(token);
        MatchScore {
            normalized: 0.0,
            raw: 0.0,
            available_weight: 0.0,
            ipid_match: false,
            evidence,
            force_accept: false,
            microflow_accept: false,
        }
    }

    /// `true` once gated (§4.3.1): mandatory gates must be checked before a
    /// `MatchScore` other than [`gate_failure`] is constructed.
    pub fn passed_gates(&self) -> bool {
        !self.evidence.contains(&Evidence::NoThreeTuple)
            && !self.evidence.contains(&Evidence::NoIpid)
            && !self.evidence.contains(&Evidence::NoTimeOverlap)
    }

    pub fn passes_threshold(&self, threshold: f64) -> bool {
        self.passed_gates() && (self.force_accept || self.microflow_accept || self.normalized >= threshold)
    }
}
