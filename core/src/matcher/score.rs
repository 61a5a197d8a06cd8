//! Pairwise feature scoring (§4.3.2).

use captrace_datatypes::{Connection, Evidence, MatchScore};

struct Feature {
    weight: f64,
    available: bool,
    score: f64,
    evidence: Option<Evidence>,
}

/// Scores a pair that has already cleared the mandatory gates. `ipid_match`
/// is unconditionally `true`: scoring is only ever invoked post-gate, and
/// the gate already proved a non-empty IPID intersection.
pub fn score_pair(a: &Connection, b: &Connection) -> MatchScore {
    let client_isn_match = matches(a.client_isn, b.client_isn);
    let server_isn_match = matches(a.server_isn, b.server_isn);
    let syn_options_match = matches_ref(&a.syn_options, &b.syn_options);
    let client_payload_match = matches(a.client_payload_md5, b.client_payload_md5);
    let server_payload_match = matches(a.server_payload_md5, b.server_payload_md5);
    let length_sig_ratio = length_signature_ratio(a, b);

    let features = [
        Feature {
            weight: 0.20,
            available: a.client_isn.is_some() && b.client_isn.is_some(),
            score: bool_score(client_isn_match),
            evidence: Some(Evidence::ClientIsn),
        },
        Feature {
            weight: 0.20,
            available: a.server_isn.is_some() && b.server_isn.is_some(),
            score: bool_score(server_isn_match),
            evidence: Some(Evidence::ServerIsn),
        },
        Feature {
            weight: 0.10,
            available: a.syn_options.is_some() && b.syn_options.is_some(),
            score: bool_score(syn_options_match),
            evidence: Some(Evidence::SynOptions),
        },
        Feature {
            weight: 0.15,
            available: a.client_payload_md5.is_some() && b.client_payload_md5.is_some(),
            score: bool_score(client_payload_match),
            evidence: Some(Evidence::ClientPayload),
        },
        Feature {
            weight: 0.15,
            available: a.server_payload_md5.is_some() && b.server_payload_md5.is_some(),
            score: bool_score(server_payload_match),
            evidence: Some(Evidence::ServerPayload),
        },
        Feature {
            weight: 0.15,
            available: a.length_signature.len() >= 2 && b.length_signature.len() >= 2,
            score: length_sig_ratio.unwrap_or(0.0),
            evidence: Some(Evidence::LengthSignature),
        },
        Feature {
            weight: 0.05,
            available: true,
            score: 1.0,
            evidence: Some(Evidence::Ipid),
        },
    ];

    let mut raw = 0.0;
    let mut available_weight = 0.0;
    let mut evidence = std::collections::BTreeSet::new();
    for feature in &features {
        if feature.available {
            available_weight += feature.weight;
            raw += feature.weight * feature.score;
            if feature.score >= 1.0 - MatchScore::EPSILON {
                if let Some(token) = feature.evidence {
                    evidence.insert(token);
                }
            }
        }
    }

    let normalized = if available_weight > 0.0 {
        raw / available_weight
    } else {
        0.0
    };

    let mut score = MatchScore {
        normalized,
        raw,
        available_weight,
        ipid_match: true,
        evidence,
        force_accept: false,
        microflow_accept: false,
    };

    let isn_matched = client_isn_match == Some(true) || server_isn_match == Some(true);
    let payload_matched = client_payload_match == Some(true) || server_payload_match == Some(true);

    let force_all_four = client_isn_match == Some(true)
        && server_isn_match == Some(true)
        && client_payload_match == Some(true)
        && server_payload_match == Some(true);
    let force_length_and_isn = length_sig_ratio == Some(1.0) && isn_matched;

    if force_all_four || force_length_and_isn {
        score.force_accept = true;
        score.normalized = 1.0;
        score.evidence.insert(Evidence::ForceAccept);
    } else if (a.is_microflow() || b.is_microflow()) && normalized >= 0.5 && (isn_matched || payload_matched) {
        score.microflow_accept = true;
        score.evidence.insert(Evidence::MicroflowAccept);
    }

    score
}

#[inline]
fn bool_score(matched: Option<bool>) -> f64 {
    if matched == Some(true) {
        1.0
    } else {
        0.0
    }
}

#[inline]
fn matches<T: PartialEq>(a: Option<T>, b: Option<T>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a == b),
        _ => None,
    }
}

#[inline]
fn matches_ref<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a == b),
        _ => None,
    }
}

/// Longest-common-prefix ratio of two signed-length sequences, or `None` if
/// either side has fewer than two entries.
fn length_signature_ratio(a: &Connection, b: &Connection) -> Option<f64> {
    if a.length_signature.len() < 2 || b.length_signature.len() < 2 {
        return None;
    }
    let lcp = a
        .length_signature
        .iter()
        .zip(b.length_signature.iter())
        .take_while(|(x, y)| x == y)
        .count();
    let denom = a.length_signature.len().min(b.length_signature.len());
    Some((lcp as f64 / denom as f64).clamp(0.0, 1.0))
}
