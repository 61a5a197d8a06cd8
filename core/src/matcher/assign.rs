//! Candidate assignment (§4.3.4).

use std::collections::HashSet;

use captrace_datatypes::connection::Connection;
use captrace_datatypes::matchset::ConnectionMatch;
use captrace_datatypes::score::MatchScore;

/// A scored candidate pair, prior to assignment.
pub struct Candidate {
    pub a_index: usize,
    pub b_index: usize,
    pub score: MatchScore,
}

/// Sort key for one-to-one assignment (§4.3.4): `(force_accept, normalized,
/// raw, −stream_id_a, −stream_id_b)` descending. Comparing `-stream_id` as
/// an `i64` keeps the ordering total even though stream-ids are unsigned.
fn sort_key(c: &Candidate, a: &[Connection], b: &[Connection]) -> (bool, f64, f64, i64, i64) {
    (
        c.score.force_accept,
        c.score.normalized,
        c.score.raw,
        -(a[c.a_index].stream_id as i64),
        -(b[c.b_index].stream_id as i64),
    )
}

/// Greedy injective assignment: highest-scoring candidates win first, and
/// once an endpoint is used it cannot be reused (§4.3.4, one-to-one mode).
pub fn assign_one_to_one(mut candidates: Vec<Candidate>, a: &[Connection], b: &[Connection]) -> Vec<ConnectionMatch> {
    candidates.sort_by(|x, y| sort_key(y, a, b).partial_cmp(&sort_key(x, a, b)).unwrap());

    let mut used_a = HashSet::new();
    let mut used_b = HashSet::new();
    let mut matches = Vec::new();
    for c in candidates {
        if used_a.contains(&c.a_index) || used_b.contains(&c.b_index) {
            continue;
        }
        used_a.insert(c.a_index);
        used_b.insert(c.b_index);
        matches.push(ConnectionMatch {
            a: a[c.a_index].clone(),
            b: b[c.b_index].clone(),
            score: c.score,
        });
    }
    matches
}

/// Every cleared candidate is emitted; a stream may appear many times
/// (§4.3.4, one-to-many mode). Ordered the same way as one-to-one for
/// output determinism even though nothing is dropped.
pub fn assign_one_to_many(mut candidates: Vec<Candidate>, a: &[Connection], b: &[Connection]) -> Vec<ConnectionMatch> {
    candidates.sort_by(|x, y| sort_key(y, a, b).partial_cmp(&sort_key(x, a, b)).unwrap());
    candidates
        .into_iter()
        .map(|c| ConnectionMatch {
            a: a[c.a_index].clone(),
            b: b[c.b_index].clone(),
            score: c.score,
        })
        .collect()
}
