//! Pairwise connection matching (C4).
//!
//! Bucketing, gating, scoring and assignment are split into their own
//! modules; [`correlate`] wires them into the public entry point for §4.3.
//! [`correlate_parallel`] is the same pipeline fanned out over bucket
//! granularity (§5).

mod assign;
mod bucket;
mod gate;
mod score;

use log::debug;

use captrace_datatypes::connection::Connection;
use captrace_datatypes::matchset::{ConnectionMatch, MatchSet, MatchSetMetadata, MATCH_SET_VERSION};
use captrace_datatypes::policy::{MatchMode, MatchPolicy};
use captrace_datatypes::StreamId;

use self::assign::Candidate;
use crate::cancel::CancellationToken;

/// Scores every `(a_index, b_index)` pair drawn from `a_indices x b_indices`
/// that clears the mandatory gates and the policy threshold.
fn score_bucket(
    a: &[Connection],
    b: &[Connection],
    a_indices: &[usize],
    b_indices: &[usize],
    policy: &MatchPolicy,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for &a_index in a_indices {
        let conn_a = &a[a_index];
        for &b_index in b_indices {
            let conn_b = &b[b_index];
            if gate::check_gates(conn_a, conn_b, policy.require_time_overlap).is_err() {
                continue;
            }
            let score = score::score_pair(conn_a, conn_b);
            if score.passes_threshold(policy.threshold) {
                candidates.push(Candidate { a_index, b_index, score });
            }
        }
    }
    candidates
}

/// Correlates two captures' stream fingerprints under `policy`, returning a
/// complete [`MatchSet`] (§4.3, §6). Empty input produces an empty result;
/// this is a data condition, not an error (§4.3.5, §7).
pub fn correlate(a: &[Connection], b: &[Connection], file1: &str, file2: &str, policy: &MatchPolicy) -> MatchSet {
    let kind = bucket::effective_kind(policy.bucket, a, b);
    let b_by_key = bucket::index_by_key(kind, b);

    let mut candidates = Vec::new();
    for (a_index, conn_a) in a.iter().enumerate() {
        let bucket_key = bucket::key_for(kind, conn_a);
        let Some(b_indices) = b_by_key.get(&bucket_key) else {
            continue;
        };
        candidates.extend(score_bucket(a, b, &[a_index], b_indices, policy));
    }

    let matches = match policy.match_mode {
        MatchMode::OneToOne => assign::assign_one_to_one(candidates, a, b),
        MatchMode::OneToMany => assign::assign_one_to_many(candidates, a, b),
    };

    build_match_set(a, b, file1, file2, policy.match_mode, matches)
}

/// Same pipeline as [`correlate`], but candidate generation is fanned out
/// over one scoped thread per non-empty bucket, with results merged through
/// a `crossbeam` channel (§5: "each bucket is processed to completion before
/// merging into a shared output vector ... via a concurrent queue"). `cancel`
/// is polled between buckets; a cancellation observed mid-run discards the
/// buckets not yet dispatched and returns a `MatchSet` built only from the
/// work completed so far, per §5's "partial results are discarded, not
/// persisted" (the discarded buckets' candidates never entered the channel).
pub fn correlate_parallel(
    a: &[Connection],
    b: &[Connection],
    file1: &str,
    file2: &str,
    policy: &MatchPolicy,
    cancel: &CancellationToken,
) -> MatchSet {
    let kind = bucket::effective_kind(policy.bucket, a, b);
    let a_by_key = bucket::index_by_key(kind, a);
    let b_by_key = bucket::index_by_key(kind, b);
    debug!("matcher: {} buckets on the A side under {:?}", a_by_key.len(), kind);

    let (tx, rx) = crossbeam::channel::unbounded();
    std::thread::scope(|scope| {
        for (key, a_indices) in &a_by_key {
            if cancel.is_cancelled() {
                debug!("matcher: cancellation observed, {} buckets left undispatched", a_by_key.len());
                break;
            }
            let Some(b_indices) = b_by_key.get(key) else {
                continue;
            };
            let tx = tx.clone();
            let a_indices = a_indices.as_slice();
            let b_indices = b_indices.as_slice();
            scope.spawn(move || {
                let local = score_bucket(a, b, a_indices, b_indices, policy);
                let _ = tx.send(local);
            });
        }
    });
    drop(tx);

    let mut candidates = Vec::new();
    while let Ok(local) = rx.recv() {
        candidates.extend(local);
    }

    let matches = match policy.match_mode {
        MatchMode::OneToOne => assign::assign_one_to_one(candidates, a, b),
        MatchMode::OneToMany => assign::assign_one_to_many(candidates, a, b),
    };

    build_match_set(a, b, file1, file2, policy.match_mode, matches)
}

fn build_match_set(
    a: &[Connection],
    b: &[Connection],
    file1: &str,
    file2: &str,
    match_mode: MatchMode,
    matches: Vec<ConnectionMatch>,
) -> MatchSet {
    let matched_a: std::collections::HashSet<StreamId> = matches.iter().map(|m| m.a.stream_id).collect();
    let matched_b: std::collections::HashSet<StreamId> = matches.iter().map(|m| m.b.stream_id).collect();

    let unmatched_a: Vec<StreamId> = a
        .iter()
        .map(|c| c.stream_id)
        .filter(|id| !matched_a.contains(id))
        .collect();
    let unmatched_b: Vec<StreamId> = b
        .iter()
        .map(|c| c.stream_id)
        .filter(|id| !matched_b.contains(id))
        .collect();

    let average_score = if matches.is_empty() {
        0.0
    } else {
        matches.iter().map(|m| m.score.normalized).sum::<f64>() / matches.len() as f64
    };

    let (max_matches_per_conn1, avg_matches_per_conn1) = if match_mode == MatchMode::OneToMany && !matches.is_empty() {
        let mut counts: std::collections::HashMap<StreamId, usize> = std::collections::HashMap::new();
        for m in &matches {
            *counts.entry(m.a.stream_id).or_insert(0) += 1;
        }
        let max = counts.values().copied().max().unwrap_or(0);
        let avg = counts.values().sum::<usize>() as f64 / counts.len() as f64;
        (Some(max), Some(avg))
    } else {
        (None, None)
    };

    let metadata = MatchSetMetadata {
        total_connections_1: a.len(),
        total_connections_2: b.len(),
        matched_pairs: matches.len(),
        unmatched_1: unmatched_a.len(),
        unmatched_2: unmatched_b.len(),
        match_rate_1: rate(matched_a.len(), a.len()),
        match_rate_2: rate(matched_b.len(), b.len()),
        average_score,
        match_mode,
        max_matches_per_conn1,
        avg_matches_per_conn1,
    };

    MatchSet {
        version: MATCH_SET_VERSION.to_string(),
        file1: file1.to_string(),
        file2: file2.to_string(),
        metadata,
        matches,
        unmatched_a,
        unmatched_b,
    }
}

fn rate(matched: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use captrace_datatypes::connection::{Endpoint, Protocol};
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    fn conn(stream_id: StreamId, client_port: u16, server_port: u16, client_ip: Ipv4Addr, server_ip: Ipv4Addr, isn: u32, ipids: &[u16]) -> Connection {
        Connection {
            stream_id,
            client: Endpoint::new(client_ip, client_port),
            server: Endpoint::new(server_ip, server_port),
            protocol: Protocol::Tcp,
            client_isn: Some(isn),
            server_isn: Some(isn + 1),
            syn_options: None,
            client_payload_md5: None,
            server_payload_md5: None,
            length_signature: vec![],
            client_ipid_set: ipids.iter().copied().collect(),
            server_ipid_set: BTreeSet::new(),
            client_ttl: None,
            server_ttl: None,
            first_packet_time: 0,
            last_packet_time: 10_000,
            total_bytes: 0,
            packet_count: 10,
        }
    }

    #[test]
    fn s1_nat_rewrite_matches() {
        let a = vec![conn(1, 39765, 6096, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 30, 50, 101), 0x1111, &[100, 101, 102])];
        let b = vec![conn(2, 39765, 6096, Ipv4Addr::new(172, 16, 0, 1), Ipv4Addr::new(192, 168, 1, 1), 0x1111, &[100, 101, 102])];
        let set = correlate(&a, &b, "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.6));
        assert_eq!(set.matches.len(), 1);
        assert!(set.matches[0].score.normalized >= 0.72);
    }

    #[test]
    fn s3_port_mismatch_unmatched() {
        let a = vec![conn(1, 39765, 6096, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 0x1111, &[100])];
        let b = vec![conn(2, 39765, 9000, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 0x1111, &[100])];
        let set = correlate(&a, &b, "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.6));
        assert!(set.matches.is_empty());
        assert_eq!(set.unmatched_a, vec![1]);
        assert_eq!(set.unmatched_b, vec![2]);
    }

    #[test]
    fn empty_input_is_empty_match_set() {
        let set = correlate(&[], &[], "a.pcap", "b.pcap", &MatchPolicy::default());
        assert!(set.matches.is_empty());
        assert_eq!(set.metadata.matched_pairs, 0);
    }

    #[test]
    fn parallel_path_agrees_with_sequential_path() {
        let a = vec![
            conn(1, 39765, 6096, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 30, 50, 101), 0x1111, &[100, 101, 102]),
            conn(3, 1, 2, Ipv4Addr::new(10, 0, 0, 3), Ipv4Addr::new(10, 0, 0, 4), 0x3333, &[9]),
        ];
        let b = vec![
            conn(2, 39765, 6096, Ipv4Addr::new(172, 16, 0, 1), Ipv4Addr::new(192, 168, 1, 1), 0x1111, &[100, 101, 102]),
            conn(4, 1, 2, Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 6), 0x3333, &[9]),
        ];
        let policy = MatchPolicy::one_to_one(0.6);
        let cancel = CancellationToken::new();
        let sequential = correlate(&a, &b, "a.pcap", "b.pcap", &policy);
        let parallel = correlate_parallel(&a, &b, "a.pcap", "b.pcap", &policy, &cancel);
        assert_eq!(sequential.to_json().unwrap(), parallel.to_json().unwrap());
    }

    #[test]
    fn parallel_path_honors_pre_signalled_cancellation() {
        let a = vec![conn(1, 39765, 6096, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 30, 50, 101), 0x1111, &[100])];
        let b = vec![conn(2, 39765, 6096, Ipv4Addr::new(172, 16, 0, 1), Ipv4Addr::new(192, 168, 1, 1), 0x1111, &[100])];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let set = correlate_parallel(&a, &b, "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.6), &cancel);
        assert!(set.matches.is_empty());
    }
}
