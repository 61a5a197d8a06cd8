//! Integration coverage for the concrete scenarios and cross-cutting
//! properties in the correlation design (S1-S6 plus the determinism,
//! injectivity and idempotence properties).

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use pretty_assertions::assert_eq;

use captrace_core::matcher::correlate;
use captrace_core::topology::infer_topology;
use captrace_datatypes::connection::{Connection, Endpoint, Protocol};
use captrace_datatypes::policy::MatchPolicy;
use captrace_datatypes::topology::TopologyLabel;

fn conn(
    stream_id: u32,
    client: (Ipv4Addr, u16),
    server: (Ipv4Addr, u16),
    client_isn: u32,
    server_isn: u32,
    client_ipids: &[u16],
    first: u64,
    last: u64,
) -> Connection {
    Connection {
        stream_id,
        client: Endpoint::new(client.0, client.1),
        server: Endpoint::new(server.0, server.1),
        protocol: Protocol::Tcp,
        client_isn: Some(client_isn),
        server_isn: Some(server_isn),
        syn_options: None,
        client_payload_md5: None,
        server_payload_md5: None,
        length_signature: vec![],
        client_ipid_set: client_ipids.iter().copied().collect(),
        server_ipid_set: BTreeSet::new(),
        client_ttl: None,
        server_ttl: None,
        first_packet_time: first,
        last_packet_time: last,
        total_bytes: 0,
        packet_count: 20,
    }
}

#[test]
fn s1_nat_rewrite_matches_with_expected_evidence() {
    let a = conn(
        1,
        (Ipv4Addr::new(10, 0, 0, 1), 39765),
        (Ipv4Addr::new(10, 30, 50, 101), 6096),
        0x1111,
        0x2222,
        &[100, 101, 102],
        0,
        10_000,
    );
    let b = conn(
        2,
        (Ipv4Addr::new(172, 16, 0, 1), 39765),
        (Ipv4Addr::new(192, 168, 1, 1), 6096),
        0x1111,
        0x2222,
        &[100, 101, 102],
        0,
        10_000,
    );
    let set = correlate(&[a], &[b], "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.6));
    assert_eq!(set.matches.len(), 1);
    let m = &set.matches[0];
    assert!(m.score.normalized >= 0.72, "{}", m.score.normalized);
    let tokens: Vec<String> = m.score.evidence.iter().map(|e| e.to_string()).collect();
    assert!(tokens.contains(&"isnC".to_string()));
    assert!(tokens.contains(&"isnS".to_string()));
    assert!(tokens.contains(&"ipid".to_string()));
}

#[test]
fn s2_no_ipid_overlap_fails_gate() {
    let a = conn(
        1,
        (Ipv4Addr::new(10, 0, 0, 1), 39765),
        (Ipv4Addr::new(10, 30, 50, 101), 6096),
        0x1111,
        0x2222,
        &[100, 101, 102],
        0,
        10_000,
    );
    let b = conn(
        2,
        (Ipv4Addr::new(172, 16, 0, 1), 39765),
        (Ipv4Addr::new(192, 168, 1, 1), 6096),
        0x1111,
        0x2222,
        &[200, 201],
        0,
        10_000,
    );
    let set = correlate(&[a], &[b], "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.6));
    assert!(set.matches.is_empty());
}

#[test]
fn s3_port_mismatch_fails_gate() {
    let a = conn(
        1,
        (Ipv4Addr::new(10, 0, 0, 1), 39765),
        (Ipv4Addr::new(10, 0, 0, 2), 6096),
        0x1111,
        0x2222,
        &[100],
        0,
        10_000,
    );
    let b = conn(
        2,
        (Ipv4Addr::new(10, 0, 0, 1), 39765),
        (Ipv4Addr::new(10, 0, 0, 2), 9000),
        0x1111,
        0x2222,
        &[100],
        0,
        10_000,
    );
    let set = correlate(&[a], &[b], "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.6));
    assert!(set.matches.is_empty());
}

#[test]
fn s4_long_vs_segmented_one_to_many_vs_one_to_one() {
    let a = conn(
        1,
        (Ipv4Addr::new(10, 0, 0, 1), 40000),
        (Ipv4Addr::new(10, 0, 0, 2), 443),
        0xAAAA,
        0xBBBB,
        &[1, 2, 3],
        0,
        16_000,
    );
    let b_streams: Vec<Connection> = (0..16)
        .map(|i| {
            conn(
                100 + i,
                (Ipv4Addr::new(10, 0, 0, 1), 40000),
                (Ipv4Addr::new(10, 0, 0, 2), 443),
                0xAAAA,
                0xBBBB,
                &[1, 2, 3],
                i as u64 * 1000,
                i as u64 * 1000 + 1000,
            )
        })
        .collect();

    let one_to_many = correlate(&[a.clone()], &b_streams, "a.pcap", "b.pcap", &MatchPolicy::one_to_many(0.5));
    assert_eq!(one_to_many.matches.len(), 16);

    let one_to_one = correlate(&[a], &b_streams, "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.5));
    assert_eq!(one_to_one.matches.len(), 1);
}

#[test]
fn s5_flow_hash_tie_is_deterministic_across_direction_swap() {
    let ip = Ipv4Addr::new(10, 0, 0, 5);
    let ip2 = Ipv4Addr::new(10, 0, 0, 9);
    let (hash_a, marker_a) = captrace_core::flow_hash(ip, 443, ip2, 443, 6).unwrap();
    let (hash_b, marker_b) = captrace_core::flow_hash(ip2, 443, ip, 443, 6).unwrap();
    assert_eq!(hash_a, hash_b);
    assert_ne!(marker_a, marker_b);
}

#[test]
fn s6_topology_labels_a_closer_to_client() {
    let mut a = conn(
        1,
        (Ipv4Addr::new(10, 0, 0, 1), 1),
        (Ipv4Addr::new(10, 0, 0, 2), 2),
        0x1,
        0x2,
        &[],
        0,
        0,
    );
    a.server_ttl = Some(64 - 4);
    let mut b = conn(
        2,
        (Ipv4Addr::new(10, 0, 0, 1), 1),
        (Ipv4Addr::new(10, 0, 0, 2), 2),
        0x1,
        0x2,
        &[],
        0,
        0,
    );
    b.server_ttl = Some(64);

    let set = correlate(&[a], &[b], "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.0));
    assert_eq!(set.matches.len(), 1);

    let report = infer_topology(&set);
    assert_eq!(report.pairs[0].label, TopologyLabel::ACloserToClient);
    assert_eq!(report.pairs[0].hops_server_a, 4);
    assert_eq!(report.pairs[0].hops_server_b, 0);

    let b_client_node = report
        .nodes
        .iter()
        .find(|n| n.kind == captrace_datatypes::topology::NodeKind::Client && n.capture_id == 1)
        .expect("B's client node must be present");
    assert_eq!(b_client_node.net_area, vec![0]);
}

#[test]
fn gate_soundness_and_injectivity_hold_across_a_run() {
    let a_streams: Vec<Connection> = (0..5)
        .map(|i| {
            conn(
                i,
                (Ipv4Addr::new(10, 0, 0, 1), 1000 + i as u16),
                (Ipv4Addr::new(10, 0, 0, 2), 2000 + i as u16),
                i,
                i + 1,
                &[i as u16],
                0,
                1000,
            )
        })
        .collect();
    let b_streams: Vec<Connection> = (0..5)
        .map(|i| {
            conn(
                100 + i,
                (Ipv4Addr::new(10, 0, 0, 3), 1000 + i as u16),
                (Ipv4Addr::new(10, 0, 0, 4), 2000 + i as u16),
                i,
                i + 1,
                &[i as u16],
                0,
                1000,
            )
        })
        .collect();

    let set = correlate(&a_streams, &b_streams, "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.5));

    // Property 4: gate soundness.
    for m in &set.matches {
        assert_eq!(m.a.port_pair(), m.b.port_pair());
        assert!(!m.a.ipid_set().is_disjoint(&m.b.ipid_set()));
    }

    // Property 5: one-to-one injectivity.
    let mut seen_a = std::collections::HashSet::new();
    let mut seen_b = std::collections::HashSet::new();
    for m in &set.matches {
        assert!(seen_a.insert(m.a.stream_id));
        assert!(seen_b.insert(m.b.stream_id));
    }

    // Property 7: score bounds.
    for m in &set.matches {
        assert!(m.score.raw <= m.score.available_weight + f64::EPSILON);
        assert!((0.0..=1.0).contains(&m.score.normalized));
    }

    // Property 3: determinism across repeated runs on the same input.
    let set2 = correlate(&a_streams, &b_streams, "a.pcap", "b.pcap", &MatchPolicy::one_to_one(0.5));
    assert_eq!(set.to_json().unwrap(), set2.to_json().unwrap());
}

#[test]
fn idempotence_rerunning_on_matched_output_reproduces_it() {
    // Property 8: feeding a MatchSet's own matched connections back into the
    // matcher reproduces the same matches.
    let a_streams: Vec<Connection> = (0..5)
        .map(|i| {
            conn(
                i,
                (Ipv4Addr::new(10, 0, 0, 1), 1000 + i as u16),
                (Ipv4Addr::new(10, 0, 0, 2), 2000 + i as u16),
                i,
                i + 1,
                &[i as u16],
                0,
                1000,
            )
        })
        .collect();
    let b_streams: Vec<Connection> = (0..5)
        .map(|i| {
            conn(
                100 + i,
                (Ipv4Addr::new(10, 0, 0, 3), 1000 + i as u16),
                (Ipv4Addr::new(10, 0, 0, 4), 2000 + i as u16),
                i,
                i + 1,
                &[i as u16],
                0,
                1000,
            )
        })
        .collect();

    let policy = MatchPolicy::one_to_one(0.5);
    let set = correlate(&a_streams, &b_streams, "a.pcap", "b.pcap", &policy);
    assert!(!set.matches.is_empty());

    let replay_a: Vec<Connection> = set.matches.iter().map(|m| m.a.clone()).collect();
    let replay_b: Vec<Connection> = set.matches.iter().map(|m| m.b.clone()).collect();
    let replayed = correlate(&replay_a, &replay_b, "a.pcap", "b.pcap", &policy);

    assert_eq!(replayed.matches.len(), set.matches.len());
    for (original, again) in set.matches.iter().zip(replayed.matches.iter()) {
        assert_eq!(original.a.stream_id, again.a.stream_id);
        assert_eq!(original.b.stream_id, again.b.stream_id);
        assert_eq!(original.score.normalized, again.score.normalized);
    }
}

#[test]
fn flow_hash_reference_vector() {
    let (hash, _marker) = captrace_core::flow_hash(
        Ipv4Addr::new(8, 67, 2, 125),
        26302,
        Ipv4Addr::new(8, 42, 96, 45),
        35101,
        6,
    )
    .unwrap();
    assert_eq!(hash, -1173584886679544929);
}
