//! Topology inference (C5, §4.4).
//!
//! A small `petgraph::DiGraph` models the client/server/device nodes so that
//! `net_area` tagging and device-placeholder insertion fall out of ordinary
//! graph construction rather than ad-hoc bookkeeping, the way the teacher
//! reaches for `petgraph` to model its filter predicate trees.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};

use captrace_datatypes::matchset::MatchSet;
use captrace_datatypes::topology::{NetAreaNode, NodeKind, PairTopology, TopologyLabel, TopologyReport};

/// Canonical initial TTLs a stack is assumed to send with (§4.4).
const CANONICAL_INITIAL_TTLS: [u8; 3] = [64, 128, 255];

/// `canonical_initial - observed_ttl`, where `canonical_initial` is the
/// smallest canonical value `>= observed_ttl`. `None` (TTL never observed)
/// contributes zero hops: there is no evidence of any hop having occurred.
fn hops_from_ttl(ttl: Option<u8>) -> u8 {
    let Some(ttl) = ttl else {
        return 0;
    };
    let canonical_initial = CANONICAL_INITIAL_TTLS
        .iter()
        .copied()
        .find(|&c| c >= ttl)
        .unwrap_or(255);
    canonical_initial.saturating_sub(ttl)
}

fn node_for(
    graph: &mut DiGraph<NodeKind, ()>,
    index: &mut HashMap<(NodeKind, u8), NodeIndex>,
    kind: NodeKind,
    capture_id: u8,
) -> NodeIndex {
    *index
        .entry((kind, capture_id))
        .or_insert_with(|| graph.add_node(kind))
}

/// Infers, for every matched pair in `match_set`, which capture point sat
/// closer to the client, and assembles the `net_area` node graph (§4.4, §6).
pub fn infer_topology(match_set: &MatchSet) -> TopologyReport {
    let mut graph: DiGraph<NodeKind, ()> = DiGraph::new();
    let mut index: HashMap<(NodeKind, u8), NodeIndex> = HashMap::new();
    let mut net_area: HashMap<NodeIndex, BTreeSet<u8>> = HashMap::new();
    let mut pairs = Vec::with_capacity(match_set.matches.len());

    for m in &match_set.matches {
        let hops_server_a = hops_from_ttl(m.a.server_ttl);
        let hops_server_b = hops_from_ttl(m.b.server_ttl);
        let hops_client_a = hops_from_ttl(m.a.client_ttl);
        let hops_client_b = hops_from_ttl(m.b.client_ttl);

        let server_delta = hops_server_a as i16 - hops_server_b as i16;
        let client_delta = hops_client_a as i16 - hops_client_b as i16;

        let label = match server_delta.cmp(&0) {
            std::cmp::Ordering::Greater => TopologyLabel::ACloserToClient,
            std::cmp::Ordering::Less => TopologyLabel::BCloserToClient,
            std::cmp::Ordering::Equal => TopologyLabel::SamePosition,
        };

        // Client IPs are NAT'ed far more often than server IPs, so a
        // disagreeing client-side sign is logged as a possible NAT artifact
        // but never overrides the server-side decision (§4.4).
        let nat_conflict = server_delta != 0 && client_delta != 0 && server_delta.signum() != client_delta.signum();
        if nat_conflict {
            log::warn!(
                "NAT conflict on streams {}/{}: server_delta={server_delta} client_delta={client_delta}",
                m.a.stream_id,
                m.b.stream_id
            );
        }

        match label {
            TopologyLabel::ACloserToClient => {
                tag_far_side(&mut graph, &mut index, &mut net_area, 0, 1, hops_server_a, hops_client_b);
            }
            TopologyLabel::BCloserToClient => {
                tag_far_side(&mut graph, &mut index, &mut net_area, 1, 0, hops_server_b, hops_client_a);
            }
            TopologyLabel::SamePosition => {}
        }

        pairs.push(PairTopology {
            stream_id_a: m.a.stream_id,
            stream_id_b: m.b.stream_id,
            hops_server_a,
            hops_server_b,
            hops_client_a,
            hops_client_b,
            label,
            nat_conflict,
        });
    }

    let nodes = index
        .into_iter()
        .map(|((kind, capture_id), idx)| NetAreaNode {
            kind,
            capture_id,
            net_area: net_area.remove(&idx).map(|s| s.into_iter().collect()).unwrap_or_default(),
        })
        .collect();

    TopologyReport { pairs, nodes }
}

/// Tags the near capture's server node and the far capture's client node
/// with each other's capture id, and inserts network-device placeholders
/// when the relevant side's hop count is at least 1 (§4.4): a server-side
/// device between the near capture and the server when `near_hops_to_server
/// >= 1`, and a client-side device between the far capture and the client
/// when `far_hops_to_client >= 1`.
fn tag_far_side(
    graph: &mut DiGraph<NodeKind, ()>,
    index: &mut HashMap<(NodeKind, u8), NodeIndex>,
    net_area: &mut HashMap<NodeIndex, BTreeSet<u8>>,
    near_capture: u8,
    far_capture: u8,
    near_hops_to_server: u8,
    far_hops_to_client: u8,
) {
    let near_server = node_for(graph, index, NodeKind::Server, near_capture);
    net_area.entry(near_server).or_default().insert(far_capture);

    let far_client = node_for(graph, index, NodeKind::Client, far_capture);
    net_area.entry(far_client).or_default().insert(near_capture);

    if near_hops_to_server >= 1 {
        let device = node_for(graph, index, NodeKind::ServerSideDevice, near_capture);
        net_area.entry(device).or_default().insert(far_capture);
        graph.add_edge(device, near_server, ());
    }

    if far_hops_to_client >= 1 {
        let device = node_for(graph, index, NodeKind::ClientSideDevice, far_capture);
        net_area.entry(device).or_default().insert(near_capture);
        graph.add_edge(device, far_client, ());
    }
}
