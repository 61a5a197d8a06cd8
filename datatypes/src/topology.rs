//! Topology inference output (C5, §4.4).

use serde::{Deserialize, Serialize};

use crate::StreamId;

/// Per-pair relative position of the two capture points along the path
/// Client ↔ Server, decided from the server-side TTL-hop delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyLabel {
    /// Capture A observed the connection closer to the client.
    ACloserToClient,
    /// Capture B observed the connection closer to the client.
    BCloserToClient,
    /// Equal server-side hop count; position cannot be determined.
    SamePosition,
}

/// Node `type` values from the external DB contract (§6): client/server
/// endpoints plus placeholder network-device nodes inserted when the
/// inferred hop count is at least 1 on the relevant side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum NodeKind {
    Client = 1,
    Server = 2,
    ClientSideDevice = 1001,
    ServerSideDevice = 1002,
}

/// A node tagged with the set of peer capture ids whose traffic continues
/// through it (`net_area` in the DB contract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAreaNode {
    pub kind: NodeKind,
    /// Capture-local id of the owning capture (0 = capture A, 1 = capture B
    /// in this crate's two-capture model; the DB schema's ids are assigned
    /// by the external persistence layer).
    pub capture_id: u8,
    /// Peer capture ids associated with this node.
    pub net_area: Vec<u8>,
}

/// The decided topology for one matched pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairTopology {
    pub stream_id_a: StreamId,
    pub stream_id_b: StreamId,
    pub hops_server_a: u8,
    pub hops_server_b: u8,
    pub hops_client_a: u8,
    pub hops_client_b: u8,
    pub label: TopologyLabel,
    /// `true` when the client-side hop delta disagrees in sign with the
    /// server-side delta, suggesting client-side NAT. Logged, never used to
    /// override the server-side decision (§4.4).
    pub nat_conflict: bool,
}

/// Full topology inference result over a [`crate::MatchSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyReport {
    pub pairs: Vec<PairTopology>,
    pub nodes: Vec<NetAreaNode>,
}
