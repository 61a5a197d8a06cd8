//! The per-capture TCP stream fingerprint produced by the stream extractor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::StreamId;

/// Maximum number of signed-length entries retained in a [`Connection::length_signature`].
pub const LENGTH_SIGNATURE_CAP: usize = 64;
/// Maximum number of payload octets hashed into [`Connection::client_payload_md5`]/
/// [`Connection::server_payload_md5`].
pub const PAYLOAD_HASH_PREFIX: usize = 512;

/// An IPv4 endpoint: address plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint { ip, port }
    }
}

/// The unordered pair `{client_port, server_port}` — the only IP-free
/// identity that survives NAT. See `pp()` in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortPair(pub u16, pub u16);

impl PortPair {
    pub fn new(a: u16, b: u16) -> Self {
        if a <= b {
            PortPair(a, b)
        } else {
            PortPair(b, a)
        }
    }
}

/// Fixed protocol tag. Only TCP is modeled; see the design's non-goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
}

/// A TCP stream fingerprint, as extracted from a single capture.
///
/// `Connection` is exclusively owned by the `StreamTable` of the capture it
/// was built from; nothing outside that table ever holds a live reference to
/// it. Cross-capture references are by `stream_id` only (see
/// `ConnectionMatch`), never by pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    // --- identity ---
    pub stream_id: StreamId,
    pub client: Endpoint,
    pub server: Endpoint,
    pub protocol: Protocol,

    // --- SYN evidence ---
    pub client_isn: Option<u32>,
    pub server_isn: Option<u32>,
    pub syn_options: Option<Vec<u8>>,

    // --- payload evidence ---
    pub client_payload_md5: Option<[u8; 16]>,
    pub server_payload_md5: Option<[u8; 16]>,

    // --- shape evidence ---
    /// Ordered signed payload lengths; positive = client→server, negative =
    /// server→client. Truncated to [`LENGTH_SIGNATURE_CAP`] entries.
    pub length_signature: Vec<i32>,

    // --- IPID evidence ---
    pub client_ipid_set: BTreeSet<u16>,
    pub server_ipid_set: BTreeSet<u16>,

    // --- TTL evidence ---
    pub client_ttl: Option<u8>,
    pub server_ttl: Option<u8>,

    // --- timing / volume ---
    pub first_packet_time: u64,
    pub last_packet_time: u64,
    pub total_bytes: u64,
    pub packet_count: u64,
}

impl Connection {
    /// The unordered port-pair gate key (`pp(c)` in the matcher design).
    #[inline]
    pub fn port_pair(&self) -> PortPair {
        PortPair::new(self.client.port, self.server.port)
    }

    /// The union of both directions' observed IPIDs.
    pub fn ipid_set(&self) -> BTreeSet<u16> {
        self.client_ipid_set
            .union(&self.server_ipid_set)
            .copied()
            .collect()
    }

    /// `true` if `self.packet_count` is small enough to make micro-flow
    /// acceptance (§4.3.2) eligible.
    #[inline]
    pub fn is_microflow(&self) -> bool {
        self.packet_count <= 4
    }

    /// `true` if `[self.first, self.last]` overlaps `[other.first, other.last]`.
    #[inline]
    pub fn time_overlaps(&self, other: &Connection) -> bool {
        self.first_packet_time <= other.last_packet_time
            && other.first_packet_time <= self.last_packet_time
    }
}
