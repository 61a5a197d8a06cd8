//! Packet-level data handed to the core by the packet decoder.
//!
//! `PacketRecord` is the contract boundary described in the packet decoder
//! section of the design: the decoder (an external collaborator) is assumed
//! to already have dissected Ethernet/IPv4/TCP and handed us the fields we
//! need. We never parse raw bytes here.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// TCP flag bits, as observed on the wire.
pub mod tcp_flags {
    pub const CWR: u8 = 0b1000_0000;
    pub const ECE: u8 = 0b0100_0000;
    pub const URG: u8 = 0b0010_0000;
    pub const ACK: u8 = 0b0001_0000;
    pub const PSH: u8 = 0b0000_1000;
    pub const RST: u8 = 0b0000_0100;
    pub const SYN: u8 = 0b0000_0010;
    pub const FIN: u8 = 0b0000_0001;
}

/// A single already-dissected IPv4/TCP packet, as yielded by a packet
/// decoder implementing [`PacketSource`](crate::packet::PacketSource).
///
/// Fields mirror what a dissector can cheaply give us per packet: no
/// payload is retained beyond its length and an optional MD5 digest taken
/// by the decoder over the first `K` octets of TCP options/data the decoder
/// chooses to hash (the core never re-hashes; see `Connection::client_payload_md5`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Capture timestamp in microseconds since an arbitrary but
    /// monotonically increasing epoch for this capture.
    pub timestamp_us: u64,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// IPv4 identification field.
    pub ip_id: u16,
    pub ttl: u8,
    pub tcp_flags: u8,
    pub seq_no: u32,
    pub ack_no: u32,
    /// Canonicalized TCP options: kind+len+value triples concatenated in
    /// wire order, verbatim. Empty if the decoder did not retain them.
    pub tcp_options: Vec<u8>,
    /// Length of the TCP payload (bytes after the TCP header), excluding
    /// any retained option bytes.
    pub payload_len: u32,
    /// MD5 digest of the first `K` bytes of TCP payload, if the decoder
    /// is not running in `header_only` mode and the segment carried a
    /// payload.
    pub payload_md5: Option<[u8; 16]>,
}

impl PacketRecord {
    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.tcp_flags & flag != 0
    }

    #[inline]
    pub fn is_syn_only(&self) -> bool {
        self.tcp_flags & (tcp_flags::SYN | tcp_flags::ACK) == tcp_flags::SYN
    }
}

/// Pull-iterator contract for a packet decoder (C1).
///
/// Implementations are expected to yield IPv4 TCP packets in capture order;
/// malformed packets are skipped by the implementation with an internal
/// counter rather than surfaced as records. Decoder failures are fatal and
/// propagate as `Err`.
pub trait PacketSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the next packet record, or `None` at end of capture.
    fn next_record(&mut self) -> Result<Option<PacketRecord>, Self::Error>;

    /// When `true`, implementations should skip payload hashing.
    fn header_only(&self) -> bool {
        false
    }
}
