//! Mutable per-stream accumulator (§4.1).
//!
//! `StreamState` accumulates evidence as packets arrive, keyed by which
//! physical endpoint sent each packet (`ep_a`/`ep_b`, fixed at the first
//! packet seen for the stream). Client/server assignment is deferred until
//! [`StreamState::finalize`], since the peer-cardinality heuristic in step 1
//! needs information aggregated across every stream in the capture.

use std::collections::BTreeSet;
use std::collections::HashMap;

use captrace_datatypes::connection::{Connection, Endpoint, Protocol};
use captrace_datatypes::packet::tcp_flags;
use captrace_datatypes::{PacketRecord, StreamId};

/// RFC1323 sequence-number ordering, tolerant of 32-bit wraparound.
#[inline]
pub(crate) fn wrapping_lt(lhs: u32, rhs: u32) -> bool {
    lhs.wrapping_sub(rhs) > (1 << 31)
}

#[derive(Debug, Default)]
struct DirEvidence {
    isn: Option<u32>,
    syn_options: Option<Vec<u8>>,
    /// Per-packet MD5 digests seen so far, in sequence order, concatenated.
    /// The decoder only ever hands us a digest of each packet's own payload
    /// (never raw bytes, §3), so the connection-level payload evidence is
    /// built by re-hashing the concatenation of those digests rather than
    /// the application data itself. `hashed_bytes` tracks how much of the
    /// directional byte stream that material represents, so accumulation
    /// stops once it reaches `payload_hash_prefix` (§4.1 step 3).
    digest_material: Vec<u8>,
    hashed_bytes: usize,
    last_seq: Option<u32>,
    ipid_set: BTreeSet<u16>,
    ttl_counts: HashMap<u8, u32>,
    nb_pkts: u64,
    nb_bytes: u64,
}

impl DirEvidence {
    fn mode_ttl(&self) -> Option<u8> {
        self.ttl_counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(ttl, _)| *ttl)
    }

    /// Folds a packet-level digest into the directional accumulator, capped
    /// at `payload_hash_prefix` bytes of equivalent application data.
    fn accumulate_payload(&mut self, digest: Option<[u8; 16]>, payload_len: u32, payload_hash_prefix: usize) {
        if self.hashed_bytes >= payload_hash_prefix {
            return;
        }
        if let Some(digest) = digest {
            self.digest_material.extend_from_slice(&digest);
            self.hashed_bytes += payload_len as usize;
        }
    }

    /// Final connection-level payload digest, or `None` if no packet in this
    /// direction carried payload evidence.
    fn payload_digest(&self) -> Option<[u8; 16]> {
        if self.digest_material.is_empty() {
            None
        } else {
            Some(md5::compute(&self.digest_material).0)
        }
    }
}

#[derive(Debug)]
pub(crate) struct StreamState {
    pub(crate) ep_a: Endpoint,
    pub(crate) ep_b: Endpoint,
    /// The side that sent a pure SYN (no ACK) first, if any was observed.
    pub(crate) syn_sender: Option<Endpoint>,
    a: DirEvidence,
    b: DirEvidence,
    /// Raw signed lengths relative to `ep_a` (positive = from `ep_a`);
    /// flipped to client-relative signs at finalize.
    length_signature: Vec<i32>,
    first_packet_time: u64,
    last_packet_time: u64,
}

impl StreamState {
    pub(crate) fn new(first: &PacketRecord) -> Self {
        let ep_a = Endpoint::new(first.src_ip, first.src_port);
        let ep_b = Endpoint::new(first.dst_ip, first.dst_port);
        StreamState {
            ep_a,
            ep_b,
            syn_sender: None,
            a: DirEvidence::default(),
            b: DirEvidence::default(),
            length_signature: Vec::new(),
            first_packet_time: first.timestamp_us,
            last_packet_time: first.timestamp_us,
        }
    }

    fn dir_mut(&mut self, from_a: bool) -> &mut DirEvidence {
        if from_a {
            &mut self.a
        } else {
            &mut self.b
        }
    }

    /// Folds one packet into the accumulator. `from_a` is `true` when the
    /// packet's source matches `ep_a`. Returns `true` if the packet's
    /// sequence number regressed outside wraparound tolerance relative to
    /// the previous segment in that direction — purely informational, the
    /// packet still contributes to every evidence channel below (§4.1 makes
    /// no exception for it).
    pub(crate) fn update(
        &mut self,
        pkt: &PacketRecord,
        from_a: bool,
        payload_hash_prefix: usize,
        length_signature_cap: usize,
    ) -> bool {
        self.last_packet_time = self.last_packet_time.max(pkt.timestamp_us);

        let is_pure_syn = pkt.is_syn_only();
        if is_pure_syn && self.syn_sender.is_none() {
            let sender = if from_a { self.ep_a } else { self.ep_b };
            self.syn_sender = Some(sender);
        }

        let ev = self.dir_mut(from_a);
        ev.nb_pkts += 1;
        ev.nb_bytes += pkt.payload_len as u64;
        ev.ipid_set.insert(pkt.ip_id);
        *ev.ttl_counts.entry(pkt.ttl).or_insert(0) += 1;

        if pkt.has_flag(tcp_flags::SYN) && ev.isn.is_none() {
            ev.isn = Some(pkt.seq_no);
            if is_pure_syn && ev.syn_options.is_none() {
                ev.syn_options = Some(pkt.tcp_options.clone());
            }
        }

        let is_late = pkt.payload_len > 0
            && ev
                .last_seq
                .is_some_and(|last| pkt.seq_no != last && wrapping_lt(pkt.seq_no, last));

        if pkt.payload_len > 0 {
            if self.length_signature.len() < length_signature_cap {
                let signed = if from_a {
                    pkt.payload_len as i32
                } else {
                    -(pkt.payload_len as i32)
                };
                self.length_signature.push(signed);
            }

            let is_retransmission = ev.last_seq == Some(pkt.seq_no);
            if !is_retransmission {
                ev.last_seq = Some(pkt.seq_no);
                ev.accumulate_payload(pkt.payload_md5, pkt.payload_len, payload_hash_prefix);
            }
        }

        is_late
    }

    /// Decides client/server assignment and produces the public
    /// [`Connection`] fingerprint. `port_peer_counts` maps a port number to
    /// the number of distinct peer IPs it has been observed pairing with
    /// anywhere in this capture (§4.1 step 1, no-SYN heuristic).
    pub(crate) fn finalize(self, stream_id: StreamId, port_peer_counts: &HashMap<u16, usize>) -> Connection {
        let (client_ep, server_ep) = self.decide_client_server(port_peer_counts);
        let a_is_client = client_ep == self.ep_a;

        let (client_ev, server_ev) = if a_is_client {
            (&self.a, &self.b)
        } else {
            (&self.b, &self.a)
        };

        let length_signature = if a_is_client {
            self.length_signature.clone()
        } else {
            self.length_signature.iter().map(|v| -v).collect()
        };

        Connection {
            stream_id,
            client: client_ep,
            server: server_ep,
            protocol: Protocol::Tcp,
            client_isn: client_ev.isn,
            server_isn: server_ev.isn,
            syn_options: client_ev.syn_options.clone(),
            client_payload_md5: client_ev.payload_digest(),
            server_payload_md5: server_ev.payload_digest(),
            length_signature,
            client_ipid_set: client_ev.ipid_set.clone(),
            server_ipid_set: server_ev.ipid_set.clone(),
            client_ttl: client_ev.mode_ttl(),
            server_ttl: server_ev.mode_ttl(),
            first_packet_time: self.first_packet_time,
            last_packet_time: self.last_packet_time,
            total_bytes: client_ev.nb_bytes + server_ev.nb_bytes,
            packet_count: client_ev.nb_pkts + server_ev.nb_pkts,
        }
    }

    fn decide_client_server(&self, port_peer_counts: &HashMap<u16, usize>) -> (Endpoint, Endpoint) {
        if let Some(syn_sender) = self.syn_sender {
            let other = if syn_sender == self.ep_a { self.ep_b } else { self.ep_a };
            return (syn_sender, other);
        }

        let (lower, higher) = if self.ep_a.port <= self.ep_b.port {
            (self.ep_a, self.ep_b)
        } else {
            (self.ep_b, self.ep_a)
        };
        let lower_cardinality = port_peer_counts.get(&lower.port).copied().unwrap_or(0);
        if lower.port < 1024 || lower_cardinality >= 2 {
            (higher, lower)
        } else {
            let a_cardinality = port_peer_counts.get(&self.ep_a.port).copied().unwrap_or(0);
            let b_cardinality = port_peer_counts.get(&self.ep_b.port).copied().unwrap_or(0);
            if a_cardinality >= b_cardinality {
                (self.ep_b, self.ep_a)
            } else {
                (self.ep_a, self.ep_b)
            }
        }
    }
}
