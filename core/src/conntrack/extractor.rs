//! Per-capture stream extraction (C2, §4.1).
//!
//! Demultiplexes a [`PacketSource`]'s packet records into a [`StreamTable`],
//! keyed by [`UnorderedId`] so that a reused 4-tuple stays one stream for the
//! life of the capture (§4.1, "Connection boundaries"). Mirrors the teacher's
//! `ConnTracker` (`conntrack/mod.rs`): a `hashlink::LinkedHashMap` accessed
//! through `raw_entry_mut` to avoid a second hash lookup on the occupied path.

use std::collections::{HashMap, HashSet};

use hashlink::linked_hash_map::{LinkedHashMap, RawEntryMut};
use log::{debug, warn};

use captrace_datatypes::connection::Endpoint;
use captrace_datatypes::packet::PacketSource;
use captrace_datatypes::{Connection, PacketRecord, StreamId};

use super::conn_id::UnorderedId;
use super::stream_state::StreamState;
use crate::error::CoreError;

/// Accumulates [`StreamState`] for every 4-tuple seen in a single capture.
pub struct StreamTable {
    streams: LinkedHashMap<UnorderedId, StreamState>,
    late_packet_count: u64,
    payload_hash_prefix: usize,
    length_signature_cap: usize,
}

impl StreamTable {
    pub fn new(payload_hash_prefix: usize, length_signature_cap: usize) -> Self {
        StreamTable {
            streams: LinkedHashMap::new(),
            late_packet_count: 0,
            payload_hash_prefix,
            length_signature_cap,
        }
    }

    /// Number of distinct streams currently tracked.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Count of packets whose sequence number regressed outside wraparound
    /// tolerance relative to the previous segment in their direction.
    /// Informational only; see [`super::stream_state::StreamState::update`].
    pub fn late_packet_count(&self) -> u64 {
        self.late_packet_count
    }

    /// Folds one packet into its stream, creating the stream on first sight.
    pub fn ingest(&mut self, pkt: &PacketRecord) {
        let ep_a = Endpoint::new(pkt.src_ip, pkt.src_port);
        let ep_b = Endpoint::new(pkt.dst_ip, pkt.dst_port);
        let id = UnorderedId::new(ep_a, ep_b);

        let is_late = match self.streams.raw_entry_mut().from_key(&id) {
            RawEntryMut::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let from_a = ep_a == state.ep_a;
                state.update(pkt, from_a, self.payload_hash_prefix, self.length_signature_cap)
            }
            RawEntryMut::Vacant(vacant) => {
                let mut state = StreamState::new(pkt);
                let is_late = state.update(pkt, true, self.payload_hash_prefix, self.length_signature_cap);
                vacant.insert(id, state);
                is_late
            }
        };

        if is_late {
            self.late_packet_count += 1;
            warn!("late-sequence packet on stream {id}");
        }
    }

    /// Resolves client/server assignment for every stream and drains the
    /// table into finalized [`Connection`] fingerprints, in first-seen order.
    ///
    /// The no-SYN heuristic (§4.1 step 1) needs, for each port, how many
    /// distinct peer IPs it has paired with anywhere in the capture; that
    /// statistic is only available once every stream has been observed, so
    /// it is computed here rather than incrementally during [`Self::ingest`].
    pub fn finish(self) -> Vec<Connection> {
        let mut peers: HashMap<u16, HashSet<std::net::Ipv4Addr>> = HashMap::new();
        for id in self.streams.keys() {
            let (a, b) = id.endpoints();
            peers.entry(a.port).or_default().insert(b.ip);
            peers.entry(b.port).or_default().insert(a.ip);
        }
        let port_peer_counts: HashMap<u16, usize> =
            peers.into_iter().map(|(port, ips)| (port, ips.len())).collect();

        let mut connections = Vec::with_capacity(self.streams.len());
        let mut next_stream_id: StreamId = 0;
        for (_, state) in self.streams {
            let stream_id = next_stream_id;
            next_stream_id += 1;
            let conn = state.finalize(stream_id, &port_peer_counts);
            debug!(
                "stream {} finalized: {}:{} <-> {}:{}, {} packets, payloadC={}",
                conn.stream_id,
                conn.client.ip,
                conn.client.port,
                conn.server.ip,
                conn.server.port,
                conn.packet_count,
                conn.client_payload_md5.map(hex::encode).as_deref().unwrap_or("-"),
            );
            connections.push(conn);
        }
        connections
    }
}

/// Drives a [`PacketSource`] to completion, returning every [`Connection`]
/// extracted from the capture. Fatal only on decoder error (§4.1 "Failures");
/// malformed packets are expected to already have been filtered out by the
/// source itself.
pub fn extract_connections<S: PacketSource>(
    source: &mut S,
    payload_hash_prefix: usize,
) -> Result<Vec<Connection>, CoreError> {
    extract_connections_with(
        source,
        payload_hash_prefix,
        captrace_datatypes::connection::LENGTH_SIGNATURE_CAP,
    )
}

/// Same as [`extract_connections`], with an explicit length-signature cap
/// (`M`, §9 open question (b)) instead of the wire-contract default.
pub fn extract_connections_with<S: PacketSource>(
    source: &mut S,
    payload_hash_prefix: usize,
    length_signature_cap: usize,
) -> Result<Vec<Connection>, CoreError> {
    let mut table = StreamTable::new(payload_hash_prefix, length_signature_cap);
    while let Some(pkt) = source
        .next_record()
        .map_err(|e| CoreError::Decoder(e.to_string()))?
    {
        table.ingest(&pkt);
    }
    if table.late_packet_count() > 0 {
        warn!(
            "{} late-sequence packets observed across {} streams",
            table.late_packet_count(),
            table.len()
        );
    }
    Ok(table.finish())
}

/// Extracts both captures' connections independently and in parallel
/// (§5: "Stream extraction of the two captures runs independently"), joining
/// both scoped threads before returning. If `cancel` is already signalled,
/// neither extraction runs and the call returns an empty pair — partial
/// results are discarded, not persisted (§5 "Cancellation").
pub fn extract_both<S1, S2>(
    source_a: &mut S1,
    source_b: &mut S2,
    payload_hash_prefix: usize,
    length_signature_cap: usize,
    cancel: &crate::cancel::CancellationToken,
) -> Result<(Vec<Connection>, Vec<Connection>), CoreError>
where
    S1: PacketSource + Send,
    S2: PacketSource + Send,
{
    if cancel.is_cancelled() {
        return Ok((Vec::new(), Vec::new()));
    }

    std::thread::scope(|scope| {
        let handle_a = scope.spawn(|| extract_connections_with(source_a, payload_hash_prefix, length_signature_cap));
        let handle_b = scope.spawn(|| extract_connections_with(source_b, payload_hash_prefix, length_signature_cap));
        let a = handle_a.join().expect("capture A extraction thread panicked")?;
        let b = handle_b.join().expect("capture B extraction thread panicked")?;
        Ok((a, b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use captrace_datatypes::packet::tcp_flags;
    use std::net::Ipv4Addr;

    struct VecSource {
        records: std::vec::IntoIter<PacketRecord>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("vec source exhausted")]
    struct Never;

    impl PacketSource for VecSource {
        type Error = Never;

        fn next_record(&mut self) -> Result<Option<PacketRecord>, Self::Error> {
            Ok(self.records.next())
        }
    }

    fn pkt(src: (Ipv4Addr, u16), dst: (Ipv4Addr, u16), flags: u8, seq: u32, len: u32, t: u64) -> PacketRecord {
        PacketRecord {
            timestamp_us: t,
            src_ip: src.0,
            dst_ip: dst.0,
            src_port: src.1,
            dst_port: dst.1,
            ip_id: 7,
            ttl: 64,
            tcp_flags: flags,
            seq_no: seq,
            ack_no: 0,
            tcp_options: vec![],
            payload_len: len,
            payload_md5: None,
        }
    }

    #[test]
    fn reused_four_tuple_stays_one_stream() {
        let client = (Ipv4Addr::new(10, 0, 0, 1), 40000);
        let server = (Ipv4Addr::new(10, 0, 0, 2), 443);
        let records = vec![
            pkt(client, server, tcp_flags::SYN, 0, 0, 0),
            pkt(server, client, tcp_flags::SYN | tcp_flags::ACK, 0, 0, 1),
            pkt(client, server, tcp_flags::FIN, 1, 0, 2),
            // 4-tuple reused post-FIN: merges into the same stream (§4.1 edge case).
            pkt(client, server, tcp_flags::ACK, 2, 5, 3),
        ];
        let mut source = VecSource {
            records: records.into_iter(),
        };
        let conns = extract_connections(&mut source, 512).unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].client, Endpoint::new(client.0, client.1));
        assert_eq!(conns[0].packet_count, 4);
    }

    #[test]
    fn distinct_four_tuples_become_distinct_streams() {
        let client1 = (Ipv4Addr::new(10, 0, 0, 1), 40000);
        let client2 = (Ipv4Addr::new(10, 0, 0, 3), 40001);
        let server = (Ipv4Addr::new(10, 0, 0, 2), 443);
        let records = vec![
            pkt(client1, server, tcp_flags::SYN, 0, 0, 0),
            pkt(client2, server, tcp_flags::SYN, 0, 0, 1),
        ];
        let mut source = VecSource {
            records: records.into_iter(),
        };
        let conns = extract_connections(&mut source, 512).unwrap();
        assert_eq!(conns.len(), 2);
    }

    #[test]
    fn extract_both_runs_both_captures_and_joins() {
        let client = (Ipv4Addr::new(10, 0, 0, 1), 40000);
        let server = (Ipv4Addr::new(10, 0, 0, 2), 443);
        let mut source_a = VecSource {
            records: vec![pkt(client, server, tcp_flags::SYN, 0, 0, 0)].into_iter(),
        };
        let mut source_b = VecSource {
            records: vec![pkt(client, server, tcp_flags::SYN, 0, 0, 0), pkt(server, client, tcp_flags::SYN | tcp_flags::ACK, 0, 0, 1)].into_iter(),
        };
        let cancel = crate::cancel::CancellationToken::new();
        let (a, b) = extract_both(&mut source_a, &mut source_b, 512, 64, &cancel).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].packet_count, 2);
    }

    #[test]
    fn extract_both_short_circuits_when_already_cancelled() {
        let mut source_a = VecSource { records: Vec::new().into_iter() };
        let mut source_b = VecSource { records: Vec::new().into_iter() };
        let cancel = crate::cancel::CancellationToken::new();
        cancel.cancel();
        let (a, b) = extract_both(&mut source_a, &mut source_b, 512, 64, &cancel).unwrap();
        assert!(a.is_empty() && b.is_empty());
    }
}
