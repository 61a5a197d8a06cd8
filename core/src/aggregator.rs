//! Endpoint aggregation (C6, §4.5).
//!
//! Server-side detection here is deliberately independent of the stream
//! extractor's own client/server call (§4.1 step 1): that decision only has
//! visibility into a single stream, while this module sees every connection
//! in the matched set and can use capture-wide cardinality to confirm or
//! second-guess it.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use captrace_datatypes::connection::Connection;
use captrace_datatypes::endpoint::{Confidence, EndpointRecord, EndpointTable};
use captrace_datatypes::matchset::MatchSet;

#[derive(Default)]
struct GroupStats {
    count: usize,
    syn_observed: bool,
    sample_client_port: u16,
}

/// Collapses every connection referenced by `match_set` (both sides of
/// every match) into a table of canonical `(client_ip, server_ip,
/// server_port)` rows with a supporting-connection count and a confidence
/// in the server-side call (§4.5).
pub fn aggregate_endpoints(match_set: &MatchSet) -> EndpointTable {
    let connections: Vec<&Connection> = match_set.matches.iter().flat_map(|m| [&m.a, &m.b]).collect();

    // Cardinality: how many distinct clients a (server_ip, server_port) serves.
    let mut clients_by_server: HashMap<(Ipv4Addr, u16), HashSet<Ipv4Addr>> = HashMap::new();
    // Port reuse: how many distinct server IPs answer on a given port.
    let mut server_ips_by_port: HashMap<u16, HashSet<Ipv4Addr>> = HashMap::new();
    // Port stability: how many distinct peer (client) ports hit a (server_ip, server_port).
    let mut client_ports_by_server: HashMap<(Ipv4Addr, u16), HashSet<u16>> = HashMap::new();
    // Disambiguation: how many distinct ports an IP has used while acting as a client.
    let mut ports_used_as_client: HashMap<Ipv4Addr, HashSet<u16>> = HashMap::new();

    for c in &connections {
        clients_by_server.entry((c.server.ip, c.server.port)).or_default().insert(c.client.ip);
        server_ips_by_port.entry(c.server.port).or_default().insert(c.server.ip);
        client_ports_by_server
            .entry((c.server.ip, c.server.port))
            .or_default()
            .insert(c.client.port);
        ports_used_as_client.entry(c.client.ip).or_default().insert(c.client.port);
    }

    let mut groups: HashMap<(Ipv4Addr, Ipv4Addr, u16), GroupStats> = HashMap::new();
    for c in &connections {
        let stats = groups.entry((c.client.ip, c.server.ip, c.server.port)).or_default();
        stats.count += 1;
        stats.sample_client_port = c.client.port;
        if c.client_isn.is_some() {
            stats.syn_observed = true;
        }
    }

    let mut records = Vec::with_capacity(groups.len());
    for ((client_ip, server_ip, server_port), stats) in groups {
        let peer = ports_used_as_client.get(&server_ip).map_or(0, HashSet::len);
        let cardinality = clients_by_server.get(&(server_ip, server_port)).map_or(0, HashSet::len);
        let port_reuse = server_ips_by_port.get(&server_port).map_or(0, HashSet::len);
        let port_stability = client_ports_by_server
            .get(&(server_ip, server_port))
            .map_or(0, HashSet::len);

        let cardinality_signal = cardinality >= 5 && peer < 2;
        let port_reuse_signal = port_reuse >= 2 && peer < 2;
        let port_stability_signal = port_stability >= 2;

        let confidence = if stats.syn_observed {
            Confidence::High
        } else if server_port < 1024 {
            Confidence::Medium
        } else if cardinality_signal && port_reuse_signal {
            // Signals agree: upgraded to HIGH (§4.5, "Signals are combined").
            Confidence::High
        } else if cardinality_signal {
            Confidence::High
        } else if port_reuse_signal {
            Confidence::Medium
        } else if port_stability_signal {
            Confidence::Medium
        } else {
            Confidence::VeryLow
        };

        records.push(EndpointRecord {
            client_ip,
            server_ip,
            server_port,
            count: stats.count,
            confidence,
        });

        if confidence == Confidence::VeryLow {
            // Port-magnitude fallback: no signal disambiguates which side is
            // the server, so both readings are emitted (§4.5 step 6).
            records.push(EndpointRecord {
                client_ip: server_ip,
                server_ip: client_ip,
                server_port: stats.sample_client_port,
                count: stats.count,
                confidence: Confidence::VeryLow,
            });
        }
    }

    EndpointTable { records }
}
