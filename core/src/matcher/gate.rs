//! Mandatory pre-scoring gates (§4.3.1).

use captrace_datatypes::{Connection, Evidence};

/// Checks the port-pair and IPID gates, plus time-overlap when required.
/// Gates are checked in the order the spec lists them, so the first
/// failure's token is the one reported.
pub fn check_gates(a: &Connection, b: &Connection, require_time_overlap: bool) -> Result<(), Evidence> {
    if a.port_pair() != b.port_pair() {
        return Err(Evidence::NoThreeTuple);
    }
    if a.ipid_set().is_disjoint(&b.ipid_set()) {
        return Err(Evidence::NoIpid);
    }
    if require_time_overlap && !a.time_overlaps(b) {
        return Err(Evidence::NoTimeOverlap);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use captrace_datatypes::connection::{Endpoint, Protocol};
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    fn conn(client_port: u16, server_port: u16, ipids: &[u16]) -> Connection {
        Connection {
            stream_id: 0,
            client: Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), client_port),
            server: Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), server_port),
            protocol: Protocol::Tcp,
            client_isn: None,
            server_isn: None,
            syn_options: None,
            client_payload_md5: None,
            server_payload_md5: None,
            length_signature: vec![],
            client_ipid_set: ipids.iter().copied().collect(),
            server_ipid_set: BTreeSet::new(),
            client_ttl: None,
            server_ttl: None,
            first_packet_time: 0,
            last_packet_time: 0,
            total_bytes: 0,
            packet_count: 0,
        }
    }

    #[test]
    fn port_pair_mismatch_fails_first() {
        let a = conn(39765, 6096, &[1, 2]);
        let b = conn(39765, 9000, &[1, 2]);
        assert_eq!(check_gates(&a, &b, false), Err(Evidence::NoThreeTuple));
    }

    #[test]
    fn disjoint_ipid_fails() {
        let a = conn(39765, 6096, &[100, 101, 102]);
        let b = conn(39765, 6096, &[200, 201]);
        assert_eq!(check_gates(&a, &b, false), Err(Evidence::NoIpid));
    }

    #[test]
    fn shared_ipid_and_ports_pass() {
        let a = conn(39765, 6096, &[100, 101, 102]);
        let b = conn(6096, 39765, &[102, 200]);
        assert_eq!(check_gates(&a, &b, false), Ok(()));
    }
}
