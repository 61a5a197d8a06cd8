//! Deterministic, direction-independent flow identity (C3, §4.2).
//!
//! The byte layout hashed here and the SipHash-1-3/zero-key choice are part
//! of the wire contract with an external consumer (§4.2, §6) and must not be
//! adjusted without bumping that contract.

use std::net::Ipv4Addr;

use captrace_datatypes::FlowSideMarker;
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

use crate::error::CoreError;

/// All-zero 16-byte SipHash key, fixed at compile time (§9, "Global state").
const SIP_KEY: [u8; 16] = [0u8; 16];

/// Reinterprets `port`'s on-wire (big-endian/network order) byte
/// representation as a little-endian integer, per §4.2's canonicalization
/// rule.
#[inline]
fn port_le(port: u16) -> u16 {
    port.swap_bytes()
}

/// Computes the direction-independent flow hash of a TCP/IPv4 5-tuple.
///
/// `flow_hash(A, B) == flow_hash(B, A)`; `FlowSideMarker` records which
/// argument order canonicalization chose, so callers can still recover
/// direction. Only IPv4 is accepted; there is no IPv6 variant (§1 non-goals).
pub fn flow_hash(
    ip1: Ipv4Addr,
    port1: u16,
    ip2: Ipv4Addr,
    port2: u16,
    proto: u8,
) -> Result<(i64, FlowSideMarker), CoreError> {
    let (port_hi, port_lo, ip_hi, ip_lo, marker) = canonicalize(ip1, port1, ip2, port2);

    let mut buf = Vec::with_capacity(2 + 2 + 8 + 8 + 4 + 8 + 8 + 4 + 8 + 1);
    buf.extend_from_slice(&port_hi.to_be_bytes());
    buf.extend_from_slice(&port_lo.to_be_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&4u64.to_le_bytes());
    buf.extend_from_slice(&ip_hi.octets());
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&4u64.to_le_bytes());
    buf.extend_from_slice(&ip_lo.octets());
    buf.extend_from_slice(&1u64.to_le_bytes());
    buf.push(proto);

    let mut hasher = SipHasher13::new_with_key(&SIP_KEY);
    hasher.write(&buf);
    let digest = hasher.finish();
    Ok((digest as i64, marker))
}

/// Returns `(port_hi, port_lo, ip_hi, ip_lo, marker)` in canonical order.
fn canonicalize(
    ip1: Ipv4Addr,
    port1: u16,
    ip2: Ipv4Addr,
    port2: u16,
) -> (u16, u16, Ipv4Addr, Ipv4Addr, FlowSideMarker) {
    let (p1, p2) = (port_le(port1), port_le(port2));
    if p1 > p2 {
        (port1, port2, ip1, ip2, FlowSideMarker::LhsGeRhs)
    } else if p1 < p2 {
        (port2, port1, ip2, ip1, FlowSideMarker::RhsGtLhs)
    } else {
        let (n1, n2) = (u32::from(ip1), u32::from(ip2));
        if n1 >= n2 {
            (port1, port2, ip1, ip2, FlowSideMarker::LhsGeRhs)
        } else {
            (port2, port1, ip2, ip1, FlowSideMarker::RhsGtLhs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bidirectional() {
        let ip1 = Ipv4Addr::new(10, 0, 0, 1);
        let ip2 = Ipv4Addr::new(10, 0, 0, 2);
        let (h1, m1) = flow_hash(ip1, 1234, ip2, 80, 6).unwrap();
        let (h2, m2) = flow_hash(ip2, 80, ip1, 1234, 6).unwrap();
        assert_eq!(h1, h2);
        assert_ne!(m1, m2);
    }

    #[test]
    fn reference_vector() {
        let ip1 = Ipv4Addr::new(8, 67, 2, 125);
        let ip2 = Ipv4Addr::new(8, 42, 96, 45);
        let (hash, _marker) = flow_hash(ip1, 26302, ip2, 35101, 6).unwrap();
        assert_eq!(hash, -1173584886679544929);
    }

    #[test]
    fn ip_tiebreak_is_deterministic_across_direction_swap() {
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        let ip2 = Ipv4Addr::new(10, 0, 0, 9);
        let (_, marker_a) = flow_hash(ip, 443, ip2, 443, 6).unwrap();
        let (_, marker_b) = flow_hash(ip2, 443, ip, 443, 6).unwrap();
        assert_ne!(marker_a, marker_b);
    }
}
