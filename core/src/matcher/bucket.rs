//! Candidate pre-partitioning (§4.3.3).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use itertools::Itertools;
use log::{debug, warn};

use captrace_datatypes::connection::{Connection, PortPair};
use captrace_datatypes::BucketKind;

/// A bucket key, resolved from a [`BucketKind`] and a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Server(Ipv4Addr),
    Port(PortPair),
}

pub(crate) fn key_for(kind: BucketKind, conn: &Connection) -> Key {
    match kind {
        BucketKind::None => Key::None,
        BucketKind::Server => Key::Server(conn.server.ip),
        BucketKind::Port => Key::Port(conn.port_pair()),
    }
}

/// Groups `b`'s connections by bucket key, honoring the "all one family"
/// fallback to `bucket=none` (§4.3.3): if every connection in both captures
/// shares the same key, bucketing buys nothing, so everything is folded into
/// a single bucket instead of a degenerate one-bucket-of-everything map.
pub fn effective_kind(requested: BucketKind, a: &[Connection], b: &[Connection]) -> BucketKind {
    if requested == BucketKind::None {
        return BucketKind::None;
    }
    let keys = a.iter().map(|c| key_for(requested, c)).chain(b.iter().map(|c| key_for(requested, c)));
    if keys.all_equal() {
        warn!("every stream shares one {requested:?} family; falling back to bucket=none");
        BucketKind::None
    } else {
        requested
    }
}

/// Builds a `key -> indices into b` map for bucketed candidate generation.
pub fn index_by_key<'a>(kind: BucketKind, conns: &'a [Connection]) -> HashMap<Key, Vec<usize>> {
    let mut map: HashMap<Key, Vec<usize>> = HashMap::new();
    for (i, c) in conns.iter().enumerate() {
        map.entry(key_for(kind, c)).or_default().push(i);
    }
    debug!("{} buckets under {kind:?}", map.len());
    map
}
