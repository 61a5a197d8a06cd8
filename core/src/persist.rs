//! Loading a serialized [`MatchSet`] back against a pair of live captures
//! (§7 "schema mismatch").
//!
//! `MatchSet::from_json` round-trips the wire shape faithfully, but a match
//! set saved from one pair of captures can be handed back against captures
//! that have since changed (re-run with a different `K`/`M`, a truncated
//! pcap, ...). Entries whose stream-ids no longer exist in the live captures
//! are not a fatal condition: they are dropped and logged, and the load
//! succeeds with whatever subset still resolves.

use std::collections::HashSet;

use log::warn;

use captrace_datatypes::connection::Connection;
use captrace_datatypes::matchset::MatchSet;
use captrace_datatypes::StreamId;

use crate::error::CoreError;

/// Parses `json` as a [`MatchSet`] and prunes any match whose `conn1`/`conn2`
/// stream-id is absent from `live_a`/`live_b` respectively, warning once per
/// dropped entry. Fails only if `json` does not parse as a `MatchSet` at all.
pub fn load_match_set_checked(json: &str, live_a: &[Connection], live_b: &[Connection]) -> Result<MatchSet, CoreError> {
    let mut set = MatchSet::from_json(json)?;

    if set.version != captrace_datatypes::matchset::MATCH_SET_VERSION {
        return Err(CoreError::SchemaMismatch(format!(
            "match set version {:?} is not the supported {:?}",
            set.version,
            captrace_datatypes::matchset::MATCH_SET_VERSION
        )));
    }

    let ids_a: HashSet<StreamId> = live_a.iter().map(|c| c.stream_id).collect();
    let ids_b: HashSet<StreamId> = live_b.iter().map(|c| c.stream_id).collect();

    let before = set.matches.len();
    set.matches.retain(|m| {
        let keep = ids_a.contains(&m.a.stream_id) && ids_b.contains(&m.b.stream_id);
        if !keep {
            warn!(
                "dropping stale match set entry: stream {} / {} not present in live captures",
                m.a.stream_id, m.b.stream_id
            );
        }
        keep
    });
    if set.matches.len() != before {
        warn!("{} of {} match set entries dropped on schema check", before - set.matches.len(), before);
    }

    Ok(set)
}
