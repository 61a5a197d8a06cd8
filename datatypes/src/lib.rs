#![allow(clippy::needless_doctest_main)]
// #![warn(missing_docs)]
//!
//! Data model for cross-capture connection correlation.
//!
//! This crate holds the types that flow between a capture's stream extractor,
//! the pairwise matcher, the topology and endpoint layers, and whatever
//! external collaborator (CLI, database writer, report renderer) ends up
//! consuming a [`MatchSet`]. Every type here is plain data: it derives or
//! hand-rolls `Serialize`/`Deserialize` and carries no engine logic of its
//! own. The engine lives in `captrace-core`, which depends on this crate
//! rather than the other way around.
//!

pub mod packet;
pub use packet::PacketRecord;

pub mod flow_side;
pub use flow_side::FlowSideMarker;

pub mod connection;
pub use connection::Connection;

pub mod policy;
pub use policy::{BucketKind, MatchMode, MatchPolicy};

pub mod score;
pub use score::{Evidence, MatchScore};

pub mod matchset;
pub use matchset::{ConnectionMatch, MatchSet, MatchSetMetadata};

pub mod topology;
pub use topology::{NetAreaNode, NodeKind, TopologyLabel, TopologyReport};

pub mod endpoint;
pub use endpoint::{Confidence, EndpointRecord, EndpointTable};

/// Stream identifier, unique within a single capture's `StreamTable`.
pub type StreamId = u32;
