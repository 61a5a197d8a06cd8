//! Per-capture stream tracking (C2).
//!
//! Most of this module's functionality is exercised through
//! [`extractor::extract_connections`]; `conn_id` and `stream_state` are
//! exposed at `pub(crate)`/`pub` visibility only as far as the rest of the
//! core needs them.

pub mod conn_id;
pub mod extractor;
mod stream_state;

pub use conn_id::UnorderedId;
pub use extractor::{extract_both, extract_connections, extract_connections_with, StreamTable};
