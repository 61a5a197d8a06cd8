#![allow(clippy::needless_doctest_main)]
// #![warn(missing_docs)]

//! TCP connection correlation across a pair of packet captures.
//!
//! The core is a small pipeline: [`conntrack`] extracts per-capture
//! [`captrace_datatypes::Connection`] fingerprints from a packet stream,
//! [`flowhash`] tags a 5-tuple with a deterministic, direction-independent
//! identity, [`matcher`] scores and assigns connection pairs across two
//! captures into a [`captrace_datatypes::MatchSet`], and [`topology`] /
//! [`aggregator`] derive network-position and endpoint-table views from
//! that result.
//!
//! ```rust,no_run
//! use captrace_core::config::default_config;
//! use captrace_core::conntrack::extract_connections;
//! use captrace_core::matcher::correlate;
//!
//! # struct MySource;
//! # impl captrace_datatypes::packet::PacketSource for MySource {
//! #     type Error = std::io::Error;
//! #     fn next_record(&mut self) -> Result<Option<captrace_datatypes::PacketRecord>, Self::Error> {
//! #         Ok(None)
//! #     }
//! # }
//! let cfg = default_config();
//! let mut source_a = MySource;
//! let mut source_b = MySource;
//! let a = extract_connections(&mut source_a, cfg.extractor.payload_hash_prefix).unwrap();
//! let b = extract_connections(&mut source_b, cfg.extractor.payload_hash_prefix).unwrap();
//! let match_set = correlate(&a, &b, "a.pcap", "b.pcap", &cfg.matcher);
//! println!("{}", match_set.to_json().unwrap());
//! ```

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod conntrack;
pub mod error;
pub mod flowhash;
pub mod matcher;
pub mod persist;
pub mod topology;

pub use cancel::CancellationToken;
pub use error::CoreError;
pub use flowhash::flow_hash;
pub use persist::load_match_set_checked;
