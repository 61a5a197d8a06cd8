//! Error kinds surfaced by the core (§7).
//!
//! Gate failures, empty captures, and "no matches" are *data conditions*,
//! carried in [`captrace_datatypes::MatchScore`]/[`captrace_datatypes::MatchSet`],
//! not errors. `CoreError` only covers the paths §7 calls out as fatal or
//! invalid-argument.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("packet decoder failed: {0}")]
    Decoder(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to load match set: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("match set schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("failed to load config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
