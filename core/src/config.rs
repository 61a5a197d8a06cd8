//! Configuration options.
//!
//! Applications that embed this crate are free to define their own command
//! line arguments, but the matcher, stream extractor, and topology layer all
//! read from a single `CorrelationConfig` that fixes the wire-contract
//! constants (`K`, `M`) and the default policy. See
//! [`default_config`] for the values used when no config file is supplied.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use captrace_datatypes::policy::MatchPolicy;

use crate::error::CoreError;

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CorrelationConfig, CoreError> {
    let config_str = fs::read_to_string(path)?;
    let config: CorrelationConfig = toml::from_str(&config_str)?;
    Ok(config)
}

/// The default configuration, used when no config file is supplied.
///
/// ```toml
/// [extractor]
///     payload_hash_prefix = 512
///     length_signature_cap = 64
///
/// [matcher]
///     match_mode = "OneToOne"
///     threshold = 0.6
///     bucket = "Port"
///     require_time_overlap = false
/// ```
pub fn default_config() -> CorrelationConfig {
    CorrelationConfig::default()
}

/* --------------------------------------------------------------------------------- */

/// Stream extractor tunables (§4.1, §9 open question (b)).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ExtractorConfig {
    /// `K`: prefix length, in bytes, hashed into the payload MD5 evidence.
    #[serde(default = "default_payload_hash_prefix")]
    pub payload_hash_prefix: usize,
    /// `M`: maximum number of entries retained in a length signature.
    #[serde(default = "default_length_signature_cap")]
    pub length_signature_cap: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            payload_hash_prefix: default_payload_hash_prefix(),
            length_signature_cap: default_length_signature_cap(),
        }
    }
}

fn default_payload_hash_prefix() -> usize {
    captrace_datatypes::connection::PAYLOAD_HASH_PREFIX
}

fn default_length_signature_cap() -> usize {
    captrace_datatypes::connection::LENGTH_SIGNATURE_CAP
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default = "default_policy")]
    pub matcher: MatchPolicy,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        CorrelationConfig {
            extractor: ExtractorConfig::default(),
            matcher: default_policy(),
        }
    }
}

fn default_policy() -> MatchPolicy {
    MatchPolicy::default()
}
