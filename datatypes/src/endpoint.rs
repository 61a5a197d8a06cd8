//! Endpoint aggregation output (C6, §4.5).

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use strum_macros::{Display, EnumString};

/// Confidence in a server-side detection decision. Round-trips through the
/// JSON/DB boundary as the exact tokens used by external consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize)]
pub enum Confidence {
    #[strum(serialize = "HIGH")]
    #[serde(rename = "HIGH")]
    High,
    #[strum(serialize = "MEDIUM")]
    #[serde(rename = "MEDIUM")]
    Medium,
    #[strum(serialize = "LOW")]
    #[serde(rename = "LOW")]
    Low,
    #[strum(serialize = "VERY_LOW")]
    #[serde(rename = "VERY_LOW")]
    VeryLow,
}

/// One row of the endpoint table: a canonical `(client_ip, server_ip,
/// server_port)` tuple with the number of supporting connections and the
/// confidence of the server-side call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub client_ip: Ipv4Addr,
    pub server_ip: Ipv4Addr,
    pub server_port: u16,
    pub count: usize,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointTable {
    pub records: Vec<EndpointRecord>,
}
