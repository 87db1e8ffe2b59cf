use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

/// Outcome of inserting a host row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostInsert {
    New,
    /// The address was discovered by an earlier pass.
    AlreadyKnown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub related_ip: Ipv4Addr,
    pub available: bool,
    pub supports_tls: bool,
    pub allows_anonymous: bool,
    pub raw_banner: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub related_ip: Ipv4Addr,
    /// Empty when the address has no PTR name.
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: Uuid,
    pub started_at: String,
    pub mode: String,
    pub tool_version: String,
    pub config_json: String,
}

impl RunMeta {
    pub fn new(mode: &str, tool_version: &str, config_json: String) -> Self {
        RunMeta {
            run_id: Uuid::now_v7(),
            started_at: now_rfc3339(),
            mode: mode.to_string(),
            tool_version: tool_version.to_string(),
            config_json,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub dispatched: i64,
    pub reachable: i64,
    pub error_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub mode: String,
    pub totals: RunTotals,
}

/// A host joined with its service record, if any. Used for exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub ip: String,
    pub discovered_at: Option<String>,
    pub available: Option<bool>,
    pub anonymous: Option<bool>,
    pub ftps: Option<bool>,
    pub stream: Option<String>,
    pub recorded_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub hosts: i64,
    pub services: i64,
    pub available: i64,
    pub anonymous: i64,
    pub ftps: i64,
    pub awaiting_probe: i64,
    pub named_hosts: i64,
}
