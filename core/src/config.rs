//! Scanner configuration shared by every component of a run.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::sweep_order::sweep_index;
use crate::ConfigError;

pub const DEFAULT_PORT: u16 = 21;
pub const DEFAULT_QUEUE_CAPACITY: usize = 30_000;
pub const MAX_CONCURRENCY: usize = 1_000_000;
/// Highest accepted launch rate per second.
pub const MAX_QPS: u32 = 1_000_000;

/// What a run does with each address it pulls from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// Sweep the address space and record hosts that accept a connection.
    Discover,
    /// Sweep the address space, probe every reachable host and record its capabilities.
    Full,
    /// Probe only known hosts that have no service record yet.
    Fill,
    /// Resolve names for known hosts that have no dns record yet.
    ReverseDns,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Discover => "discover",
            ScanMode::Full => "full",
            ScanMode::Fill => "fill",
            ScanMode::ReverseDns => "reverse-dns",
        }
    }
}

/// Private ranges that are never dispatched.
pub fn default_exclusions() -> Vec<Ipv4Net> {
    [
        (Ipv4Addr::new(10, 0, 0, 0), 8),
        (Ipv4Addr::new(172, 16, 0, 0), 12),
        (Ipv4Addr::new(192, 168, 0, 0), 16),
    ]
    .into_iter()
    .filter_map(|(addr, len)| Ipv4Net::new(addr, len).ok())
    .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannerConfig {
    pub mode: ScanMode,
    pub port: u16,
    pub dial_timeout: Duration,
    /// Deadline for the whole command/reply exchange once connected.
    pub read_timeout: Duration,
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub start_address: Ipv4Addr,
    /// Inclusive stop point in sweep order; `None` sweeps through 255.255.255.255.
    pub end_address: Option<Ipv4Addr>,
    pub exclusions: Vec<Ipv4Net>,
    pub capture_transcript: bool,
    pub record_unreachable: bool,
    pub qps: Option<u32>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            mode: ScanMode::Full,
            port: DEFAULT_PORT,
            dial_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            concurrency: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            start_address: Ipv4Addr::UNSPECIFIED,
            end_address: None,
            exclusions: default_exclusions(),
            capture_transcript: true,
            record_unreachable: false,
            qps: None,
        }
    }
}

impl ScannerConfig {
    pub fn new(mode: ScanMode) -> Self {
        ScannerConfig { mode, ..Default::default() }
    }

    /// Parse and append operator supplied CIDR blocks to the exclusion list.
    pub fn exclude<S: AsRef<str>>(&mut self, ranges: &[S]) -> Result<(), ConfigError> {
        for r in ranges {
            let r = r.as_ref().trim();
            let net: Ipv4Net = r
                .parse()
                .map_err(|e| ConfigError::Exclusion(r.to_string(), e))?;
            let net = net.trunc();
            if !self.exclusions.contains(&net) {
                self.exclusions.push(net);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Concurrency(self.concurrency));
        }
        if self.dial_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("dial"));
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("read"));
        }
        if let Some(qps) = self.qps {
            if qps == 0 || qps > MAX_QPS {
                return Err(ConfigError::Qps(qps));
            }
        }
        if let Some(end) = self.end_address {
            if sweep_index(end) < sweep_index(self.start_address) {
                return Err(ConfigError::EmptySweep { start: self.start_address, end });
            }
        }
        Ok(())
    }
}
