use anyhow::{Context, Result};
use clap::Args;
use ftpscan_core::{ScanMode, ScannerConfig};
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_FILL_CONCURRENCY: usize = 25_000;
pub const DEFAULT_DNS_CONCURRENCY: usize = 500;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScanSection {
    pub port: Option<u16>,
    pub end: Option<Ipv4Addr>,
    pub dial_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub qps: Option<u32>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub capture_transcript: Option<bool>,
    pub record_unreachable: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct FillSection {
    pub concurrency: Option<usize>,
    pub port: Option<u16>,
    pub dial_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub qps: Option<u32>,
    pub capture_transcript: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DnsSection {
    pub concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub db: Option<String>,
    pub scan: Option<ScanSection>,
    pub fill: Option<FillSection>,
    pub dns: Option<DnsSection>,
}

/// Read `path`, or `./ftpscan.yaml` when no path is given and the file exists.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("ftpscan.yaml");
            if p.exists() {
                p.to_path_buf()
            } else {
                return Ok(None);
            }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(cfg))
}

/// Sweep arguments.
#[derive(Debug, Args, Clone)]
pub struct ScanArgs {
    /// Number of concurrent probes (unparsable values fall back to 1)
    pub concurrency: String,
    /// Address to start (or resume) the sweep from
    pub start_ip: String,
    /// Record hosts that accept a connection without probing them
    #[arg(long, default_value_t = false)]
    pub discover_only: bool,
    /// Inclusive address to stop at, in sweep order
    #[arg(long)]
    pub end: Option<Ipv4Addr>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub dial_timeout_ms: Option<u64>,
    /// Deadline for the whole command/reply exchange
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,
    /// Addresses buffered ahead of the workers
    #[arg(long)]
    pub queue_capacity: Option<usize>,
    /// Cap on probe launches per second
    #[arg(long)]
    pub qps: Option<u32>,
    /// Extra CIDR block to skip (repeatable)
    #[arg(long, value_name = "CIDR")]
    pub exclude: Vec<String>,
    /// Store flags only, not the received lines
    #[arg(long, default_value_t = false)]
    pub no_transcript: bool,
    /// Also record hosts that refuse or time out on connect
    #[arg(long, default_value_t = false)]
    pub record_unreachable: bool,
}

#[derive(Debug, Args, Clone, Default)]
pub struct FillArgs {
    #[arg(long)]
    pub concurrency: Option<usize>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub dial_timeout_ms: Option<u64>,
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,
    #[arg(long)]
    pub qps: Option<u32>,
    #[arg(long, default_value_t = false)]
    pub no_transcript: bool,
}

#[derive(Debug, Args, Clone, Default)]
pub struct DnsArgs {
    #[arg(long)]
    pub concurrency: Option<usize>,
}

pub fn parse_concurrency(raw: &str) -> usize {
    match raw.trim().parse() {
        Ok(n) => n,
        Err(_) => {
            warn!(value = raw, "concurrency is not a number, using 1");
            1
        }
    }
}

fn millis(v: Option<u64>) -> Option<Duration> {
    v.map(Duration::from_millis)
}

/// Flags win over the file, the file wins over defaults.
pub fn scan_config(args: &ScanArgs, file: Option<&ScanSection>) -> Result<ScannerConfig> {
    let file = file.cloned().unwrap_or_default();
    let mode = if args.discover_only { ScanMode::Discover } else { ScanMode::Full };
    let mut cfg = ScannerConfig::new(mode);
    cfg.concurrency = parse_concurrency(&args.concurrency);
    cfg.start_address = args
        .start_ip
        .trim()
        .parse()
        .with_context(|| format!("invalid start address {:?}", args.start_ip))?;
    cfg.end_address = args.end.or(file.end);
    if let Some(p) = args.port.or(file.port) {
        cfg.port = p;
    }
    if let Some(d) = millis(args.dial_timeout_ms.or(file.dial_timeout_ms)) {
        cfg.dial_timeout = d;
    }
    if let Some(d) = millis(args.read_timeout_ms.or(file.read_timeout_ms)) {
        cfg.read_timeout = d;
    }
    if let Some(q) = args.queue_capacity.or(file.queue_capacity) {
        cfg.queue_capacity = q;
    }
    cfg.qps = args.qps.or(file.qps);
    cfg.exclude(&file.exclude)?;
    cfg.exclude(&args.exclude)?;
    cfg.capture_transcript = !args.no_transcript && file.capture_transcript.unwrap_or(true);
    cfg.record_unreachable = args.record_unreachable || file.record_unreachable.unwrap_or(false);
    cfg.validate()?;
    Ok(cfg)
}

pub fn fill_config(args: &FillArgs, file: Option<&FillSection>) -> Result<ScannerConfig> {
    let file = file.cloned().unwrap_or_default();
    let mut cfg = ScannerConfig::new(ScanMode::Fill);
    cfg.concurrency = args.concurrency.or(file.concurrency).unwrap_or(DEFAULT_FILL_CONCURRENCY);
    if let Some(p) = args.port.or(file.port) {
        cfg.port = p;
    }
    if let Some(d) = millis(args.dial_timeout_ms.or(file.dial_timeout_ms)) {
        cfg.dial_timeout = d;
    }
    if let Some(d) = millis(args.read_timeout_ms.or(file.read_timeout_ms)) {
        cfg.read_timeout = d;
    }
    cfg.qps = args.qps.or(file.qps);
    cfg.capture_transcript = !args.no_transcript && file.capture_transcript.unwrap_or(true);
    cfg.validate()?;
    Ok(cfg)
}

pub fn dns_config(args: &DnsArgs, file: Option<&DnsSection>) -> Result<ScannerConfig> {
    let mut cfg = ScannerConfig::new(ScanMode::ReverseDns);
    cfg.concurrency = args
        .concurrency
        .or(file.and_then(|d| d.concurrency))
        .unwrap_or(DEFAULT_DNS_CONCURRENCY);
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_args(concurrency: &str, start: &str) -> ScanArgs {
        ScanArgs {
            concurrency: concurrency.into(),
            start_ip: start.into(),
            discover_only: false,
            end: None,
            port: None,
            dial_timeout_ms: None,
            read_timeout_ms: None,
            queue_capacity: None,
            qps: None,
            exclude: Vec::new(),
            no_transcript: false,
            record_unreachable: false,
        }
    }

    const YAML: &str = "
db: results.sqlite
scan:
  port: 2121
  read_timeout_ms: 3000
  queue_capacity: 500
  exclude: [\"100.64.0.0/10\"]
  capture_transcript: false
fill:
  concurrency: 64
  dial_timeout_ms: 250
dns:
  concurrency: 9
";

    #[test]
    fn file_values_fill_in_unset_flags() {
        let file: Config = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(file.db.as_deref(), Some("results.sqlite"));
        let mut args = scan_args("2000", "1.2.3.4");
        args.read_timeout_ms = Some(750);
        args.exclude = vec!["198.18.0.0/15".into()];
        let cfg = scan_config(&args, file.scan.as_ref()).unwrap();

        assert_eq!(cfg.mode, ScanMode::Full);
        assert_eq!(cfg.concurrency, 2000);
        assert_eq!(cfg.port, 2121);
        assert_eq!(cfg.read_timeout, Duration::from_millis(750));
        assert_eq!(cfg.dial_timeout, Duration::from_secs(1));
        assert_eq!(cfg.queue_capacity, 500);
        assert!(!cfg.capture_transcript);
        // defaults plus one from the file plus one from the flag
        assert_eq!(cfg.exclusions.len(), 5);

        let fill = fill_config(&FillArgs::default(), file.fill.as_ref()).unwrap();
        assert_eq!(fill.concurrency, 64);
        assert_eq!(fill.dial_timeout, Duration::from_millis(250));
        let dns = dns_config(&DnsArgs { concurrency: Some(3) }, file.dns.as_ref()).unwrap();
        assert_eq!(dns.concurrency, 3);
    }

    #[test]
    fn defaults_without_a_file() {
        let cfg = scan_config(&scan_args("10", "0.0.0.0"), None).unwrap();
        assert_eq!(cfg.port, 21);
        assert_eq!(cfg.queue_capacity, 30_000);
        assert!(cfg.capture_transcript);
        assert_eq!(fill_config(&FillArgs::default(), None).unwrap().concurrency, 25_000);
        assert_eq!(dns_config(&DnsArgs::default(), None).unwrap().concurrency, 500);
    }

    #[test]
    fn bad_concurrency_falls_back_to_one() {
        assert_eq!(parse_concurrency("lots"), 1);
        assert_eq!(parse_concurrency(" 42 "), 42);
        let mut args = scan_args("x", "8.8.8.8");
        args.discover_only = true;
        let cfg = scan_config(&args, None).unwrap();
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.mode, ScanMode::Discover);
    }

    #[test]
    fn bad_start_or_range_aborts() {
        assert!(scan_config(&scan_args("5", "not-an-ip"), None).is_err());
        assert!(scan_config(&scan_args("5", "1.2.3"), None).is_err());
        let mut args = scan_args("5", "0.0.0.1");
        args.end = Some(Ipv4Addr::new(255, 0, 0, 0));
        assert!(scan_config(&args, None).is_err());
        args.end = Some(Ipv4Addr::new(0, 0, 0, 2));
        assert!(scan_config(&args, None).is_ok());
        args.exclude = vec!["bogus".into()];
        assert!(scan_config(&args, None).is_err());
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftpscan.yaml");
        assert!(load_config(Some(path.as_path())).is_err());
        std::fs::write(&path, YAML).unwrap();
        let cfg = load_config(Some(path.as_path())).unwrap().unwrap();
        assert_eq!(cfg.dns.unwrap().concurrency, Some(9));
    }
}
