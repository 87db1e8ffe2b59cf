use crate::pool::{run_pool, PoolOptions};
use address_space::{AddressSpace, Exclusions};
use anyhow::Result;
use ftp_probe::{ConnectError, ProbeOptions, ProbeOutcome};
use ftpscan_core::{ConfigError, ScanMode, ScannerConfig};
use reverse_dns::ReverseResolver;
use results_sqlite::{now_rfc3339, DnsRecord, HostInsert, RunMeta, RunTotals, ServiceRecord, Sink};
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Banner stored for a host that connected but never finished its exchange.
pub const TIMEOUT_BANNER: &str = "timeout";

/// What one run did, returned once the pool has drained.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub run_id: String,
    pub mode: ScanMode,
    pub dispatched: u64,
    pub reachable: u64,
    pub anonymous: u64,
    pub tls: u64,
    pub timeouts: u64,
    pub unexpected_failures: u64,
    pub write_failures: u64,
    pub names: u64,
    pub elapsed: Duration,
}

impl SweepReport {
    fn totals(&self) -> RunTotals {
        let n = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        RunTotals {
            dispatched: n(self.dispatched),
            reachable: n(self.reachable),
            error_count: n(self.unexpected_failures + self.write_failures),
        }
    }
}

#[derive(Default)]
struct Counters {
    reachable: AtomicU64,
    anonymous: AtomicU64,
    tls: AtomicU64,
    timeouts: AtomicU64,
    unexpected: AtomicU64,
    write_failures: AtomicU64,
    names: AtomicU64,
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

/// Everything a worker needs, shared by all of them.
struct Worker {
    mode: ScanMode,
    sink: Arc<Sink>,
    probe: ProbeOptions,
    record_unreachable: bool,
    resolver: Option<ReverseResolver>,
    counters: Counters,
}

impl Worker {
    fn new(cfg: &ScannerConfig, sink: Arc<Sink>) -> Self {
        Worker {
            mode: cfg.mode,
            sink,
            probe: ProbeOptions {
                port: cfg.port,
                dial_timeout: cfg.dial_timeout,
                read_timeout: cfg.read_timeout,
                capture_transcript: cfg.capture_transcript,
            },
            record_unreachable: cfg.record_unreachable,
            resolver: (cfg.mode == ScanMode::ReverseDns).then(ReverseResolver::from_system),
            counters: Counters::default(),
        }
    }

    fn note_connect_failure(&self, ip: Ipv4Addr, e: &ConnectError) {
        if e.is_expected() {
            debug!(%ip, error = %e.source, "unreachable");
        } else {
            bump(&self.counters.unexpected);
            warn!(%ip, error = %e.source, "unexpected connect failure");
        }
    }

    /// Run a sink call on the blocking pool so a contended lock or a slow
    /// SQLite write never stalls a runtime thread.
    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Sink) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || f(&sink)).await?
    }

    async fn store_host(&self, ip: Ipv4Addr) -> bool {
        match self.write(move |s| s.record_host(ip)).await {
            Ok(HostInsert::New) => true,
            Ok(HostInsert::AlreadyKnown) => {
                debug!(%ip, "host already known");
                true
            }
            Err(e) => {
                bump(&self.counters.write_failures);
                warn!(%ip, error = %e, "host write failed");
                false
            }
        }
    }

    async fn store_service(&self, rec: ServiceRecord) {
        let ip = rec.related_ip;
        if let Err(e) = self.write(move |s| s.record_service(&rec)).await {
            bump(&self.counters.write_failures);
            warn!(%ip, error = %e, "service write failed");
        }
    }

    async fn store_dns(&self, rec: DnsRecord) {
        let ip = rec.related_ip;
        if let Err(e) = self.write(move |s| s.record_dns(&rec)).await {
            bump(&self.counters.write_failures);
            warn!(%ip, error = %e, "dns write failed");
        }
    }

    fn tally(&self, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Unreachable(_) => {}
            ProbeOutcome::TimedOut => bump(&self.counters.timeouts),
            ProbeOutcome::Completed(caps) => {
                if caps.allows_anonymous {
                    bump(&self.counters.anonymous);
                }
                if caps.supports_tls {
                    bump(&self.counters.tls);
                }
            }
        }
    }

    /// Discover and full modes: one address pulled from the sweep.
    async fn sweep_one(&self, ip: Ipv4Addr) {
        let addr = SocketAddr::from((ip, self.probe.port));
        let stream = match ftp_probe::connect(addr, self.probe.dial_timeout).await {
            Ok(s) => s,
            Err(e) => {
                self.connect_failed(ip, e).await;
                return;
            }
        };
        bump(&self.counters.reachable);
        if self.mode == ScanMode::Discover {
            drop(stream);
            self.store_host(ip).await;
            return;
        }
        let outcome = ftp_probe::run_session(stream, &self.probe).await;
        self.tally(&outcome);
        if self.store_host(ip).await {
            self.store_service(service_record(ip, &outcome)).await;
        }
    }

    async fn connect_failed(&self, ip: Ipv4Addr, e: ConnectError) {
        self.note_connect_failure(ip, &e);
        if self.record_unreachable && self.store_host(ip).await && self.mode == ScanMode::Full {
            self.store_service(service_record(ip, &ProbeOutcome::Unreachable(e))).await;
        }
    }

    /// Fill mode: a known host with no service record.
    async fn fill_one(&self, ip: Ipv4Addr) {
        let outcome = ftp_probe::probe(ip, &self.probe).await;
        match &outcome {
            ProbeOutcome::Unreachable(e) => self.note_connect_failure(ip, e),
            _ => bump(&self.counters.reachable),
        }
        self.tally(&outcome);
        self.store_service(service_record(ip, &outcome)).await;
    }

    /// Reverse-dns mode: a known host with no dns record.
    async fn resolve_one(&self, ip: Ipv4Addr) {
        let names = match &self.resolver {
            Some(r) => r.lookup_names(ip).await,
            None => Vec::new(),
        };
        if names.is_empty() {
            // an empty domain marks the host as looked up
            self.store_dns(DnsRecord { related_ip: ip, domain: String::new() }).await;
            return;
        }
        for domain in names {
            bump(&self.counters.names);
            self.store_dns(DnsRecord { related_ip: ip, domain }).await;
        }
    }
}

/// Service row for one probe outcome.
pub fn service_record(ip: Ipv4Addr, outcome: &ProbeOutcome) -> ServiceRecord {
    let (available, supports_tls, allows_anonymous, raw_banner) = match outcome {
        ProbeOutcome::Unreachable(e) => (false, false, false, e.source.to_string()),
        ProbeOutcome::TimedOut => (false, false, false, TIMEOUT_BANNER.to_string()),
        ProbeOutcome::Completed(caps) => {
            (true, caps.supports_tls, caps.allows_anonymous, caps.transcript.clone())
        }
    };
    ServiceRecord {
        related_ip: ip,
        available,
        supports_tls,
        allows_anonymous,
        raw_banner,
        recorded_at: now_rfc3339(),
    }
}

/// Runs one scan of the configured mode against a results store.
pub struct Scanner {
    config: ScannerConfig,
    sink: Arc<Sink>,
}

impl Scanner {
    pub fn new(config: ScannerConfig, sink: Arc<Sink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Scanner { config, sink })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<Sink> {
        &self.sink
    }

    /// Addresses a sweep dispatches, in order, with exclusions removed.
    ///
    /// Logs progress each time the last two octets change.
    pub fn sweep_targets(&self) -> Result<impl Iterator<Item = Ipv4Addr> + Send + 'static> {
        let start = self.config.start_address;
        let space = match self.config.end_address {
            Some(end) => AddressSpace::bounded(start, end)?,
            None => AddressSpace::from_start(start),
        };
        let mut last = None;
        let space = space.inspect(move |ip| {
            let o = ip.octets();
            if last != Some((o[2], o[3])) {
                last = Some((o[2], o[3]));
                info!("sweeping x.x.{}.{}", o[2], o[3]);
            }
        });
        Ok(self.exclusions().filter(space))
    }

    fn exclusions(&self) -> Exclusions {
        Exclusions::from(self.config.exclusions.as_slice())
    }

    fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            concurrency: self.config.concurrency,
            queue_capacity: self.config.queue_capacity,
            qps: self.config.qps,
        }
    }

    pub async fn run(&self) -> Result<SweepReport> {
        let cfg = &self.config;
        let meta = RunMeta::new(cfg.mode.as_str(), ftpscan_core::version(), serde_json::to_string(cfg)?);
        let run_id = self.sink.with_db(|db| db.begin_run(&meta))?;
        info!(%run_id, mode = cfg.mode.as_str(), concurrency = cfg.concurrency, "run started");

        let worker = Arc::new(Worker::new(cfg, self.sink.clone()));

        let started = Instant::now();
        let opts = self.pool_options();
        let dispatched = match cfg.mode {
            ScanMode::Discover | ScanMode::Full => {
                let w = worker.clone();
                run_pool(self.sweep_targets()?, opts, move |ip| {
                    let w = w.clone();
                    async move { w.sweep_one(ip).await }
                })
                .await?
            }
            ScanMode::Fill => {
                let pending = self.sink.with_db(|db| db.hosts_missing_details())?;
                info!(pending = pending.len(), "hosts awaiting a probe");
                let w = worker.clone();
                run_pool(self.exclusions().filter(pending), opts, move |ip| {
                    let w = w.clone();
                    async move { w.fill_one(ip).await }
                })
                .await?
            }
            ScanMode::ReverseDns => {
                let pending = self.sink.with_db(|db| db.hosts_missing_dns())?;
                info!(pending = pending.len(), "hosts awaiting a name lookup");
                let w = worker.clone();
                run_pool(pending, opts, move |ip| {
                    let w = w.clone();
                    async move { w.resolve_one(ip).await }
                })
                .await?
            }
        };

        let c = &worker.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        let report = SweepReport {
            run_id: run_id.to_string(),
            mode: cfg.mode,
            dispatched,
            reachable: load(&c.reachable),
            anonymous: load(&c.anonymous),
            tls: load(&c.tls),
            timeouts: load(&c.timeouts),
            unexpected_failures: load(&c.unexpected),
            write_failures: load(&c.write_failures),
            names: load(&c.names),
            elapsed: started.elapsed(),
        };
        let finished_at = now_rfc3339();
        self.sink.with_db(|db| db.finish_run(&run_id, &finished_at, &report.totals()))?;
        Ok(report)
    }
}
