use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("queue capacity must be greater than zero")]
    ZeroQueueCapacity,
    #[error("concurrency {0} out of range (1..={})", crate::config::MAX_CONCURRENCY)]
    Concurrency(usize),
    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("qps {0} out of range (1..={})", crate::config::MAX_QPS)]
    Qps(u32),
    #[error("end address {end} comes before start address {start} in sweep order")]
    EmptySweep { start: Ipv4Addr, end: Ipv4Addr },
    #[error("invalid exclusion range {0:?}: {1}")]
    Exclusion(String, ipnet::AddrParseError),
}
