//! PTR lookups for discovered hosts.

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, warn};

pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Async PTR resolver shared by every lookup of a run. Cheap to clone.
#[derive(Clone)]
pub struct ReverseResolver {
    inner: TokioAsyncResolver,
}

impl ReverseResolver {
    /// Use the host's resolver configuration, or the library defaults when it
    /// cannot be read. One attempt per query, bounded by `LOOKUP_TIMEOUT`.
    pub fn from_system() -> Self {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!(error = %e, "system resolver config unavailable, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = LOOKUP_TIMEOUT;
        opts.attempts = 1;
        Self::with_config(config, opts)
    }

    pub fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Self {
        ReverseResolver { inner: TokioAsyncResolver::tokio(config, opts) }
    }

    /// Every name registered for `ip`. Empty when the address has no PTR
    /// record or the lookup fails.
    pub async fn lookup_names(&self, ip: Ipv4Addr) -> Vec<String> {
        match self.inner.reverse_lookup(IpAddr::V4(ip)).await {
            Ok(answer) => collect_names(ip, answer.iter().map(|n| n.to_string())),
            Err(e) => {
                debug!(%ip, error = %e, "no PTR name");
                Vec::new()
            }
        }
    }
}

fn collect_names(ip: Ipv4Addr, raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = raw.into_iter().filter_map(|n| normalize(ip, n)).collect();
    names.sort();
    names.dedup();
    names
}

/// Resolvers may hand back the numeric form when nothing is registered.
fn normalize(ip: Ipv4Addr, name: String) -> Option<String> {
    let name = name.trim().trim_end_matches('.').to_string();
    if name.is_empty() || name.parse::<IpAddr>().is_ok() || name == ip.to_string() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_answers_are_not_names() {
        let ip = Ipv4Addr::new(203, 0, 113, 7);
        assert_eq!(normalize(ip, "203.0.113.7".into()), None);
        assert_eq!(normalize(ip, "".into()), None);
        assert_eq!(normalize(ip, "ftp.example.org.".into()), Some("ftp.example.org".into()));
    }

    #[test]
    fn every_ptr_answer_is_kept() {
        let ip = Ipv4Addr::new(198, 51, 100, 4);
        let raw = ["b.example.net.", "a.example.net.", "a.example.net", "198.51.100.4"];
        let names = collect_names(ip, raw.into_iter().map(String::from));
        assert_eq!(names, vec!["a.example.net".to_string(), "b.example.net".to_string()]);
    }

    #[tokio::test]
    async fn loopback_lookup_does_not_fail() {
        // resolver dependent: either names or nothing, never the address itself
        let resolver = ReverseResolver::from_system();
        let names = resolver.lookup_names(Ipv4Addr::LOCALHOST).await;
        assert!(names.iter().all(|n| n != "127.0.0.1"));
    }
}
