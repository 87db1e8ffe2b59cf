//! IPv4 sweep order and exclusion ranges.
//!
//! The sweep does not walk addresses numerically. The first written octet
//! varies fastest and the last one slowest:
//!
//! ```text
//! 0.0.0.0, 1.0.0.0, ..., 255.0.0.0, 0.1.0.0, 1.1.0.0, ...
//! ```
//!
//! so consecutive probes land in different /8 blocks instead of hammering one
//! operator's network.

pub use ftpscan_core::sweep_order::{address_at, sweep_index, SWEEP_LEN};
use ftpscan_core::ConfigError;
use ipnet::Ipv4Net;
use std::iter::FusedIterator;
use std::net::Ipv4Addr;

/// Lazy, finite walk over the address space from a start point to an inclusive end point.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    next: u64,
    end: u64,
}

impl AddressSpace {
    /// Sweep from `start` through 255.255.255.255.
    pub fn from_start(start: Ipv4Addr) -> Self {
        AddressSpace { next: u64::from(sweep_index(start)), end: u64::from(u32::MAX) }
    }

    /// Sweep from `start` through `end`, both inclusive, in sweep order.
    pub fn bounded(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, ConfigError> {
        let (s, e) = (sweep_index(start), sweep_index(end));
        if e < s {
            return Err(ConfigError::EmptySweep { start, end });
        }
        Ok(AddressSpace { next: u64::from(s), end: u64::from(e) })
    }

    pub fn full() -> Self {
        Self::from_start(Ipv4Addr::UNSPECIFIED)
    }

    /// Addresses left in this sweep.
    pub fn remaining(&self) -> u64 {
        (self.end + 1).saturating_sub(self.next)
    }
}

impl Iterator for AddressSpace {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next > self.end {
            return None;
        }
        let addr = address_at(self.next as u32);
        self.next += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }

    fn nth(&mut self, n: usize) -> Option<Ipv4Addr> {
        self.next = self.next.saturating_add(n as u64);
        self.next()
    }
}

impl FusedIterator for AddressSpace {}

/// CIDR blocks that must never be dispatched.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    nets: Vec<Ipv4Net>,
}

impl Exclusions {
    pub fn new(nets: Vec<Ipv4Net>) -> Self {
        let mut nets: Vec<Ipv4Net> = nets.into_iter().map(|n| n.trunc()).collect();
        nets.sort_unstable();
        nets.dedup();
        Exclusions { nets }
    }

    pub fn contains(&self, addr: &Ipv4Addr) -> bool {
        self.nets.iter().any(|n| n.contains(addr))
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    pub fn nets(&self) -> &[Ipv4Net] {
        &self.nets
    }

    /// Drop excluded addresses from `addrs`.
    pub fn filter<I>(self, addrs: I) -> impl Iterator<Item = Ipv4Addr>
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        addrs.into_iter().filter(move |a| !self.contains(a))
    }
}

impl From<&[Ipv4Net]> for Exclusions {
    fn from(nets: &[Ipv4Net]) -> Self {
        Exclusions::new(nets.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn first_octet_varies_fastest() {
        let got: Vec<Ipv4Addr> = AddressSpace::full().skip(254).take(4).collect();
        assert_eq!(got, vec![ip("254.0.0.0"), ip("255.0.0.0"), ip("0.1.0.0"), ip("1.1.0.0")]);
        assert_eq!(AddressSpace::full().nth(256 * 256), Some(ip("0.0.1.0")));
        let mut it = AddressSpace::full();
        assert_eq!(it.nth(0x00FF_FFFF), Some(ip("255.255.255.0")));
        assert_eq!(it.next(), Some(ip("0.0.0.1")));
    }

    #[test]
    fn index_round_trips_at_the_edges() {
        for a in ["0.0.0.0", "255.255.255.255", "1.2.3.4", "9.255.0.128"] {
            assert_eq!(address_at(sweep_index(ip(a))), ip(a));
        }
        assert_eq!(sweep_index(ip("1.0.0.0")), 1);
        assert_eq!(sweep_index(ip("0.0.0.1")), 1 << 24);
    }

    #[test]
    fn full_sweep_covers_the_whole_space() {
        let sweep = AddressSpace::full();
        assert_eq!(sweep.remaining(), SWEEP_LEN);
        let mut tail = AddressSpace::from_start(ip("253.255.255.255"));
        assert_eq!(tail.remaining(), 3);
        assert_eq!(tail.next(), Some(ip("253.255.255.255")));
        assert_eq!(tail.next(), Some(ip("254.255.255.255")));
        assert_eq!(tail.next(), Some(ip("255.255.255.255")));
        assert_eq!(tail.next(), None);
        assert_eq!(tail.next(), None);
    }

    #[test]
    fn each_address_visited_once() {
        let window: Vec<Ipv4Addr> = AddressSpace::from_start(ip("17.4.0.9")).take(1 << 18).collect();
        let unique: HashSet<_> = window.iter().collect();
        assert_eq!(unique.len(), window.len());
        assert_eq!(window[0], ip("17.4.0.9"));
    }

    #[test]
    fn resume_starts_at_the_given_address() {
        let mut it = AddressSpace::from_start(ip("250.3.7.2"));
        assert_eq!(it.next(), Some(ip("250.3.7.2")));
        let skipped: Vec<_> = it.by_ref().take(6).collect();
        assert_eq!(skipped[5], ip("0.4.7.2"));
        assert_eq!(it.remaining(), SWEEP_LEN - u64::from(sweep_index(ip("1.4.7.2"))));
    }

    #[test]
    fn bounded_sweep_is_inclusive() {
        let got: Vec<_> = AddressSpace::bounded(ip("254.9.0.0"), ip("1.10.0.0")).unwrap().collect();
        assert_eq!(got, vec![ip("254.9.0.0"), ip("255.9.0.0"), ip("0.10.0.0"), ip("1.10.0.0")]);
        assert_eq!(AddressSpace::bounded(ip("5.5.5.5"), ip("5.5.5.5")).unwrap().count(), 1);
        assert!(matches!(
            AddressSpace::bounded(ip("0.0.0.1"), ip("255.0.0.0")),
            Err(ConfigError::EmptySweep { .. })
        ));
    }

    #[test]
    fn private_ranges_are_filtered() {
        let ex = Exclusions::new(ftpscan_core::default_exclusions());
        assert!(ex.contains(&ip("10.200.1.1")));
        assert!(ex.contains(&ip("172.31.255.255")));
        assert!(!ex.contains(&ip("172.32.0.0")));
        assert!(ex.contains(&ip("192.168.0.1")));
        assert!(!ex.contains(&ip("8.8.8.8")));

        let sweep = AddressSpace::bounded(ip("0.168.0.0"), ip("255.168.0.0")).unwrap();
        let kept: Vec<_> = ex.filter(sweep).collect();
        assert_eq!(kept.len(), 254);
        assert!(!kept.contains(&ip("10.168.0.0")));
        assert!(!kept.contains(&ip("192.168.0.0")));
        assert!(kept.contains(&ip("172.168.0.0")));
    }

    #[test]
    fn exclusions_normalise_host_bits() {
        let ex = Exclusions::new(vec!["100.64.3.1/10".parse().unwrap(), "100.64.0.0/10".parse().unwrap()]);
        assert_eq!(ex.nets().len(), 1);
        assert!(ex.contains(&ip("100.127.0.1")));
        assert!(Exclusions::default().is_empty());
    }
}
