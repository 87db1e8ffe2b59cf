//! Position of an address within a sweep.
//!
//! The first written octet varies fastest, so the index is the octets read
//! as a little-endian integer.

use std::net::Ipv4Addr;

/// Number of addresses in one complete sweep.
pub const SWEEP_LEN: u64 = 1 << 32;

pub fn sweep_index(addr: Ipv4Addr) -> u32 {
    u32::from_le_bytes(addr.octets())
}

pub fn address_at(index: u32) -> Ipv4Addr {
    Ipv4Addr::from(index.to_le_bytes())
}
