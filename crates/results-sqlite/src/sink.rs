//! Shared write path for concurrent workers.

use crate::{now_rfc3339, Db, DnsRecord, HostInsert, ServiceRecord};
use anyhow::{anyhow, Result};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

/// One database connection behind one lock. Every write from every worker
/// goes through here, so a row is always written by exactly one statement.
pub struct Sink {
    db: Mutex<Db>,
}

impl Sink {
    pub fn new(db: Db) -> Self {
        Sink { db: Mutex::new(db) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Db>> {
        self.db.lock().map_err(|_| anyhow!("results database lock poisoned"))
    }

    pub fn record_host(&self, ip: Ipv4Addr) -> Result<HostInsert> {
        let at = now_rfc3339();
        self.lock()?.insert_host(ip, &at)
    }

    pub fn record_service(&self, rec: &ServiceRecord) -> Result<()> {
        self.lock()?.upsert_service(rec)
    }

    pub fn record_dns(&self, rec: &DnsRecord) -> Result<()> {
        self.lock()?.add_dns(rec)
    }

    /// Run a read or bookkeeping call with the lock held.
    pub fn with_db<T>(&self, f: impl FnOnce(&Db) -> Result<T>) -> Result<T> {
        let db = self.lock()?;
        f(&db)
    }

    pub fn into_inner(self) -> Result<Db> {
        self.db.into_inner().map_err(|_| anyhow!("results database lock poisoned"))
    }
}
