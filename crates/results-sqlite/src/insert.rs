use crate::{Db, DnsRecord, HostInsert, RunMeta, RunTotals, ServiceRecord};
use anyhow::Result;
use rusqlite::{ffi, params};
use std::net::Ipv4Addr;
use uuid::Uuid;

impl Db {
    pub fn begin_run(&self, meta: &RunMeta) -> Result<Uuid> {
        self.conn.execute(
            "INSERT INTO runs(run_id, started_at, mode, tool_version, config_json) VALUES (?,?,?,?,?)",
            params![meta.run_id.to_string(), meta.started_at, meta.mode, meta.tool_version, meta.config_json],
        )?;
        Ok(meta.run_id)
    }

    pub fn finish_run(&self, run_id: &Uuid, finished_at: &str, totals: &RunTotals) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET finished_at=?, dispatched=?, reachable=?, error_count=? WHERE run_id=?",
            params![finished_at, totals.dispatched, totals.reachable, totals.error_count, run_id.to_string()],
        )?;
        Ok(())
    }

    /// Insert a host; a primary key clash means it is already known and is not an error.
    pub fn insert_host(&self, ip: Ipv4Addr, discovered_at: &str) -> Result<HostInsert> {
        let mut stmt = self.conn.prepare_cached("INSERT INTO host(ip, timestamp) VALUES (?1, ?2)")?;
        match stmt.execute(params![ip.to_string(), discovered_at]) {
            Ok(_) => Ok(HostInsert::New),
            Err(e) if is_duplicate_key(&e) => Ok(HostInsert::AlreadyKnown),
            Err(e) => Err(e.into()),
        }
    }

    /// Store the service record for a host, replacing any earlier one.
    pub fn upsert_service(&self, rec: &ServiceRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO details(related_ip, available, anonymous, ftps, stream, recorded_at) VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(related_ip) DO UPDATE SET available=excluded.available, anonymous=excluded.anonymous, ftps=excluded.ftps, stream=excluded.stream, recorded_at=excluded.recorded_at",
        )?;
        stmt.execute(params![
            rec.related_ip.to_string(),
            rec.available,
            rec.allows_anonymous,
            rec.supports_tls,
            rec.raw_banner,
            rec.recorded_at,
        ])?;
        Ok(())
    }

    pub fn add_dns(&self, rec: &DnsRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached("INSERT INTO dns(related_ip, domain) VALUES (?1, ?2)")?;
        stmt.execute(params![rec.related_ip.to_string(), rec.domain])?;
        Ok(())
    }
}

fn is_duplicate_key(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => {
            f.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY || f.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_rfc3339;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn record(addr: &str, available: bool, banner: &str) -> ServiceRecord {
        ServiceRecord {
            related_ip: ip(addr),
            available,
            supports_tls: false,
            allows_anonymous: available,
            raw_banner: banner.to_string(),
            recorded_at: now_rfc3339(),
        }
    }

    #[test]
    fn duplicate_host_is_benign() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.insert_host(ip("8.8.4.4"), "t0").unwrap(), HostInsert::New);
        assert_eq!(db.insert_host(ip("8.8.4.4"), "t1").unwrap(), HostInsert::AlreadyKnown);
        let ts: String = db.conn.query_row("SELECT timestamp FROM host WHERE ip='8.8.4.4'", [], |r| r.get(0)).unwrap();
        assert_eq!(ts, "t0");
    }

    #[test]
    fn service_record_is_replaced_not_duplicated() {
        let db = Db::open_in_memory().unwrap();
        db.insert_host(ip("1.1.1.1"), "t").unwrap();
        db.upsert_service(&record("1.1.1.1", false, "timeout")).unwrap();
        db.upsert_service(&record("1.1.1.1", true, "230 ok\n")).unwrap();
        let services = db.services().unwrap();
        assert_eq!(services.len(), 1);
        assert!(services[0].available);
        assert_eq!(services[0].raw_banner, "230 ok\n");
    }

    #[test]
    fn service_for_unknown_host_violates_foreign_key() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.upsert_service(&record("9.9.9.9", true, "")).is_err());
    }

    #[test]
    fn runs_are_tracked() {
        let db = Db::open_in_memory().unwrap();
        let meta = RunMeta::new("full", "0.1.0", "{}".into());
        let id = db.begin_run(&meta).unwrap();
        let totals = RunTotals { dispatched: 10, reachable: 3, error_count: 1 };
        db.finish_run(&id, "later", &totals).unwrap();
        let runs = db.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, id.to_string());
        assert_eq!(runs[0].finished_at.as_deref(), Some("later"));
        assert_eq!(runs[0].totals, totals);
    }
}
