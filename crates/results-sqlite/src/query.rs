use crate::{Db, ResultRow, RunRecord, RunTotals, ServiceRecord, Summary};
use anyhow::Result;
use rusqlite::params;
use std::net::Ipv4Addr;
use tracing::warn;

pub(crate) const RESULT_ROWS_SQL: &str = "SELECT host.ip, host.timestamp, details.available, details.anonymous, details.ftps, details.stream, details.recorded_at
     FROM host LEFT JOIN details ON host.ip = details.related_ip";

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    /// Known hosts that have never been characterised.
    pub fn hosts_missing_details(&self) -> Result<Vec<Ipv4Addr>> {
        self.ip_column(
            "SELECT host.ip FROM host LEFT JOIN details ON host.ip = details.related_ip
             WHERE details.related_ip IS NULL",
        )
    }

    /// Known hosts without any name lookup stored.
    pub fn hosts_missing_dns(&self) -> Result<Vec<Ipv4Addr>> {
        self.ip_column(
            "SELECT host.ip FROM host LEFT JOIN dns ON host.ip = dns.related_ip
             WHERE dns.related_ip IS NULL",
        )
    }

    fn ip_column(&self, sql: &str) -> Result<Vec<Ipv4Addr>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            match raw.trim().parse() {
                Ok(ip) => out.push(ip),
                Err(_) => warn!(ip = %raw, "skipping unparsable host address"),
            }
        }
        Ok(out)
    }

    pub fn service_for(&self, ip: Ipv4Addr) -> Result<Option<ServiceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT related_ip, available, ftps, anonymous, stream, recorded_at FROM details WHERE related_ip = ?",
        )?;
        let mut rows = stmt.query(params![ip.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(service_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn services(&self) -> Result<Vec<ServiceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT related_ip, available, ftps, anonymous, stream, recorded_at FROM details ORDER BY related_ip",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(service_from_row(row)?);
        }
        Ok(out)
    }

    pub fn domains_for(&self, ip: Ipv4Addr) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT domain FROM dns WHERE related_ip = ? ORDER BY domain")?;
        let rows = stmt.query_map(params![ip.to_string()], |r| r.get::<_, Option<String>>(0))?;
        let mut out = Vec::new();
        for d in rows {
            out.push(d?.unwrap_or_default());
        }
        Ok(out)
    }

    pub fn result_rows(&self, anonymous_only: bool) -> Result<Vec<ResultRow>> {
        let sql = result_rows_sql(anonymous_only);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |r| {
            Ok(ResultRow {
                ip: r.get(0)?,
                discovered_at: r.get(1)?,
                available: r.get(2)?,
                anonymous: r.get(3)?,
                ftps: r.get(4)?,
                stream: r.get(5)?,
                recorded_at: r.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn summary(&self) -> Result<Summary> {
        let count = |sql: &str| -> Result<i64> { Ok(self.conn.query_row(sql, [], |r| r.get(0))?) };
        Ok(Summary {
            hosts: count("SELECT COUNT(1) FROM host")?,
            services: count("SELECT COUNT(1) FROM details")?,
            available: count("SELECT COUNT(1) FROM details WHERE available")?,
            anonymous: count("SELECT COUNT(1) FROM details WHERE anonymous")?,
            ftps: count("SELECT COUNT(1) FROM details WHERE ftps")?,
            awaiting_probe: count(
                "SELECT COUNT(1) FROM host LEFT JOIN details ON host.ip = details.related_ip WHERE details.related_ip IS NULL",
            )?,
            named_hosts: count("SELECT COUNT(DISTINCT related_ip) FROM dns WHERE domain <> ''")?,
        })
    }

    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, started_at, finished_at, mode, dispatched, reachable, error_count FROM runs ORDER BY started_at",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(RunRecord {
                run_id: r.get(0)?,
                started_at: r.get(1)?,
                finished_at: r.get(2)?,
                mode: r.get(3)?,
                totals: RunTotals { dispatched: r.get(4)?, reachable: r.get(5)?, error_count: r.get(6)? },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

pub(crate) fn result_rows_sql(anonymous_only: bool) -> String {
    if anonymous_only {
        format!("{RESULT_ROWS_SQL} WHERE details.anonymous ORDER BY host.ip")
    } else {
        format!("{RESULT_ROWS_SQL} ORDER BY host.ip")
    }
}

fn service_from_row(row: &rusqlite::Row<'_>) -> Result<ServiceRecord> {
    let ip: String = row.get(0)?;
    Ok(ServiceRecord {
        related_ip: ip.trim().parse()?,
        available: row.get::<_, Option<bool>>(1)?.unwrap_or(false),
        supports_tls: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
        allows_anonymous: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
        raw_banner: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        recorded_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}
