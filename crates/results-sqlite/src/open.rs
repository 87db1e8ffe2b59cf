use crate::schema::{MIG_0001_INIT, MIG_0002_UNIQUE_DETAILS, SCHEMA_VERSION};
use anyhow::Result;
use rusqlite::Connection;
use std::time::Duration;
use tracing::info;

pub struct Db {
    pub conn: Connection,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn })
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    // in-memory databases answer "memory" here, which is fine
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    conn.pragma_update(None, "synchronous", 0i64)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "temp_store", 2i64)?; // MEMORY
    conn.pragma_update(None, "cache_size", -262144i64)?; // 256 MiB
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if version < 1 {
        conn.execute_batch(MIG_0001_INIT)?;
        // details tables written by older releases lack recorded_at
        ensure_column(conn, "details", "recorded_at", "TIMESTAMP")?;
        conn.pragma_update(None, "user_version", 1i64)?;
    }
    if version < 2 {
        let before: i64 = conn.query_row("SELECT COUNT(1) FROM details", [], |r| r.get(0))?;
        conn.execute_batch(MIG_0002_UNIQUE_DETAILS)?;
        let after: i64 = conn.query_row("SELECT COUNT(1) FROM details", [], |r| r.get(0))?;
        if before != after {
            info!(removed = before - after, "dropped duplicate service records");
        }
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let present: i64 = conn.query_row(
        "SELECT COUNT(1) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |r| r.get(0),
    )?;
    if present == 0 {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))?;
    }
    Ok(())
}
