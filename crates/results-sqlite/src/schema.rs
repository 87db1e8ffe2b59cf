//! Column names follow the databases written by earlier scanner releases so
//! those files open without conversion.

pub const SCHEMA_VERSION: i64 = 2;

pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE IF NOT EXISTS host (
  ip              TEXT PRIMARY KEY,
  timestamp       TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS details (
  related_ip      TEXT REFERENCES host(ip),
  available       BOOL,
  anonymous       BOOL,
  ftps            BOOL,
  stream          TEXT,
  recorded_at     TIMESTAMP
);

CREATE TABLE IF NOT EXISTS dns (
  related_ip      TEXT REFERENCES host(ip),
  domain          TEXT
);

CREATE TABLE IF NOT EXISTS runs (
  run_id          TEXT PRIMARY KEY,
  started_at      TEXT NOT NULL,
  finished_at     TEXT,
  mode            TEXT NOT NULL,
  tool_version    TEXT NOT NULL,
  config_json     TEXT NOT NULL,
  dispatched      INTEGER DEFAULT 0,
  reachable       INTEGER DEFAULT 0,
  error_count     INTEGER DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_timestamp ON host (timestamp);
CREATE INDEX IF NOT EXISTS idx_details_anonymous ON details (anonymous);
CREATE INDEX IF NOT EXISTS idx_dns_related_ip ON dns (related_ip);

COMMIT;
"#;

/// One service record per host: keep the newest row of any duplicates, then enforce it.
pub const MIG_0002_UNIQUE_DETAILS: &str = r#"
BEGIN;

DELETE FROM details
 WHERE rowid NOT IN (SELECT MAX(rowid) FROM details GROUP BY related_ip);

CREATE UNIQUE INDEX IF NOT EXISTS idx_details_related_ip ON details (related_ip);

COMMIT;
"#;
