use crate::error::DbError;

const SCHEMA_SQL: &str = r#"
-- Tracked equipment (one row per asset; CPE is the feed lookup key)
CREATE TABLE IF NOT EXISTS equipments (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    version   TEXT,
    quantity  INTEGER NOT NULL DEFAULT 1,
    cpe       TEXT NOT NULL UNIQUE,
    category  TEXT,
    added_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Known vulnerabilities, one row per CVE id. Rows are written once by the
-- ingest path (INSERT OR IGNORE) and never refreshed. cpe_related records
-- which inventory CPE produced the row; it is not a foreign key, so rows
-- may orphan when equipment is deleted.
CREATE TABLE IF NOT EXISTS cves (
    cve_id        TEXT PRIMARY KEY,
    description   TEXT NOT NULL,
    published     TEXT,
    last_modified TEXT,
    cvss_score    REAL,
    severity      TEXT,
    cpe_related   TEXT NOT NULL,
    is_fixed      INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_cves_cpe ON cves(cpe_related);
CREATE INDEX IF NOT EXISTS idx_cves_published ON cves(published);
"#;

pub fn initialize(conn: &rusqlite::Connection) -> Result<(), DbError> {
    // WAL before DDL so the very first writes are crash-safe.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
