use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tracing::debug;

use crate::error::DbError;
use crate::schema;

/// Persistent inventory + CVE database backed by SQLite.
pub struct InventoryStore {
    conn: Connection,
}

/// A tracked equipment row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Equipment {
    pub id: i64,
    pub name: String,
    pub version: Option<String>,
    pub quantity: i64,
    pub cpe: String,
    pub category: Option<String>,
    pub added_at: String,
}

/// Input for creating an equipment row (manual entry or bulk import).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewEquipment {
    pub name: String,
    pub version: Option<String>,
    /// Defaults to 1 when omitted.
    pub quantity: Option<i64>,
    pub cpe: String,
    pub category: Option<String>,
}

/// A stored vulnerability row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CveRecord {
    pub cve_id: String,
    pub description: String,
    pub published: Option<String>,
    pub last_modified: Option<String>,
    pub cvss_score: Option<f64>,
    pub severity: Option<String>,
    pub cpe_related: String,
    pub is_fixed: bool,
}

/// A vulnerability as produced by the ingest mapping, before storage.
/// `is_fixed` always starts at its column default (false).
#[derive(Debug, Clone)]
pub struct NewCveRecord {
    pub cve_id: String,
    pub description: String,
    pub published: Option<String>,
    pub last_modified: Option<String>,
    pub cvss_score: Option<f64>,
    pub severity: Option<String>,
    pub cpe_related: String,
}

/// Dashboard row: one of the highest-scoring CVEs of the current year.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TopCve {
    pub cve_id: String,
    pub cvss_score: Option<f64>,
    pub cpe_related: String,
    pub severity: Option<String>,
}

/// Dashboard row: a recently published inventory-linked CVE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecentCve {
    pub cve_id: String,
    pub published: Option<String>,
    pub severity: Option<String>,
    pub cvss_score: Option<f64>,
    pub cpe_related: String,
}

fn default_db_path() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("cvewatch").join("cvewatch.db")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".cvewatch").join("cvewatch.db")
    }
}

impl InventoryStore {
    /// Open (or create) the database at the default location.
    pub fn open_default() -> Result<Self, DbError> {
        let path = default_db_path();
        Self::open(&path)
    }

    /// Open a database at a specific path.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::Other(format!(
                    "failed to create db directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        debug!(path = %path.display(), "inventory database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------------
    // Equipment methods
    // -----------------------------------------------------------------------

    /// Insert a new equipment row. Fails with `DbError::Duplicate` when the
    /// CPE is already tracked; the store is left unchanged in that case.
    pub fn add_equipment(&self, new: &NewEquipment) -> Result<Equipment, DbError> {
        let quantity = new.quantity.unwrap_or(1);
        let result = self.conn.execute(
            "INSERT INTO equipments (name, version, quantity, cpe, category) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![new.name, new.version, quantity, new.cpe, new.category],
        );
        match result {
            Ok(_) => {}
            Err(e) if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) => {
                return Err(DbError::Duplicate(format!(
                    "cpe already tracked: {}",
                    new.cpe
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        let row = self.conn.query_row(
            "SELECT id, name, version, quantity, cpe, category, added_at \
             FROM equipments WHERE id = ?1",
            params![id],
            equipment_from_row,
        )?;
        Ok(row)
    }

    /// List all equipment, oldest first.
    pub fn list_equipment(&self) -> Result<Vec<Equipment>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, version, quantity, cpe, category, added_at \
             FROM equipments ORDER BY id",
        )?;
        let rows = stmt.query_map([], equipment_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Delete an equipment row by id. Returns false when the id is unknown.
    /// CVE rows keyed to the deleted CPE are left in place (no cascade).
    pub fn delete_equipment(&self, id: i64) -> Result<bool, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM equipments WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Bulk-import equipment, skipping rows whose CPE is already tracked.
    /// Returns the number of rows actually inserted.
    pub fn import_equipment(&self, items: &[NewEquipment]) -> Result<usize, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;

        for item in items {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO equipments (name, version, quantity, cpe, category) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    item.name,
                    item.version,
                    item.quantity.unwrap_or(1),
                    item.cpe,
                    item.category,
                ],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    // -----------------------------------------------------------------------
    // CVE ingest & query methods
    // -----------------------------------------------------------------------

    /// Insert vulnerability rows with insert-if-absent semantics: a record
    /// whose `cve_id` already exists is silently skipped, never refreshed.
    /// Returns the number of rows actually inserted.
    pub fn insert_cves(&self, records: &[NewCveRecord]) -> Result<usize, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;

        for rec in records {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO cves \
                 (cve_id, description, published, last_modified, cvss_score, severity, cpe_related) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    rec.cve_id,
                    rec.description,
                    rec.published,
                    rec.last_modified,
                    rec.cvss_score,
                    rec.severity,
                    rec.cpe_related,
                ],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Open (not fixed) CVEs recorded for a CPE, newest first.
    pub fn open_cves_for_cpe(&self, cpe: &str) -> Result<Vec<CveRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT cve_id, description, published, last_modified, cvss_score, severity, \
             cpe_related, is_fixed \
             FROM cves WHERE cpe_related = ?1 AND is_fixed = 0 \
             ORDER BY published DESC",
        )?;
        let rows = stmt.query_map(params![cpe], cve_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Total CVE rows, fixed or not, inventory-linked or orphaned.
    pub fn count_cves(&self) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cves", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // -----------------------------------------------------------------------
    // Dashboard aggregate methods
    // -----------------------------------------------------------------------

    /// Open CVEs whose CPE is currently in the inventory.
    pub fn count_open_inventory_cves(&self) -> Result<u64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cves \
             WHERE is_fixed = 0 AND cpe_related IN (SELECT cpe FROM equipments)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Severity histogram over open inventory-linked CVEs. NULL and empty
    /// severities are bucketed under the UNKNOWN sentinel.
    pub fn severity_distribution(&self) -> Result<BTreeMap<String, u64>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT CASE WHEN severity IS NULL OR severity = '' THEN 'UNKNOWN' \
                    ELSE severity END AS bucket, COUNT(*) \
             FROM cves \
             WHERE is_fixed = 0 AND cpe_related IN (SELECT cpe FROM equipments) \
             GROUP BY bucket",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut dist = BTreeMap::new();
        for row in rows {
            let (severity, count) = row?;
            dist.insert(severity, count);
        }
        Ok(dist)
    }

    /// The `limit` highest-scoring open CVEs published in `year`, score
    /// descending, ties broken by newer publication date.
    pub fn top_critical(&self, year: i32, limit: usize) -> Result<Vec<TopCve>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT cve_id, cvss_score, cpe_related, severity FROM cves \
             WHERE published LIKE ?1 AND is_fixed = 0 \
             ORDER BY cvss_score DESC, published DESC \
             LIMIT ?2",
        )?;
        let year_prefix = format!("{year}%");
        let rows = stmt.query_map(params![year_prefix, limit as i64], |row| {
            Ok(TopCve {
                cve_id: row.get(0)?,
                cvss_score: row.get(1)?,
                cpe_related: row.get(2)?,
                severity: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Inventory-linked CVEs published on or after `cutoff` (ISO-8601),
    /// newest first. When the window is empty, falls back to the
    /// `fallback_limit` most recently published inventory-linked rows so the
    /// dashboard never renders an empty recency panel.
    pub fn recent_cves(
        &self,
        cutoff: &str,
        fallback_limit: usize,
    ) -> Result<Vec<RecentCve>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT cve_id, published, severity, cvss_score, cpe_related FROM cves \
             WHERE cpe_related IN (SELECT cpe FROM equipments) AND published >= ?1 \
             ORDER BY published DESC",
        )?;
        let rows = stmt.query_map(params![cutoff], recent_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        if !out.is_empty() {
            return Ok(out);
        }

        let mut stmt = self.conn.prepare(
            "SELECT cve_id, published, severity, cvss_score, cpe_related FROM cves \
             WHERE cpe_related IN (SELECT cpe FROM equipments) \
             ORDER BY published DESC \
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![fallback_limit as i64], recent_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn equipment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Equipment> {
    Ok(Equipment {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        quantity: row.get(3)?,
        cpe: row.get(4)?,
        category: row.get(5)?,
        added_at: row.get(6)?,
    })
}

fn cve_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CveRecord> {
    Ok(CveRecord {
        cve_id: row.get(0)?,
        description: row.get(1)?,
        published: row.get(2)?,
        last_modified: row.get(3)?,
        cvss_score: row.get(4)?,
        severity: row.get(5)?,
        cpe_related: row.get(6)?,
        is_fixed: row.get::<_, i64>(7)? != 0,
    })
}

fn recent_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecentCve> {
    Ok(RecentCve {
        cve_id: row.get(0)?,
        published: row.get(1)?,
        severity: row.get(2)?,
        cvss_score: row.get(3)?,
        cpe_related: row.get(4)?,
    })
}
