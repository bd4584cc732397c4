use crate::schema::{DROP_SCHEMA, SCHEMA};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use smart_mirror_core::packages::PackageRecord;
use smart_mirror_core::popcon::PopconRecord;
use smart_mirror_core::ParseError;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Copy)]
pub struct NewPackage<'a> {
    pub architecture: &'a str,
    pub release: &'a str,
    pub package: &'a str,
    pub size: i64,
    pub filename: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: usize,
    pub duplicates: usize,
}

impl IngestStats {
    fn record(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.duplicates += 1;
        }
    }
}

pub fn init_db(path: &Path) -> Result<Connection, IndexError> {
    let conn = Connection::open(path)?;
    reset_schema(&conn)?;
    Ok(conn)
}

pub fn open_db(path: &Path) -> Result<Connection, IndexError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

pub fn reset_schema(conn: &Connection) -> Result<(), IndexError> {
    conn.execute_batch(DROP_SCHEMA)?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Returns `false` when the (architecture, release, package) key already exists.
pub fn insert_package(conn: &Connection, package: &NewPackage<'_>) -> Result<bool, IndexError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO packages (arch, release, package) VALUES (?1, ?2, ?3)",
        params![package.architecture, package.release, package.package],
    )?;
    if inserted == 0 {
        return Ok(false);
    }
    let pack_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO package_info (pack_id, size, filename) VALUES (?1, ?2, ?3)",
        params![pack_id, package.size, package.filename],
    )?;
    Ok(true)
}

pub fn insert_popcon(
    conn: &Connection,
    package: &str,
    category: &str,
    installs: i64,
) -> Result<bool, IndexError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO popcon (package, category, num_installs) VALUES (?1, ?2, ?3)",
        params![package, category, installs],
    )?;
    Ok(inserted > 0)
}

// One transaction per file; a parse error rolls the whole pass back.
pub fn ingest_packages<I>(
    conn: &mut Connection,
    release: &str,
    records: I,
) -> Result<IngestStats, IndexError>
where
    I: IntoIterator<Item = Result<PackageRecord, ParseError>>,
{
    let tx = conn.transaction()?;
    let mut stats = IngestStats::default();
    for record in records {
        let record = record?;
        let inserted = insert_package(
            &tx,
            &NewPackage {
                architecture: &record.architecture,
                release,
                package: &record.package,
                size: record.size,
                filename: &record.filename,
            },
        )?;
        stats.record(inserted);
    }
    tx.commit()?;
    Ok(stats)
}

pub fn ingest_popcon<I>(conn: &mut Connection, records: I) -> Result<IngestStats, IndexError>
where
    I: IntoIterator<Item = Result<PopconRecord, ParseError>>,
{
    let tx = conn.transaction()?;
    let mut stats = IngestStats::default();
    for record in records {
        let record = record?;
        let inserted = insert_popcon(&tx, &record.package, &record.category, record.installs)?;
        stats.record(inserted);
    }
    tx.commit()?;
    Ok(stats)
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), IndexError> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn get_meta(conn: &Connection) -> Result<Vec<(String, String)>, IndexError> {
    let mut stmt = conn.prepare("SELECT key, value FROM meta ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub const META_BUILT_AT: &str = "built_at";
pub const META_MIRROR: &str = "mirror";

pub fn record_build(
    conn: &Connection,
    mirror: &str,
    now: DateTime<Utc>,
) -> Result<(), IndexError> {
    set_meta(conn, META_BUILT_AT, &now.to_rfc3339())?;
    set_meta(conn, META_MIRROR, mirror)?;
    Ok(())
}

fn meta_value(conn: &Connection, key: &str) -> Result<Option<String>, IndexError> {
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
    let mut rows = stmt.query(params![key])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row.get(0)?))
    } else {
        Ok(None)
    }
}

pub fn built_at(conn: &Connection) -> Result<Option<DateTime<Utc>>, IndexError> {
    Ok(meta_value(conn, META_BUILT_AT)?
        .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

pub fn built_mirror(conn: &Connection) -> Result<Option<String>, IndexError> {
    meta_value(conn, META_MIRROR)
}

pub fn table_counts(conn: &Connection) -> Result<(i64, i64, i64), IndexError> {
    let counts = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM packages), \
                (SELECT COUNT(*) FROM package_info), \
                (SELECT COUNT(*) FROM popcon)",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(counts)
}
