pub mod migrations;
pub mod models;
pub mod queries;
pub mod schema;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

pub use schema::SchemaCapabilities;

const READER_POOL_SIZE: usize = 4;

/// Chat database with a single writer and a small pool of read-only
/// connections (SQLite WAL lets readers run alongside the writer).
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
    schema: SchemaCapabilities,
}

impl Database {
    /// Open (or create) the database and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open a database whose schema is owned by another application.
    /// No migrations run; optional columns are discovered by probing.
    pub fn open_existing(path: &Path) -> Result<Self> {
        Self::open_with(path, false)
    }

    fn open_with(path: &Path, migrate: bool) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        if migrate {
            migrations::run(&writer)?;
        }
        let schema = SchemaCapabilities::probe(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers, {})",
            path.display(),
            READER_POOL_SIZE,
            schema
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
            schema,
        })
    }

    /// Capabilities of the underlying schema, resolved once at open.
    pub fn schema(&self) -> SchemaCapabilities {
        self.schema
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow::anyhow!("Reader lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Writer lock poisoned: {}", e))?;
        f(&conn)
    }
}

/// Timestamp format shared with `datetime('now')` column defaults.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. SQLite defaults produce "YYYY-MM-DD HH:MM:SS"
/// without a zone; rows written by other tools may carry RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let a = parse_timestamp("2026-03-01 10:20:30").unwrap();
        let b = parse_timestamp("2026-03-01T10:20:30Z").unwrap();
        assert_eq!(a, b);
        assert_eq!(format_timestamp(a), "2026-03-01 10:20:30");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn open_creates_schema_with_all_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("chat.db")).unwrap();
        let caps = db.schema();
        assert!(caps.reply_to);
        assert!(caps.notifications);
        assert!(caps.activity_log);
    }

    #[test]
    fn reopening_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        let version: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(version, migrations::LATEST_VERSION);
    }
}
