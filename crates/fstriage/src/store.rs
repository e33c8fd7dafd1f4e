//! Inventory store
//!
//! One SQLite table of [`FileRecord`]s keyed by `path`, with secondary indexes
//! on `mime` and `sha256`. The database runs in WAL mode so external readers
//! keep seeing the last committed state while a run holds its write
//! transaction.

use crate::error::{Result, TriageError};
use crate::types::{DetectionMethod, DigestGroup, FileRecord, MimeCount};
use fstriage_db::{BackendError, DbConnection, DbRow, DbValue};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    size INTEGER,
    mtime REAL,
    ctime REAL,
    mime TEXT,
    sha256 TEXT,
    detector TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_mime ON files(mime);
CREATE INDEX IF NOT EXISTS idx_files_sha256 ON files(sha256);
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO files (path, size, mtime, ctime, mime, sha256, detector)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(path) DO UPDATE SET
    size = excluded.size,
    mtime = excluded.mtime,
    ctime = excluded.ctime,
    mime = excluded.mime,
    sha256 = excluded.sha256,
    detector = excluded.detector
"#;

const SELECT_RECORD: &str =
    "SELECT path, size, mtime, ctime, mime, sha256, detector FROM files";

/// Handle to the inventory database
#[derive(Debug)]
pub struct Store {
    conn: DbConnection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create the store at `path`, enable WAL and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TriageError::io(parent, e))?;
        }

        let conn = DbConnection::open(path)?;
        let mode = conn.enable_wal()?;
        if mode != "wal" {
            return Err(BackendError::Database(format!(
                "{} did not switch to WAL (journal_mode={})",
                path.display(),
                mode
            ))
            .into());
        }
        conn.execute_batch(SCHEMA_SQL)?;
        info!(path = %path.display(), "Inventory store ready");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an existing store for queries only.
    pub fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TriageError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "inventory store not found"),
            ));
        }
        let conn = DbConnection::open_readonly(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = DbConnection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn, path: None })
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &DbConnection {
        &self.conn
    }

    /// Current journal mode (`wal` for file-backed stores).
    pub fn journal_mode(&self) -> Result<String> {
        Ok(self.conn.journal_mode()?)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or overwrite every record in one transaction.
    ///
    /// Returns the number of records applied; inserts and updates both count.
    /// Any failure rolls the whole batch back.
    pub fn upsert_batch(&self, records: &[FileRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let applied = self.conn.transaction(|tx| {
            let mut applied = 0u64;
            for record in records {
                tx.execute(UPSERT_SQL, &record_params(record))?;
                applied += 1;
            }
            Ok(applied)
        })?;

        debug!(records = applied, "Upsert batch committed");
        Ok(applied)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Row counts grouped by `mime`, count descending then mime ascending.
    pub fn aggregate_by_mime(&self) -> Result<Vec<MimeCount>> {
        let rows = self.conn.query_all(
            "SELECT mime, COUNT(*) AS n FROM files GROUP BY mime ORDER BY n DESC, mime ASC",
            &[],
        )?;
        rows.iter()
            .map(|row| -> Result<MimeCount> {
                Ok(MimeCount {
                    mime: row.get(0)?,
                    count: row.get(1)?,
                })
            })
            .collect()
    }

    pub fn count_rows(&self) -> Result<u64> {
        Ok(self.conn.query_scalar("SELECT COUNT(*) FROM files", &[])?)
    }

    /// Stored record for `path`, if any.
    pub fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let sql = format!("{} WHERE path = ?", SELECT_RECORD);
        match self.conn.query_optional(&sql, &[path.into()])? {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    /// All stored records whose content digest equals `digest`.
    pub fn find_by_sha256(&self, digest: &str) -> Result<Vec<FileRecord>> {
        let sql = format!("{} WHERE sha256 = ? ORDER BY path", SELECT_RECORD);
        let rows = self.conn.query_all(&sql, &[digest.to_ascii_lowercase().into()])?;
        rows.iter().map(row_to_record).collect()
    }

    /// Digests shared by more than one path, most shared first.
    pub fn duplicate_digests(&self, limit: usize) -> Result<Vec<DigestGroup>> {
        let rows = self.conn.query_all(
            r#"
            SELECT sha256, COUNT(*) AS n FROM files
            GROUP BY sha256
            HAVING COUNT(*) > 1
            ORDER BY n DESC, sha256 ASC
            LIMIT ?
            "#,
            &[(limit as u64).into()],
        )?;
        rows.iter()
            .map(|row| -> Result<DigestGroup> {
                Ok(DigestGroup {
                    sha256: row.get(0)?,
                    count: row.get(1)?,
                })
            })
            .collect()
    }

    /// Close the connection, surfacing any error from SQLite.
    pub fn close(self) -> Result<()> {
        Ok(self.conn.close()?)
    }
}

fn record_params(record: &FileRecord) -> [DbValue; 7] {
    [
        record.path.as_str().into(),
        record.size.into(),
        record.mtime.into(),
        record.ctime.into(),
        record.mime.as_str().into(),
        record.sha256.as_str().into(),
        record.detector.as_str().into(),
    ]
}

fn row_to_record(row: &DbRow) -> Result<FileRecord> {
    let detector: String = row.get(6)?;
    let detector = detector
        .parse::<DetectionMethod>()
        .map_err(BackendError::TypeConversion)?;

    Ok(FileRecord {
        path: row.get(0)?,
        size: row.get(1)?,
        mtime: row.get(2)?,
        ctime: row.get(3)?,
        mime: row.get(4)?,
        sha256: row.get(5)?,
        detector,
    })
}
