//! Database backend abstraction layer.
//!
//! SQLite-only synchronous backend.
//! - Single writer per connection, any number of external readers in WAL mode
//! - Every statement is traced with its op name, a stable SQL hash and duration

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug_span, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from database backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation requires write access but database is read-only")]
    ReadOnly,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    /// Read-write access (the single writer of a run)
    ReadWrite,
    /// Read-only access (can coexist with a writer in WAL mode)
    ReadOnly,
}

/// Value type for query parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<u64> for DbValue {
    fn from(v: u64) -> Self {
        // SQLite integers are signed 64-bit
        DbValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Real(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DbValue::Null,
        }
    }
}

impl ToSql for DbValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DbValue::Null => ToSqlOutput::Owned(Value::Null),
            DbValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            DbValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            DbValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl DbValue {
    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, BackendError> {
        Ok(match value {
            ValueRef::Null => DbValue::Null,
            ValueRef::Integer(v) => DbValue::Integer(v),
            ValueRef::Real(v) => DbValue::Real(v),
            ValueRef::Text(v) => DbValue::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(_) => {
                return Err(BackendError::TypeConversion(
                    "BLOB columns are not supported".to_string(),
                ))
            }
        })
    }
}

/// Row data from a query result.
#[derive(Debug, Clone)]
pub struct DbRow {
    values: Vec<DbValue>,
}

impl DbRow {
    fn new(values: Vec<DbValue>) -> Self {
        Self { values }
    }

    /// Get a value by column index.
    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T, BackendError> {
        self.values
            .get(index)
            .ok_or_else(|| {
                BackendError::TypeConversion(format!("Column index {} out of bounds", index))
            })
            .and_then(|v| T::from_db_value(v))
    }
}

/// Trait for converting from DbValue.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError>;
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            DbValue::Null => Err(BackendError::TypeConversion(
                "i64 field is NULL - use Option<i64> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected integer".to_string())),
        }
    }
}

impl FromDbValue for u64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        let v = i64::from_db_value(value)?;
        u64::try_from(v)
            .map_err(|_| BackendError::TypeConversion(format!("Expected unsigned, got {}", v)))
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Real(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v as f64),
            DbValue::Null => Err(BackendError::TypeConversion(
                "f64 field is NULL - use Option<f64> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected real".to_string())),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            DbValue::Null => Err(BackendError::TypeConversion(
                "String field is NULL - use Option<String> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected text".to_string())),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Null => Ok(None),
            _ => T::from_db_value(value).map(Some),
        }
    }
}

/// Unified database connection.
pub struct DbConnection {
    conn: Connection,
    access_mode: AccessMode,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("backend", &"SQLite")
            .field("access_mode", &self.access_mode)
            .finish()
    }
}

impl DbConnection {
    /// Open or create a database file for writing.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        info!("Opened SQLite database: {}", path.display());

        Ok(Self {
            conn,
            access_mode: AccessMode::ReadWrite,
        })
    }

    /// Open an existing database file in read-only mode.
    pub fn open_readonly(path: &Path) -> Result<Self, BackendError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        info!("Opened SQLite database (read-only): {}", path.display());

        Ok(Self {
            conn,
            access_mode: AccessMode::ReadOnly,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()?;

        Ok(Self {
            conn,
            access_mode: AccessMode::ReadWrite,
        })
    }

    /// Switch the journal to write-ahead logging and return the resulting mode.
    ///
    /// In-memory databases report `memory`; file-backed ones report `wal`.
    pub fn enable_wal(&self) -> Result<String, BackendError> {
        if self.access_mode == AccessMode::ReadOnly {
            return Err(BackendError::ReadOnly);
        }
        let mode: String = self
            .conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(mode.to_lowercase())
    }

    /// Current journal mode, lowercased.
    pub fn journal_mode(&self) -> Result<String, BackendError> {
        let mode: String = self
            .conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))?;
        Ok(mode.to_lowercase())
    }

    /// Execute a batch of SQL statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        if self.access_mode == AccessMode::ReadOnly {
            return Err(BackendError::ReadOnly);
        }

        execute_batch_on_conn(&self.conn, sql)
    }

    /// Query and return all rows.
    pub fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        query_on_conn(&self.conn, sql, params)
    }

    /// Query and return the first row, if any.
    pub fn query_optional(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<Option<DbRow>, BackendError> {
        let rows = self.query_all(sql, params)?;
        Ok(rows.into_iter().next())
    }

    /// Query and return exactly one row.
    pub fn query_one(&self, sql: &str, params: &[DbValue]) -> Result<DbRow, BackendError> {
        self.query_optional(sql, params)?
            .ok_or_else(|| BackendError::Query("Expected one row, got none".to_string()))
    }

    /// Query and return a single scalar value.
    pub fn query_scalar<T: FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T, BackendError> {
        let row = self.query_one(sql, params)?;
        row.get(0)
    }

    /// Run `op` inside a single write transaction.
    ///
    /// Commits when `op` returns `Ok`, rolls back in full otherwise.
    pub fn transaction<T, F>(&self, op: F) -> Result<T, BackendError>
    where
        F: FnOnce(&mut DbTransaction<'_>) -> Result<T, BackendError>,
    {
        if self.access_mode == AccessMode::ReadOnly {
            return Err(BackendError::ReadOnly);
        }

        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let mut tx = DbTransaction { conn: &self.conn };
        let result = op(&mut tx);

        match result {
            Ok(value) => match self.conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    Err(BackendError::Transaction(format!(
                        "Commit failed: {}",
                        commit_err
                    )))
                }
            },
            Err(err) => match self.conn.execute_batch("ROLLBACK") {
                Ok(()) => Err(err),
                Err(rollback_err) => Err(BackendError::Transaction(format!(
                    "Transaction failed: {}; rollback failed: {}",
                    err, rollback_err
                ))),
            },
        }
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<(), BackendError> {
        self.conn.close().map_err(|(_, err)| BackendError::from(err))
    }
}

/// Handle passed to [`DbConnection::transaction`] closures.
pub struct DbTransaction<'a> {
    conn: &'a Connection,
}

impl<'a> DbTransaction<'a> {
    pub fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        execute_on_conn(self.conn, sql, params)
    }
}

fn execute_on_conn(conn: &Connection, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
    let op = sql_op_name(sql);
    let sql_hash = hash_sql(sql);
    let span = debug_span!(
        "db.exec",
        op = op,
        sql_hash = %sql_hash,
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.execute(params_from_iter(params.iter()))?;
    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);
    Ok(rows as u64)
}

fn execute_batch_on_conn(conn: &Connection, sql: &str) -> Result<(), BackendError> {
    let sql_hash = hash_sql(sql);
    let span = debug_span!(
        "db.exec_batch",
        op = "BATCH",
        sql_hash = %sql_hash,
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();
    conn.execute_batch(sql)?;
    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);
    Ok(())
}

fn query_on_conn(
    conn: &Connection,
    sql: &str,
    params: &[DbValue],
) -> Result<Vec<DbRow>, BackendError> {
    let op = sql_op_name(sql);
    let sql_hash = hash_sql(sql);
    let span = debug_span!(
        "db.query",
        op = op,
        sql_hash = %sql_hash,
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    let mut stmt = conn.prepare_cached(sql)?;
    let column_count = stmt.column_count();

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    let mut result = Vec::new();

    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(DbValue::from_value_ref(row.get_ref(i)?)?);
        }
        result.push(DbRow::new(values));
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);
    Ok(result)
}

fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit hash for low-cardinality, stable identification.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}
