//! Embedded database layer for fstriage.
//!
//! A thin synchronous wrapper over SQLite. All reads and writes made by the
//! inventory store go through [`DbConnection`], so statement tracing and
//! transaction handling live in one place.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fstriage_db::{DbConnection, DbValue};
//! use std::path::Path;
//!
//! let conn = DbConnection::open(Path::new("/tmp/inventory.sqlite3"))?;
//! conn.enable_wal()?;
//! conn.transaction(|tx| {
//!     tx.execute("INSERT INTO t (name) VALUES (?)", &[DbValue::from("alpha")])?;
//!     Ok(())
//! })?;
//! let count: i64 = conn.query_scalar("SELECT COUNT(*) FROM t", &[])?;
//! ```

mod backend;

pub use backend::{
    BackendError, DbConnection, DbRow, DbTransaction, DbValue, FromDbValue,
};
