//! SQLite counter store.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` to allow concurrent readers while writers commit
//! - `busy_timeout = 5s` so parallel handlers queue instead of failing
//! - `foreign_keys = ON` so comments cascade with their item
//!
//! Cross-request coordination lives entirely in SQL: conditional `UPDATE`s,
//! unique constraints, and `BEGIN IMMEDIATE` transactions. The pool only
//! hands out connections; it never serializes requests.

pub mod comments;
pub mod items;
pub mod ledger;
pub mod migrations;
pub mod ratelimit;
pub mod schema;
pub mod sweep;
pub mod votes;

use crate::error::ErrorCode;
use rusqlite::Connection;
use std::{
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::Duration,
};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 8;

/// Errors raised by the counter store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database is busy, locked, or cannot be opened. Retryable.
    #[error("counter store unavailable: {0}")]
    Unavailable(#[source] rusqlite::Error),

    /// Any other SQLite failure.
    #[error("counter store error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("counter store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unavailable(&err) {
            Self::Unavailable(err)
        } else {
            Self::Sqlite(err)
        }
    }
}

impl StoreError {
    /// Machine-readable code associated with this store error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable(_) | Self::Io(_) => ErrorCode::DatabaseConnectionError,
            Self::Sqlite(_) => ErrorCode::DatabaseError,
        }
    }
}

fn is_unavailable(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if matches!(
                inner.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::CannotOpen
            )
    )
}

/// True when `err` is a uniqueness/constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// File-backed SQLite store with a small connection pool.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl Store {
    /// Open (or create) the store, apply runtime pragmas, and migrate the
    /// schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or opening,
    /// configuring, or migrating the database fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = open_connection(path)?;
        let version = migrations::migrate(&mut conn)?;
        tracing::debug!(path = %path.display(), version, "counter store ready");

        Ok(Self {
            path: path.to_path_buf(),
            idle: Mutex::new(vec![conn]),
            max_idle: DEFAULT_MAX_IDLE,
        })
    }

    /// Database file backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check out a connection, opening a new one when the pool is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a new connection cannot be opened.
    pub fn conn(&self) -> Result<PooledConnection<'_>, StoreError> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let conn = match reused {
            Some(conn) => conn,
            None => open_connection(&self.path)?,
        };
        Ok(PooledConnection {
            conn: Some(conn),
            store: self,
        })
    }

    fn give_back(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

/// Connection checked out of a [`Store`]; returned to the pool on drop.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    store: &'a Store,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection is only taken on drop"))
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection is only taken on drop"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A connection left mid-transaction would poison the next caller.
            if conn.is_autocommit() {
                self.store.give_back(conn);
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    configure_connection(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, Store, StoreError};
    use crate::db::migrations;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = Store::open(&dir.path().join("ember.sqlite3")).expect("open store");
        (dir, store)
    }

    #[test]
    fn open_sets_wal_busy_timeout_and_fk() {
        let (_dir, store) = temp_store();
        let conn = store.conn().expect("checkout");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn open_runs_migrations() {
        let (_dir, store) = temp_store();
        let conn = store.conn().expect("checkout");
        let version = migrations::current_schema_version(&conn).expect("schema version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn pool_opens_extra_connections_on_demand() {
        let (_dir, store) = temp_store();
        let first = store.conn().expect("first");
        let second = store.conn().expect("second");
        let n: i64 = second
            .query_row("SELECT 1", [], |row| row.get(0))
            .expect("query on fresh connection");
        assert_eq!(n, 1);
        drop(first);
        drop(second);
        assert_eq!(store.idle.lock().expect("idle lock").len(), 2);
    }

    #[test]
    fn busy_errors_classify_as_connection_errors() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert_eq!(StoreError::from(busy).code(), ErrorCode::DatabaseConnectionError);

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert_eq!(StoreError::from(other).code(), ErrorCode::DatabaseError);
    }
}
