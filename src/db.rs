mod migration;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Row};
use time::OffsetDateTime;
use tracing::debug;

pub use migration::{MIGRATIONS, Migration, current_version};

use crate::Result;

/// Busy timeout applied when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Database wrapper providing connection management and schema initialization.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens an in-memory SQLite database.
    ///
    /// Automatically initializes the schema on connection open.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist.
    /// Automatically initializes the schema on connection open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`Database::open`], waiting up to `busy_timeout` for other
    /// connections to release the write lock.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening database");
        let conn = Connection::open(path)?;
        Self::initialize(conn, busy_timeout)
    }

    /// Enables foreign keys and brings the schema up to date.
    fn initialize(mut conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.busy_timeout(busy_timeout)?;
        migration::apply_pending_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so a read-modify-write sequence in
    /// `f` cannot interleave with another connection's. Commits when `f`
    /// returns `Ok`, rolls back otherwise. Must not be nested.
    pub fn immediate<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = &self.conn;
        conn.execute_batch("BEGIN IMMEDIATE")?;

        match f(conn) {
            Ok(value) => match conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    conn.execute_batch("ROLLBACK").ok();
                    Err(e.into())
                }
            },
            Err(e) => {
                conn.execute_batch("ROLLBACK").ok();
                Err(e)
            }
        }
    }
}

/// Current time truncated to the whole seconds stored in the database.
pub(crate) fn now() -> Result<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp(
        OffsetDateTime::now_utc().unix_timestamp(),
    )?)
}

/// Reads a unix-seconds column as a timestamp.
pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}
