//! Connection pooling seam.
//!
//! The host owns the real pool (one writer plus readers per database) and
//! hands connections out by integer tag. The core acquires a connection per
//! call and releases it by dropping the lock guard.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{SqliteError, SqliteResult};

/// Identifier the host uses to select a database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionTag(pub i32);

impl fmt::Display for ConnectionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A leased connection. The mutex serializes access; SQLite connections are
/// not safe for concurrent use.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Host-managed source of SQLite connections.
pub trait ConnectionPool: Send + Sync {
    /// Returns the write connection for `tag`.
    fn writer(&self, tag: ConnectionTag) -> SqliteResult<SharedConnection>;

    /// Returns a read connection for `tag`.
    fn reader(&self, tag: ConnectionTag) -> SqliteResult<SharedConnection>;
}

/// A pool serving one connection for both reads and writes.
///
/// Suitable for tests and hosts without a reader pool; the shared mutex
/// makes readers queue behind the writer.
pub struct SingleConnectionPool {
    tag: ConnectionTag,
    connection: SharedConnection,
}

impl SingleConnectionPool {
    /// Opens an in-memory database registered under `tag`.
    pub fn open_in_memory(tag: ConnectionTag) -> SqliteResult<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self::from_connection(tag, connection))
    }

    /// Opens (or creates) a database file registered under `tag`.
    pub fn open(tag: ConnectionTag, path: &Path) -> SqliteResult<Self> {
        let connection = Connection::open(path)?;
        Ok(Self::from_connection(tag, connection))
    }

    /// Wraps an existing connection.
    pub fn from_connection(tag: ConnectionTag, connection: Connection) -> Self {
        Self {
            tag,
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    /// Direct access to the underlying connection, for test setup.
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.connection)
    }
}

impl ConnectionPool for SingleConnectionPool {
    fn writer(&self, tag: ConnectionTag) -> SqliteResult<SharedConnection> {
        if tag != self.tag {
            return Err(SqliteError::UnknownTag { tag });
        }
        Ok(Arc::clone(&self.connection))
    }

    fn reader(&self, tag: ConnectionTag) -> SqliteResult<SharedConnection> {
        self.writer(tag)
    }
}
