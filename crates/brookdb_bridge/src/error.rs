//! Error type for the host boundary.

use brookdb_import::ImportError;
use brookdb_sqlite::SqliteError;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced to the host.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A database-layer failure.
    #[error("{0}")]
    Sqlite(#[from] SqliteError),

    /// A slice import failure.
    #[error("{0}")]
    Import(#[from] ImportError),

    /// A sync run failure, carrying the engine's error message.
    #[error("{message}")]
    Sync {
        /// Message delivered by the sync completion.
        message: String,
    },

    /// A file I/O failure (zstd helper).
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
