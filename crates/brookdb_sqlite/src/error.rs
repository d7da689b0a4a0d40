//! Error types for the SQLite layer.

use thiserror::Error;

use crate::pool::ConnectionTag;

/// Result type for SQLite layer operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Errors produced by the SQLite access layer.
///
/// Database errors keep the SQLite message verbatim; those strings are
/// user-visible and must not be replaced with generic text.
#[derive(Error, Debug)]
pub enum SqliteError {
    /// An underlying SQLite error (prepare, bind, step, commit).
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No connection is registered for the requested tag.
    #[error("no connection available for tag {tag}")]
    UnknownTag {
        /// The tag the host asked for.
        tag: ConnectionTag,
    },

    /// `PRAGMA table_info` produced no columns.
    #[error("failed to load table schema for {table}")]
    SchemaUnavailable {
        /// The table that could not be described.
        table: String,
    },

    /// A facade query did not produce `id` as its first column.
    #[error("query result does not have 'id' as first column")]
    FirstColumnNotId,

    /// A facade query row had a NULL or blob id.
    #[error("failed to get id of a record")]
    MissingRecordId,
}
