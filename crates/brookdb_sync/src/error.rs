//! Error types for payload application.

use brookdb_sqlite::SqliteError;
use thiserror::Error;

/// Result type for apply operations.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Errors that abort a sync apply batch.
///
/// Any of these rolls the apply transaction back; the message travels to
/// the host and into the `error` event of the sync run.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The payload was not valid JSON.
    #[error("{message}")]
    Parse {
        /// Parser error text.
        message: String,
    },

    /// The payload root was not an array.
    #[error("Invalid JSON root")]
    InvalidRoot,

    /// An entry carried no `table`/`tableName`.
    #[error("Missing table name in row entry")]
    MissingTable,

    /// A delete entry carried no `id`.
    #[error("Missing id for delete entry")]
    MissingDeleteId,

    /// An upsert entry's row payload was not an object.
    #[error("Invalid row payload")]
    InvalidRowPayload,

    /// A row had no keys that are columns of the target table.
    #[error("No matching columns for table {table}")]
    NoMatchingColumns {
        /// Target table.
        table: String,
    },

    /// A row column is absent from the table schema, even after reload.
    #[error("Unknown column {column} for table {table}")]
    UnknownColumn {
        /// Target table.
        table: String,
        /// The offending column.
        column: String,
    },

    /// The target table has no `id` column.
    #[error("Table {table} missing id column")]
    MissingIdColumn {
        /// Target table.
        table: String,
    },

    /// An upsert row carried no `id` value.
    #[error("Row missing id for table {table}")]
    RowMissingId {
        /// Target table.
        table: String,
    },

    /// A database operation failed; the SQLite message passes through.
    #[error("{0}")]
    Database(#[from] SqliteError),
}

impl From<rusqlite::Error> for ApplyError {
    fn from(e: rusqlite::Error) -> Self {
        ApplyError::Database(SqliteError::from(e))
    }
}
