//! Error types for slice imports.

use brookdb_codec::SliceError;
use brookdb_sqlite::SqliteError;
use thiserror::Error;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Errors that terminate a slice import.
///
/// Every variant reaches the host through the import's completion callback;
/// the messages are user-visible.
#[derive(Error, Debug)]
pub enum ImportError {
    /// `start` was called while an import is running.
    #[error("Import already in progress")]
    AlreadyInProgress,

    /// The slice stream failed to decompress or parse.
    #[error("{0}")]
    Slice(#[from] SliceError),

    /// A database operation failed; carries the SQLite message verbatim.
    #[error("{0}")]
    Database(#[from] SqliteError),

    /// The downloader reported a failure.
    #[error("Download failed: {message}")]
    Download {
        /// Error text from the host downloader.
        message: String,
    },

    /// The download finished but the zstd frame never ended.
    #[error("Download completed but decompression stream not finished")]
    StreamNotFinished,

    /// The frame ended with bytes the parser never consumed.
    #[error("Stream ended with unparsed bytes: {remaining}")]
    UnparsedBytes {
        /// Count of leftover bytes.
        remaining: usize,
    },

    /// A row parse reported success without consuming any bytes.
    #[error("Parser returned a row without consuming bytes (possible infinite loop)")]
    ParserStalled,

    /// The import was cancelled by the host.
    #[error("Import cancelled")]
    Cancelled,
}
