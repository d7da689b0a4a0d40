//! Error types for slice parsing.

use thiserror::Error;

/// Result type for slice decoding operations.
pub type SliceResult<T> = Result<T, SliceError>;

/// Errors that can occur while decompressing or parsing a slice.
///
/// All of these are fatal to the current import: the decoder makes no
/// attempt to resynchronize after corrupt input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SliceError {
    /// The zstd stream could not be created or reported an error.
    #[error("decompression error: {message}")]
    Decompression {
        /// Error text from the compression library.
        message: String,
    },

    /// A varint ran past its 10-byte limit.
    #[error("invalid {field}: corrupt varint")]
    CorruptVarint {
        /// Name of the field being decoded.
        field: String,
    },

    /// A length-prefixed string declared a length over the 1 MiB limit.
    #[error("invalid {field}: string exceeds maximum length")]
    OversizedString {
        /// Name of the field being decoded.
        field: String,
    },

    /// The frame ended in the middle of a value.
    #[error("truncated data while parsing {field}")]
    Truncated {
        /// Name of the field being decoded.
        field: String,
    },

    /// A name was empty or longer than 256 bytes.
    #[error("invalid {field} length")]
    InvalidNameLength {
        /// Name of the field being decoded.
        field: String,
    },

    /// A declared count fell outside its allowed range.
    #[error("invalid {field}: out of reasonable range ({value})")]
    CountOutOfRange {
        /// Name of the count field.
        field: String,
        /// The declared value.
        value: i64,
    },

    /// A field value declared a size over the 10 MiB limit.
    #[error("field size exceeds maximum allowed ({size} bytes)")]
    FieldTooLarge {
        /// The declared size.
        size: u64,
    },

    /// An INT or REAL field was not exactly 8 bytes.
    #[error("invalid {kind} field size ({size} bytes)")]
    FixedWidthSize {
        /// "INT" or "REAL".
        kind: &'static str,
        /// The declared size.
        size: usize,
    },

    /// A field carried a type tag the format does not define.
    #[error("unknown type tag: 0x{tag:02x}")]
    UnknownTypeTag {
        /// The offending tag byte.
        tag: u8,
    },

    /// A string or TEXT field was not valid UTF-8.
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Name of the field being decoded.
        field: String,
    },

    /// The byte between two tables was not the end-of-table delimiter.
    #[error("expected end-of-table delimiter")]
    MissingDelimiter,

    /// The frame ended before all declared tables appeared.
    #[error("stream ended after {parsed} of {expected} declared tables")]
    MissingTables {
        /// Tables parsed so far.
        parsed: i64,
        /// Tables declared in the slice header.
        expected: i64,
    },

    /// `parse_slice_header` was called twice.
    #[error("slice header already parsed")]
    HeaderAlreadyParsed,
}
