//! # BrookDB Codec
//!
//! Slice binary format parsing for BrookDB.
//!
//! A *slice* is a compressed table dump shipped from the server for initial
//! hydration of the local database. This crate provides:
//! - LEB128 varint and length-prefixed string decoding
//! - The `FieldValue` tagged variant used throughout the import pipeline
//! - A streaming decoder that accepts compressed bytes incrementally and
//!   exposes header/table/row parsing as a cursor
//!
//! ## Wire format
//!
//! After zstd decompression, a slice is a slice header followed by zero or
//! more tables. Each table is a header (name + column names) followed by
//! rows, terminated by a single `0xFF` delimiter. Each row field is
//! `[length varint][value bytes][type tag]`; a zero-length field is NULL
//! regardless of its tag byte.
//!
//! ## Usage
//!
//! ```
//! use brookdb_codec::{SliceDecoder, HeaderStep};
//!
//! let mut decoder = SliceDecoder::new().unwrap();
//! // decoder.feed(&compressed_chunk)?;
//! match decoder.parse_slice_header().unwrap() {
//!     HeaderStep::Header(header) => println!("slice {}", header.slice_id),
//!     HeaderStep::NeedMoreData => {}
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod error;
mod slice;
mod value;
pub mod varint;

pub use decoder::{HeaderStep, RowStep, SliceDecoder, TableStep};
pub use error::{SliceError, SliceResult};
pub use slice::{
    SliceHeader, TableHeader, MAX_COLUMNS, MAX_DECLARED_TABLES, MAX_NAME_LENGTH,
};
pub use value::{FieldValue, TypeTag, END_OF_TABLE_DELIMITER};
