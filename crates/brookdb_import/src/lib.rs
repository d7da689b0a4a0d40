//! # BrookDB Import
//!
//! The streaming slice import engine: download → decompress → parse →
//! batched insert, all inside one outer SQLite transaction with periodic
//! savepoint cycling.
//!
//! This crate provides:
//! - The batch accumulator rows are staged in between flushes
//! - The `ImportDatabase` seam and its SQLite adapter (WAL pragmas,
//!   `BEGIN IMMEDIATE`, savepoint protocol)
//! - The import engine itself, with adaptive batch sizing under memory
//!   pressure
//! - A process-wide registry that keeps engines alive through their own
//!   async callbacks

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod db;
mod engine;
mod error;
mod registry;

pub use batch::{RowBatch, TableRows};
pub use db::{ImportDatabase, SqliteImportAdapter};
pub use engine::{ImportCompletion, SliceImportEngine};
pub use error::{ImportError, ImportResult};
pub use registry::active_import_count;
