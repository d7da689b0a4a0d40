//! # BrookDB Sync
//!
//! The incremental synchronization subsystem:
//! - A single-flight state machine driving authenticated, cursor-paginated
//!   HTTP pulls, delegated apply, delegated push, retry with exponential
//!   backoff, and auth refresh
//! - The transactional JSON → SQL apply engine that upserts and deletes
//!   rows and advances the last-sequence-id watermark
//! - Configuration parsing and the JSON event stream the host observes
//!
//! The engine owns no I/O: HTTP goes through the host's client, database
//! work through the connection the host leases out, and all outcomes are
//! reported through callbacks and single-line JSON events.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod config;
mod cursor;
mod engine;
mod error;
mod events;
mod state;

pub use apply::{apply_sync_payload, LAST_SEQUENCE_KEY};
pub use config::SyncConfig;
pub use cursor::{build_url_with_cursor, extract_next_cursor, url_encode};
pub use engine::{
    ApplyCallback, AuthTokenRequestCallback, CompletionCallback, EventCallback,
    PushChangesCallback, PushCompletion, SyncEngine,
};
pub use error::{ApplyError, ApplyResult};
pub use events::escape_json;
pub use state::SyncState;
