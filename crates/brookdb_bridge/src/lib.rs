//! # BrookDB Bridge
//!
//! The host-facing surface of the native data layer. One
//! [`DatabaseBridge`] per application wires together:
//! - The query facade (identity-cached projections, parameterized SQL)
//! - The slice import engine
//! - The sync engine, with payload application routed through the work
//!   queue onto the configured database connection
//! - Sync event fan-out to any number of listeners
//! - The whole-file zstd helper
//!
//! The host supplies the platform pieces (connection pool, HTTP client,
//! downloader, memory alerts, device profile); everything else is owned
//! here.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod error;

pub use bridge::{DatabaseBridge, ListenerId, SyncListener};
pub use error::{BridgeError, BridgeResult};
