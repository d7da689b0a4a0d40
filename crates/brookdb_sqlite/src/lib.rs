//! # BrookDB SQLite
//!
//! The SQLite access layer shared by the import and sync engines:
//! - A connection-pool seam over host-managed connections, keyed by tag
//! - The batched multi-row insert helper used by slice imports
//! - A process-wide table-schema cache invalidated by `schema_version`
//! - The host query facade with identity-cache short-circuiting
//!
//! Connections themselves are owned by the host; this crate only leases
//! them per call and never opens application databases of its own (the
//! [`SingleConnectionPool`] exists for embedding and tests).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod error;
mod ident;
mod insert;
mod pool;
mod query;
mod schema;

pub use convert::{from_sql_value, to_sql_value};
pub use error::{SqliteError, SqliteResult};
pub use ident::quote_identifier;
pub use insert::InsertHelper;
pub use pool::{ConnectionPool, ConnectionTag, SharedConnection, SingleConnectionPool};
pub use query::{
    exec_sql, find_by_table, is_read_only, IdentityCache, MemoryIdentityCache, SqlRecord,
};
pub use schema::{clear_schema_cache, table_columns};
