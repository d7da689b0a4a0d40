//! Process-wide table-schema cache.
//!
//! Apply batches validate every row column against the target table's
//! schema. Reading `PRAGMA table_info` per row would dominate apply time,
//! so column sets are cached per table and invalidated when the database's
//! `schema_version` moves.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{SqliteError, SqliteResult};
use crate::ident::quote_identifier;

struct CacheEntry {
    schema_version: i64,
    columns: HashSet<String>,
}

lazy_static! {
    static ref SCHEMA_CACHE: Mutex<HashMap<String, CacheEntry>> = Mutex::new(HashMap::new());
}

/// Returns the column set of `table`, served from the cache when the
/// database's `schema_version` still matches the cached load.
///
/// `force_reload` bypasses the cache once; callers use it when a row names
/// a column the cached set does not contain, in case the cache is stale.
///
/// # Errors
///
/// Fails when the pragma cannot be read or the table has no columns
/// (missing table).
pub fn table_columns(
    conn: &Connection,
    table: &str,
    force_reload: bool,
) -> SqliteResult<HashSet<String>> {
    let version = schema_version(conn)?;

    if !force_reload {
        let cache = SCHEMA_CACHE.lock();
        if let Some(entry) = cache.get(table) {
            if entry.schema_version == version {
                return Ok(entry.columns.clone());
            }
        }
    }

    // The lock is not held while touching the database.
    let sql = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut columns = HashSet::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        columns.insert(name);
    }

    if columns.is_empty() {
        return Err(SqliteError::SchemaUnavailable {
            table: table.to_string(),
        });
    }

    debug!(table, count = columns.len(), "loaded table schema");
    SCHEMA_CACHE.lock().insert(
        table.to_string(),
        CacheEntry {
            schema_version: version,
            columns: columns.clone(),
        },
    );
    Ok(columns)
}

/// Drops every cached column set. Hosts call this when switching databases.
pub fn clear_schema_cache() {
    SCHEMA_CACHE.lock().clear();
}

fn schema_version(conn: &Connection) -> SqliteResult<i64> {
    Ok(conn.query_row("PRAGMA schema_version", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_caches_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE schema_cache_t1 (id TEXT, name TEXT)", [])
            .unwrap();

        let columns = table_columns(&conn, "schema_cache_t1", false).unwrap();
        assert!(columns.contains("id"));
        assert!(columns.contains("name"));
        assert_eq!(columns.len(), 2);

        // Second load hits the cache and agrees.
        let again = table_columns(&conn, "schema_cache_t1", false).unwrap();
        assert_eq!(columns, again);
    }

    #[test]
    fn schema_version_change_invalidates() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE schema_cache_t2 (id TEXT)", [])
            .unwrap();
        let before = table_columns(&conn, "schema_cache_t2", false).unwrap();
        assert_eq!(before.len(), 1);

        conn.execute("ALTER TABLE schema_cache_t2 ADD COLUMN extra TEXT", [])
            .unwrap();
        let after = table_columns(&conn, "schema_cache_t2", false).unwrap();
        assert!(after.contains("extra"));
    }

    #[test]
    fn missing_table_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err = table_columns(&conn, "schema_cache_missing", false).unwrap_err();
        assert!(err.to_string().contains("schema_cache_missing"));
    }

    #[test]
    fn force_reload_bypasses_cache() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE schema_cache_t3 (id TEXT)", [])
            .unwrap();
        table_columns(&conn, "schema_cache_t3", false).unwrap();
        let reloaded = table_columns(&conn, "schema_cache_t3", true).unwrap();
        assert_eq!(reloaded.len(), 1);
    }
}
