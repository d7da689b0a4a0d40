//! Host query facade.
//!
//! `exec_sql` runs arbitrary parameterized SQL; `find_by_table` is the
//! identity-cached projection used by the data layer above to avoid
//! re-materializing records it already holds in memory.

use brookdb_codec::FieldValue;
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use std::collections::{HashMap, HashSet};

use crate::convert::{from_sql_value, to_sql_value};
use crate::error::{SqliteError, SqliteResult};
use crate::pool::ConnectionTag;

/// One result row as a column → value map.
pub type SqlRecord = HashMap<String, FieldValue>;

/// Returns true when `sql` only reads, based on its leading keyword.
pub fn is_read_only(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or_default();
    first.eq_ignore_ascii_case("select")
        || first.eq_ignore_ascii_case("with")
        || first.eq_ignore_ascii_case("explain")
}

/// Prepares `sql`, binds `args` positionally, and steps every row into a
/// record map.
///
/// Statements that produce no rows (INSERT, UPDATE, ...) return an empty
/// vector.
///
/// # Errors
///
/// Propagates SQLite errors verbatim.
pub fn exec_sql(
    conn: &Connection,
    sql: &str,
    args: &[FieldValue],
) -> SqliteResult<Vec<SqlRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = stmt.query(params_from_iter(args.iter().map(to_sql_value)))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = SqlRecord::with_capacity(column_names.len());
        for (i, name) in column_names.iter().enumerate() {
            let value: rusqlite::types::Value = row.get(i)?;
            record.insert(name.clone(), from_sql_value(value));
        }
        records.push(record);
    }
    Ok(records)
}

/// Host-managed set of `(tag, table, id)` triples for records the data
/// layer has already materialized.
pub trait IdentityCache: Send + Sync {
    /// True when the record is already cached.
    fn is_cached(&self, tag: ConnectionTag, table: &str, id: &str) -> bool;

    /// Marks the record as cached.
    fn mark_cached(&self, tag: ConnectionTag, table: &str, id: &str);
}

/// In-memory identity cache.
#[derive(Default)]
pub struct MemoryIdentityCache {
    entries: Mutex<HashSet<(i32, String, String)>>,
}

impl MemoryIdentityCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl IdentityCache for MemoryIdentityCache {
    fn is_cached(&self, tag: ConnectionTag, table: &str, id: &str) -> bool {
        self.entries
            .lock()
            .contains(&(tag.0, table.to_string(), id.to_string()))
    }

    fn mark_cached(&self, tag: ConnectionTag, table: &str, id: &str) {
        self.entries
            .lock()
            .insert((tag.0, table.to_string(), id.to_string()));
    }
}

/// Runs a SELECT whose first column must be `id` and short-circuits rows
/// the identity cache already knows.
///
/// Cached rows come back as just `{id}`; new rows are marked cached and
/// returned in full. This lets the layer above skip re-building model
/// objects it already holds.
///
/// # Errors
///
/// Fails when the first column is not `id`, an id is NULL or a blob, or
/// SQLite reports an error.
pub fn find_by_table(
    conn: &Connection,
    cache: &dyn IdentityCache,
    tag: ConnectionTag,
    table: &str,
    query: &str,
) -> SqliteResult<Vec<SqlRecord>> {
    let mut stmt = conn.prepare(query)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    if column_names.first().map(String::as_str) != Some("id") {
        return Err(SqliteError::FirstColumnNotId);
    }

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let id_value: rusqlite::types::Value = row.get(0)?;
        let id = match from_sql_value(id_value) {
            FieldValue::Text(s) => s,
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Real(r) => r.to_string(),
            FieldValue::Null | FieldValue::Blob(_) => {
                return Err(SqliteError::MissingRecordId)
            }
        };

        if cache.is_cached(tag, table, &id) {
            let mut record = SqlRecord::with_capacity(1);
            record.insert("id".to_string(), FieldValue::Text(id));
            records.push(record);
            continue;
        }

        cache.mark_cached(tag, table, &id);
        let mut record = SqlRecord::with_capacity(column_names.len());
        record.insert("id".to_string(), FieldValue::Text(id));
        for (i, name) in column_names.iter().enumerate().skip(1) {
            let value: rusqlite::types::Value = row.get(i)?;
            record.insert(name.clone(), from_sql_value(value));
        }
        records.push(record);
    }
    Ok(records)
}
