//! Transactional sync payload application.
//!
//! A pull response body is a JSON array of per-row entries. Applying a
//! batch is all-or-nothing: every upsert and delete lands inside one
//! `BEGIN IMMEDIATE` transaction together with the sequence-id watermark,
//! or the database is left untouched.

use brookdb_sqlite::{quote_identifier, table_columns};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ApplyError, ApplyResult};

/// Key in `local_storage` holding the highest applied sequence id.
pub const LAST_SEQUENCE_KEY: &str = "__watermelon_last_sequence_id";

/// Delete statements bind at most this many ids at once.
const DELETE_CHUNK: usize = 900;

/// Keys that describe the entry rather than the row, stripped when the
/// entry object itself doubles as the row payload.
const RESERVED_KEYS: [&str; 11] = [
    "table",
    "tableName",
    "deleted",
    "isDeleted",
    "is_deleted",
    "type",
    "op",
    "operation",
    "sequenceId",
    "sequence_id",
    "sequence",
];

/// Applies a sync payload to the database.
///
/// Must be called on the database work-queue thread. On any error the
/// transaction is rolled back and the database state is unchanged.
///
/// # Errors
///
/// Fails on malformed payloads, schema mismatches (unknown columns after
/// one forced reload, missing `id`), and database errors.
pub fn apply_sync_payload(conn: &Connection, payload: &str) -> ApplyResult<()> {
    let root: Value = serde_json::from_str(payload).map_err(|e| ApplyError::Parse {
        message: e.to_string(),
    })?;
    let Value::Array(entries) = root else {
        return Err(ApplyError::InvalidRoot);
    };

    conn.execute_batch("BEGIN IMMEDIATE")?;
    match apply_entries(conn, &entries).and_then(|()| Ok(conn.execute_batch("COMMIT")?)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn apply_entries(conn: &Connection, entries: &[Value]) -> ApplyResult<()> {
    let mut deletes_by_table: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut max_sequence_id = String::new();

    for entry in entries {
        let Value::Object(obj) = entry else {
            continue;
        };

        let table = string_field(obj, "table")
            .or_else(|| string_field(obj, "tableName"))
            .ok_or(ApplyError::MissingTable)?;

        let is_deleted = extract_delete_flag(obj);

        if let Some(sequence_id) = extract_sequence_id(obj) {
            if !sequence_id.is_empty() && sequence_id > max_sequence_id {
                max_sequence_id = sequence_id;
            }
        }

        if is_deleted {
            let id = extract_delete_id(obj).ok_or(ApplyError::MissingDeleteId)?;
            deletes_by_table.entry(table).or_default().push(id);
        } else {
            let row = match explicit_row_payload(obj) {
                Some(Value::Object(map)) => map.clone(),
                Some(_) => return Err(ApplyError::InvalidRowPayload),
                None => strip_reserved(obj),
            };
            apply_row_object(conn, &table, &row)?;
        }
    }

    for (table, ids) in &deletes_by_table {
        apply_deletes(conn, table, ids)?;
    }

    if !max_sequence_id.is_empty() {
        // The host reads this key to derive the next pull's sequenceId
        // query parameter.
        set_local_storage(conn, LAST_SEQUENCE_KEY, &max_sequence_id)?;
    }
    Ok(())
}

fn apply_row_object(
    conn: &Connection,
    table: &str,
    row: &Map<String, Value>,
) -> ApplyResult<()> {
    if row.is_empty() {
        return Err(ApplyError::NoMatchingColumns {
            table: table.to_string(),
        });
    }

    let mut columns = table_columns(conn, table, false)?;
    if row.keys().any(|key| !columns.contains(key)) {
        // The cache may be stale against a schema change; one reload.
        columns = table_columns(conn, table, true)?;
        if let Some(unknown) = row.keys().find(|key| !columns.contains(*key)) {
            return Err(ApplyError::UnknownColumn {
                table: table.to_string(),
                column: unknown.clone(),
            });
        }
    }

    if !columns.contains("id") {
        return Err(ApplyError::MissingIdColumn {
            table: table.to_string(),
        });
    }
    if !row.contains_key("id") {
        return Err(ApplyError::RowMissingId {
            table: table.to_string(),
        });
    }

    let mut keys: Vec<&String> = row.keys().collect();
    keys.sort();

    let mut column_list = String::new();
    let mut placeholders = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            column_list.push(',');
            placeholders.push(',');
        }
        column_list.push_str(&quote_identifier(key));
        placeholders.push('?');
    }
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        column_list,
        placeholders
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let params = keys.iter().map(|key| json_to_sql(&row[key.as_str()]));
    stmt.execute(params_from_iter(params))?;
    Ok(())
}

fn apply_deletes(conn: &Connection, table: &str, ids: &[Value]) -> ApplyResult<()> {
    debug!(table, count = ids.len(), "applying tombstones");
    for chunk in ids.chunks(DELETE_CHUNK) {
        let mut placeholders = String::with_capacity(chunk.len() * 2);
        for i in 0..chunk.len() {
            if i > 0 {
                placeholders.push(',');
            }
            placeholders.push('?');
        }
        let sql = format!(
            "DELETE FROM {} WHERE id IN ({})",
            quote_identifier(table),
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        stmt.execute(params_from_iter(chunk.iter().map(json_to_sql)))?;
    }
    Ok(())
}

fn set_local_storage(conn: &Connection, key: &str, value: &str) -> ApplyResult<()> {
    let mut stmt =
        conn.prepare_cached("INSERT OR REPLACE INTO local_storage (key, value) VALUES (?, ?)")?;
    stmt.execute([key, value])?;
    Ok(())
}

/// JSON → SQL value mapping: null → NULL, bool → 0/1, integral numbers →
/// int64, other numbers → double, strings → text, arrays and objects →
/// their JSON text.
fn json_to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(serde_json::to_string(other).unwrap_or_default()),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn string_or_number_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn explicit_row_payload(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("row").or_else(|| obj.get("record")).or_else(|| obj.get("data"))
}

fn extract_delete_flag(obj: &Map<String, Value>) -> bool {
    for key in ["deleted", "isDeleted", "is_deleted"] {
        if let Some(flag) = bool_field(obj, key) {
            return flag;
        }
    }
    for key in ["type", "op", "operation"] {
        if let Some(kind) = string_field(obj, key) {
            match kind.as_str() {
                "delete" | "deleted" => return true,
                "upsert" | "insert" | "update" => return false,
                _ => {}
            }
        }
    }
    false
}

fn extract_sequence_id(obj: &Map<String, Value>) -> Option<String> {
    for key in ["sequenceId", "sequence_id", "sequence"] {
        if let Some(value) = string_or_number_field(obj, key) {
            return Some(value);
        }
    }
    if let Some(Value::Object(row)) = explicit_row_payload(obj) {
        for key in ["sequenceId", "sequence_id", "sequence"] {
            if let Some(value) = string_or_number_field(row, key) {
                return Some(value);
            }
        }
    }
    None
}

fn extract_delete_id(obj: &Map<String, Value>) -> Option<Value> {
    if let Some(Value::Object(row)) = explicit_row_payload(obj) {
        if let Some(id) = row.get("id") {
            return Some(id.clone());
        }
    }
    obj.get("id").cloned()
}

fn strip_reserved(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
