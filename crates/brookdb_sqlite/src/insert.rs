//! Batched multi-row inserts for slice imports.
//!
//! Rows land with `INSERT OR IGNORE` so re-importing a slice over existing
//! data is idempotent, and every row gets `_status = 'synced'` so the data
//! layer above treats imported records as already synchronized.

use brookdb_codec::FieldValue;
use rusqlite::{params_from_iter, Connection};

use crate::convert::to_sql_value;
use crate::error::SqliteResult;
use crate::ident::quote_identifier;

/// SQLite's default parameter cap is 999; one slot per row goes to the
/// literal `_status`, and the rest is left as margin.
const MAX_PARAMS_PER_STATEMENT: usize = 900;

/// Multi-row insert helper with prepared-statement reuse.
///
/// Full-size chunks share one cached statement per
/// `(table, column signature, chunk size)` triple; all three are encoded
/// in the SQL text, which is the cache key. The trailing partial chunk is
/// prepared ad hoc and finalized immediately.
pub struct InsertHelper;

impl InsertHelper {
    /// Rows that fit one statement for a table with `column_count` columns.
    pub fn max_rows_per_statement(column_count: usize) -> usize {
        if column_count == 0 {
            return 1;
        }
        (MAX_PARAMS_PER_STATEMENT / column_count).max(1)
    }

    /// Inserts `rows` into `table` in as few statements as possible.
    ///
    /// Rows shorter than `columns` are padded with NULL binds. Must run
    /// inside the caller's transaction; on error the caller rolls back.
    ///
    /// # Errors
    ///
    /// Propagates SQLite prepare/bind/step errors verbatim.
    pub fn insert_rows(
        conn: &Connection,
        table: &str,
        columns: &[String],
        rows: &[Vec<FieldValue>],
    ) -> SqliteResult<()> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(());
        }

        let max_rows = Self::max_rows_per_statement(columns.len());
        let mut offset = 0;
        while offset < rows.len() {
            let chunk = &rows[offset..(offset + max_rows).min(rows.len())];
            let sql = Self::build_sql(table, columns, chunk.len());

            let params = chunk.iter().flat_map(|row| {
                (0..columns.len()).map(move |i| {
                    row.get(i)
                        .map(to_sql_value)
                        .unwrap_or(rusqlite::types::Value::Null)
                })
            });

            if chunk.len() == max_rows {
                let mut stmt = conn.prepare_cached(&sql)?;
                stmt.execute(params_from_iter(params))?;
            } else {
                let mut stmt = conn.prepare(&sql)?;
                stmt.execute(params_from_iter(params))?;
            }
            offset += chunk.len();
        }
        Ok(())
    }

    /// Releases every cached insert statement. Called at transaction end
    /// and on rollback.
    pub fn finalize_statements(conn: &Connection) {
        conn.flush_prepared_statement_cache();
    }

    fn build_sql(table: &str, columns: &[String], rows_in_chunk: usize) -> String {
        let mut column_list = String::new();
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                column_list.push_str(", ");
            }
            column_list.push_str(&quote_identifier(column));
        }

        let mut row_clause = String::with_capacity(columns.len() * 3 + 12);
        row_clause.push('(');
        for i in 0..columns.len() {
            if i > 0 {
                row_clause.push_str(", ");
            }
            row_clause.push('?');
        }
        row_clause.push_str(", 'synced')");

        let mut values = String::with_capacity(rows_in_chunk * (row_clause.len() + 2));
        for i in 0..rows_in_chunk {
            if i > 0 {
                values.push_str(", ");
            }
            values.push_str(&row_clause);
        }

        format!(
            "INSERT OR IGNORE INTO {} ({}, \"_status\") VALUES {}",
            quote_identifier(table),
            column_list,
            values
        )
    }
}
