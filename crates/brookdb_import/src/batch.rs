//! Batch accumulator for parsed rows.

use brookdb_codec::FieldValue;
use std::collections::HashMap;

/// Rows staged for one table, aligned with its declared column order.
#[derive(Debug, Default, Clone)]
pub struct TableRows {
    /// Column names from the table header.
    pub columns: Vec<String>,
    /// Parsed rows; each row's values align with `columns`.
    pub rows: Vec<Vec<FieldValue>>,
}

/// Rows accumulated between flushes, keyed by table name.
#[derive(Debug, Default)]
pub struct RowBatch {
    tables: HashMap<String, TableRows>,
    total_rows: usize,
}

impl RowBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages one row for `table`. The first row for a table fixes its
    /// column signature.
    pub fn add_row(&mut self, table: &str, columns: &[String], row: Vec<FieldValue>) {
        let entry = self.tables.entry(table.to_string()).or_insert_with(|| TableRows {
            columns: columns.to_vec(),
            rows: Vec::new(),
        });
        entry.rows.push(row);
        self.total_rows += 1;
    }

    /// Total rows staged across all tables.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    /// Drops all staged rows.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.total_rows = 0;
    }

    /// Tables in sorted name order, for deterministic flushes.
    pub fn tables_sorted(&self) -> Vec<(&str, &TableRows)> {
        let mut entries: Vec<(&str, &TableRows)> = self
            .tables
            .iter()
            .map(|(name, rows)| (name.as_str(), rows))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accumulates_and_counts_across_tables() {
        let mut batch = RowBatch::new();
        assert!(batch.is_empty());

        batch.add_row("b_table", &cols(&["id"]), vec![FieldValue::Int(1)]);
        batch.add_row("a_table", &cols(&["id"]), vec![FieldValue::Int(2)]);
        batch.add_row("b_table", &cols(&["id"]), vec![FieldValue::Int(3)]);

        assert_eq!(batch.total_rows(), 3);
        let sorted = batch.tables_sorted();
        assert_eq!(sorted[0].0, "a_table");
        assert_eq!(sorted[1].0, "b_table");
        assert_eq!(sorted[1].1.rows.len(), 2);
    }

    #[test]
    fn clear_resets_everything() {
        let mut batch = RowBatch::new();
        batch.add_row("t", &cols(&["id"]), vec![FieldValue::Null]);
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.total_rows(), 0);
        assert!(batch.tables_sorted().is_empty());
    }
}
