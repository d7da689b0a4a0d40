//! Slice and table header structures.

/// Upper bound on the declared table count of a slice.
pub const MAX_DECLARED_TABLES: i64 = 10_000;

/// Column count bounds per table.
pub const MAX_COLUMNS: usize = 200;

/// Maximum byte length of table and column names.
pub const MAX_NAME_LENGTH: usize = 256;

/// The slice header that opens every slice stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    /// Server-assigned slice identifier.
    pub slice_id: String,
    /// Slice format/content version.
    pub version: i64,
    /// Server-assigned priority label.
    pub priority: String,
    /// Creation timestamp (server clock).
    pub timestamp: i64,
    /// Declared table count. Zero means "stream tables until end of frame"
    /// (legacy slices).
    pub number_of_tables: i64,
}

/// The header that opens each table within a slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableHeader {
    /// Target table name.
    pub table_name: String,
    /// Column names, in the order row fields are laid out.
    pub columns: Vec<String>,
}
