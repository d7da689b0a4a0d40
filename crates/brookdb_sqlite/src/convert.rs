//! Conversions between `FieldValue` and rusqlite's dynamic value type.

use brookdb_codec::FieldValue;
use rusqlite::types::Value;

/// Converts a field value into a bindable SQLite value.
pub fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Int(i) => Value::Integer(*i),
        FieldValue::Real(r) => Value::Real(*r),
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Blob(b) => Value::Blob(b.clone()),
    }
}

/// Converts a SQLite column value back into a field value.
pub fn from_sql_value(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Integer(i) => FieldValue::Int(i),
        Value::Real(r) => FieldValue::Real(r),
        Value::Text(s) => FieldValue::Text(s),
        Value::Blob(b) => FieldValue::Blob(b),
    }
}
