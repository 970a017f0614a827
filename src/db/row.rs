//! Row decoding into JSON.
//!
//! Column types are classified into a few logical categories first; the
//! backend-specific decoding is generated by `impl_row_to_json!`.

use crate::models::{DatabaseType, JsonRow};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Boolean,
    Binary,
    /// Text and everything without a dedicated decoder.
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // SQLite's NUMERIC affinity holds floats; elsewhere keep exact decimals as text
    if lower.contains("decimal") || lower.contains("numeric") {
        return if db == DatabaseType::SQLite {
            TypeCategory::Float
        } else {
            TypeCategory::Text
        };
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

/// Binary values are returned base64 encoded.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// NaN and infinities have no JSON number representation.
pub fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, [i64, i32, i16, i8, u64]);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, [i64, i32, i16]);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, [i64]);
