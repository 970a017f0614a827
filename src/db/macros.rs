//! Database dispatch macros for reducing code duplication.
//!
//! The per-backend enums (`DbPool`, `EngineConnection`) wrap one sqlx type per
//! dialect. These macros expand a single body once per variant so the body is
//! type-checked against each concrete backend.

/// Run `$body` against whichever backend variant `$value` holds.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool, &self.pool, pool => pool.close().await)
/// ```
macro_rules! impl_db_dispatch {
    ($enum:ident, $value:expr, $p:ident => $body:expr) => {
        match $value {
            $crate::db::$enum::MySql($p) => $body,
            $crate::db::$enum::Postgres($p) => $body,
            $crate::db::$enum::SQLite($p) => $body,
        }
    };
}

/// Implement `RowToJson` for a backend row type.
///
/// `[$int, ...]` lists the integer types tried in order for integer columns;
/// backends differ in which widths and signedness they can decode.
macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, [$($int:ty),+ $(,)?]) => {
        impl $crate::db::row::RowToJson for $row {
            fn to_json_map(&self) -> $crate::models::JsonRow {
                use $crate::db::row::{TypeCategory, categorize_type, encode_binary, float_value};
                use serde_json::Value as JsonValue;
                use sqlx::{Column, Row, TypeInfo, ValueRef};

                let mut map = $crate::models::JsonRow::new();
                for (idx, column) in self.columns().iter().enumerate() {
                    let category = match self.try_get_raw(idx) {
                        Ok(raw) if !raw.is_null() => {
                            Some(categorize_type(raw.type_info().name(), $db))
                        }
                        _ => None,
                    };

                    let value = match category {
                        None => None,
                        Some(TypeCategory::Integer) => None::<JsonValue>
                            $(.or_else(|| self.try_get::<$int, _>(idx).ok().map(JsonValue::from)))+,
                        Some(TypeCategory::Float) => self
                            .try_get::<f64, _>(idx)
                            .ok()
                            .or_else(|| self.try_get::<f32, _>(idx).ok().map(f64::from))
                            .map(float_value),
                        Some(TypeCategory::Boolean) => {
                            self.try_get::<bool, _>(idx).ok().map(JsonValue::Bool)
                        }
                        Some(TypeCategory::Binary) => self
                            .try_get::<Vec<u8>, _>(idx)
                            .ok()
                            .map(|bytes| encode_binary(&bytes)),
                        Some(TypeCategory::Text) => self
                            .try_get::<String, _>(idx)
                            .ok()
                            .map(JsonValue::String)
                            .or_else(|| self.try_get::<i64, _>(idx).ok().map(JsonValue::from))
                            .or_else(|| self.try_get::<f64, _>(idx).ok().map(float_value)),
                    };

                    map.insert(column.name().to_string(), value.unwrap_or(JsonValue::Null));
                }
                map
            }
        }
    };
}

/// Build a query for `$statement` with all of its parameters bound.
///
/// Expands per backend at the call site, since each sqlx backend has its own
/// argument buffer type.
macro_rules! bind_statement {
    ($db:ty, $statement:expr) => {{
        let statement: &$crate::models::Statement = $statement;
        let mut query = sqlx::query::<$db>(&statement.sql);
        for param in &statement.params {
            query = match param {
                $crate::models::QueryParam::Null => query.bind(None::<String>),
                $crate::models::QueryParam::Bool(v) => query.bind(*v),
                $crate::models::QueryParam::Int(v) => query.bind(*v),
                $crate::models::QueryParam::Float(v) => query.bind(*v),
                $crate::models::QueryParam::String(v) => query.bind(v.as_str()),
                $crate::models::QueryParam::Bytes(v) => query.bind(v.as_slice()),
            };
        }
        query
    }};
}
