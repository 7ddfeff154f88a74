//! PostgreSQL row-to-JSON decoding.
//!
//! Type conversion uses a two-phase approach: `TypeCategory` classifies a
//! column's type name into a logical category, and a per-category decoder
//! extracts the value. Values that fail to decode become JSON null rather
//! than failing the whole result set.

use crate::models::ColumnMetadata;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Logical category for warehouse column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify a PostgreSQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("numeric") || lower.contains("decimal") {
        return TypeCategory::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower == "real" || lower.contains("double") {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower == "bytea" {
        return TypeCategory::Binary;
    }
    if lower == "timestamptz" {
        return TypeCategory::TimestampTz;
    }
    if lower == "timestamp" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" || lower == "timetz" {
        return TypeCategory::Time;
    }
    // varchar, text, char, name, uuid rendered as text, etc.
    TypeCategory::Unknown
}

/// Wrapper for raw NUMERIC values as strings, preserving the exact
/// database representation without a big-decimal dependency.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Decode binary data to JSON: UTF-8 text when valid, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

/// Convert a row to a JSON object keyed by column name.
pub fn row_to_json_map(row: &PgRow) -> serde_json::Map<String, JsonValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            (col.name().to_string(), decode_column(row, idx, category))
        })
        .collect()
}

/// Column metadata for a result row.
pub fn row_column_metadata(row: &PgRow) -> Vec<ColumnMetadata> {
    row.columns()
        .iter()
        .map(|col| ColumnMetadata {
            name: col.name().to_string(),
            type_name: col.type_info().name().to_string(),
            nullable: !col.type_info().is_null(),
        })
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::TimestampTz => decode_timestamptz(row, idx),
        TypeCategory::Timestamp => decode_timestamp(row, idx),
        TypeCategory::Date => decode_date(row, idx),
        TypeCategory::Time => decode_time(row, idx),
        TypeCategory::Unknown => decode_text(row, idx),
    }
}

fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!("Failed to decode NUMERIC: {:?}", e);
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Null;
    }
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    JsonValue::Null
}

fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| decode_binary_value(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<serde_json::Value>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

fn decode_timestamptz(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<DateTime<Utc>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_rfc3339()))
        .unwrap_or(JsonValue::Null)
}

fn decode_timestamp(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<NaiveDateTime>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn decode_date(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<NaiveDate>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn decode_time(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<NaiveTime>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<String>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::String)
        .unwrap_or(JsonValue::Null)
}
