//! PostgreSQL cell decoding into [`Value`].
//!
//! Columns are decoded by their wire type name. Exact numerics become
//! floats, identifiers and documents become text, and any other type is a
//! decode error so that a value is never silently dropped.

use crate::Result;
use crate::error::SdcError;
use crate::models::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Broad decoding strategy for a PostgreSQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgValueKind {
    /// BOOL
    Bool,
    /// INT2
    SmallInt,
    /// INT4
    Int,
    /// INT8
    BigInt,
    /// FLOAT4
    Real,
    /// FLOAT8
    Double,
    /// NUMERIC (read as a float)
    Numeric,
    /// TEXT, VARCHAR, BPCHAR, NAME
    Text,
    /// DATE
    Date,
    /// TIMESTAMP
    Timestamp,
    /// TIMESTAMPTZ (normalized to UTC)
    TimestampTz,
    /// TIME (read as `HH:MM:SS` text)
    Time,
    /// UUID (read as text)
    Uuid,
    /// JSON, JSONB (read as serialized text)
    Json,
    /// Anything else
    Unsupported,
}

/// Maps a PostgreSQL type name (as reported by the driver) to a decoding
/// strategy.
pub fn map_postgres_type(type_name: &str) -> PgValueKind {
    match type_name.to_uppercase().as_str() {
        "BOOL" => PgValueKind::Bool,
        "INT2" => PgValueKind::SmallInt,
        "INT4" => PgValueKind::Int,
        "INT8" => PgValueKind::BigInt,
        "FLOAT4" => PgValueKind::Real,
        "FLOAT8" => PgValueKind::Double,
        "NUMERIC" => PgValueKind::Numeric,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => PgValueKind::Text,
        "DATE" => PgValueKind::Date,
        "TIMESTAMP" => PgValueKind::Timestamp,
        "TIMESTAMPTZ" => PgValueKind::TimestampTz,
        "TIME" => PgValueKind::Time,
        "UUID" => PgValueKind::Uuid,
        "JSON" | "JSONB" => PgValueKind::Json,
        _ => PgValueKind::Unsupported,
    }
}

/// Decodes one cell of a PostgreSQL row.
///
/// # Errors
/// Returns a decode error if the driver cannot read the cell or the column
/// type is not supported.
pub fn decode_value(row: &PgRow, index: usize) -> Result<Value> {
    let column = row.column(index);
    let name = column.name();
    let type_name = column.type_info().name();

    let raw = row
        .try_get_raw(index)
        .map_err(|e| SdcError::decode_column(name, e))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let decode_err = |e: sqlx::Error| SdcError::decode_column(name, e);

    let value = match map_postgres_type(type_name) {
        PgValueKind::Bool => Value::Bool(row.try_get::<bool, _>(index).map_err(decode_err)?),
        PgValueKind::SmallInt => {
            Value::Int(i64::from(row.try_get::<i16, _>(index).map_err(decode_err)?))
        }
        PgValueKind::Int => Value::Int(i64::from(row.try_get::<i32, _>(index).map_err(decode_err)?)),
        PgValueKind::BigInt => Value::Int(row.try_get::<i64, _>(index).map_err(decode_err)?),
        PgValueKind::Real => {
            Value::Float(f64::from(row.try_get::<f32, _>(index).map_err(decode_err)?))
        }
        PgValueKind::Double => Value::Float(row.try_get::<f64, _>(index).map_err(decode_err)?),
        PgValueKind::Numeric => {
            let decimal = row.try_get::<BigDecimal, _>(index).map_err(decode_err)?;
            Value::Float(
                decimal
                    .to_string()
                    .parse::<f64>()
                    .map_err(|e| SdcError::decode_column(name, e))?,
            )
        }
        PgValueKind::Text => Value::Text(row.try_get::<String, _>(index).map_err(decode_err)?),
        PgValueKind::Date => Value::Date(row.try_get::<NaiveDate, _>(index).map_err(decode_err)?),
        PgValueKind::Timestamp => {
            Value::DateTime(row.try_get::<NaiveDateTime, _>(index).map_err(decode_err)?)
        }
        PgValueKind::TimestampTz => Value::DateTime(
            row.try_get::<DateTime<Utc>, _>(index)
                .map_err(decode_err)?
                .naive_utc(),
        ),
        PgValueKind::Time => Value::Text(
            row.try_get::<NaiveTime, _>(index)
                .map_err(decode_err)?
                .format("%H:%M:%S")
                .to_string(),
        ),
        PgValueKind::Uuid => Value::Text(
            row.try_get::<Uuid, _>(index)
                .map_err(decode_err)?
                .to_string(),
        ),
        PgValueKind::Json => Value::Text(
            row.try_get::<serde_json::Value, _>(index)
                .map_err(decode_err)?
                .to_string(),
        ),
        PgValueKind::Unsupported => {
            return Err(SdcError::unsupported_column_type(name, type_name));
        }
    };

    Ok(value)
}
