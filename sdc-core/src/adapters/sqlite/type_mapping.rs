//! SQLite cell decoding into [`Value`].
//!
//! SQLite stores every cell in one of five storage classes regardless of
//! the declared column type. The declared type is only used to recognise
//! dates, timestamps and booleans kept as text or integers.
//!
//! # Declared Type Rules
//! 1. Contains "BOOL" -> boolean
//! 2. Contains "DATETIME" or "TIMESTAMP" -> timestamp
//! 3. Contains "DATE" -> date
//! 4. Anything else -> decoded by storage class

use crate::Result;
use crate::error::SdcError;
use crate::models::Value;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// What a declared column type tells us beyond the storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    /// BOOLEAN-like declarations
    Boolean,
    /// DATE declarations
    Date,
    /// DATETIME / TIMESTAMP declarations
    Timestamp,
    /// Decode by storage class only
    Other,
}

/// Classifies a declared SQLite type name (case-insensitive).
///
/// # Example
/// ```rust
/// use sdc_core::adapters::sqlite::{classify_declared_type, DeclaredType};
///
/// assert_eq!(classify_declared_type("datetime"), DeclaredType::Timestamp);
/// assert_eq!(classify_declared_type("VARCHAR(100)"), DeclaredType::Other);
/// ```
pub fn classify_declared_type(declared: &str) -> DeclaredType {
    let upper = declared.trim().to_uppercase();

    if upper.contains("BOOL") {
        DeclaredType::Boolean
    } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        DeclaredType::Timestamp
    } else if upper.contains("DATE") {
        DeclaredType::Date
    } else {
        DeclaredType::Other
    }
}

/// Decodes one cell of a SQLite row.
///
/// Dates stored as text that do not parse are kept as text. BLOBs are read
/// as text when they hold UTF-8.
///
/// # Errors
/// Returns a decode error if the driver cannot read the cell, a BLOB is not
/// UTF-8, or the storage class is unknown.
pub fn decode_value(row: &SqliteRow, index: usize) -> Result<Value> {
    let column = row.column(index);
    let name = column.name();
    let declared = classify_declared_type(column.type_info().name());

    let raw = row
        .try_get_raw(index)
        .map_err(|e| SdcError::decode_column(name, e))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match (declared, storage.as_str()) {
        (DeclaredType::Boolean, "INTEGER") => Value::Bool(
            row.try_get_unchecked::<bool, _>(index)
                .map_err(|e| SdcError::decode_column(name, e))?,
        ),
        (DeclaredType::Date, "TEXT") => match row.try_get_unchecked::<NaiveDate, _>(index) {
            Ok(date) => Value::Date(date),
            Err(_) => Value::Text(text(row, index, name)?),
        },
        (DeclaredType::Timestamp, "TEXT") => {
            match row.try_get_unchecked::<NaiveDateTime, _>(index) {
                Ok(timestamp) => Value::DateTime(timestamp),
                Err(_) => Value::Text(text(row, index, name)?),
            }
        }
        (_, "INTEGER") => Value::Int(
            row.try_get_unchecked::<i64, _>(index)
                .map_err(|e| SdcError::decode_column(name, e))?,
        ),
        (_, "REAL") => Value::Float(
            row.try_get_unchecked::<f64, _>(index)
                .map_err(|e| SdcError::decode_column(name, e))?,
        ),
        (_, "TEXT") => Value::Text(text(row, index, name)?),
        (_, "BLOB") => {
            let bytes = row
                .try_get_unchecked::<Vec<u8>, _>(index)
                .map_err(|e| SdcError::decode_column(name, e))?;
            Value::Text(String::from_utf8(bytes).map_err(|e| SdcError::decode_column(name, e))?)
        }
        (_, other) => return Err(SdcError::unsupported_column_type(name, other)),
    };

    Ok(value)
}

fn text(row: &SqliteRow, index: usize, name: &str) -> Result<String> {
    row.try_get_unchecked::<String, _>(index)
        .map_err(|e| SdcError::decode_column(name, e))
}
