//! Unit tests for the SQLite data source.
//!
//! These tests verify:
//! - Declared type classification
//! - Per-query connections against a temporary database file
//! - Decoding of storage classes into `Value`
//! - Read-only enforcement

use super::{DeclaredType, SqliteSource, classify_declared_type};
use crate::adapters::{DataSource, SourceConfig, SourceType, create_data_source};
use crate::error::SdcError;
use crate::models::Value;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, Executor};
use std::str::FromStr;

async fn fixture() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.db");
    let url = format!("sqlite://{}", path.display());

    let mut conn = SqliteConnectOptions::from_str(&url)
        .unwrap()
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    conn.execute(
        "CREATE TABLE Therapeutics (
            patient_id INTEGER,
            Intervention TEXT,
            Received DATE,
            Score REAL,
            Flag BOOLEAN
        )",
    )
    .await
    .unwrap();
    conn.execute(
        "INSERT INTO Therapeutics VALUES
            (1, 'Sotrovimab', '2022-01-03', 1.5, 1),
            (2, NULL, 'not a date', NULL, 0)",
    )
    .await
    .unwrap();
    conn.close().await.unwrap();

    (dir, url)
}

// =============================================================================
// Type Classification Tests
// =============================================================================

#[test]
fn test_classify_declared_types() {
    assert_eq!(classify_declared_type("BOOLEAN"), DeclaredType::Boolean);
    assert_eq!(classify_declared_type("date"), DeclaredType::Date);
    assert_eq!(classify_declared_type("DATETIME"), DeclaredType::Timestamp);
    assert_eq!(classify_declared_type("TIMESTAMP"), DeclaredType::Timestamp);
    assert_eq!(classify_declared_type("INTEGER"), DeclaredType::Other);
    assert_eq!(classify_declared_type(""), DeclaredType::Other);
}

// =============================================================================
// Query Tests
// =============================================================================

#[tokio::test]
async fn test_sqlite_fetch_decodes_values() {
    let (_dir, url) = fixture().await;
    let source = SqliteSource::new(SourceConfig::new(url)).unwrap();

    let result = source
        .fetch("SELECT patient_id, Intervention, Score FROM Therapeutics ORDER BY patient_id")
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["patient_id", "Intervention", "Score"]);
    assert_eq!(result.len(), 2);
    assert_eq!(result.value(0, 0), &Value::Int(1));
    assert_eq!(result.value(0, 1), &Value::from("Sotrovimab"));
    assert_eq!(result.value(0, 2), &Value::Float(1.5));
    assert!(result.value(1, 1).is_null());
    assert!(result.value(1, 2).is_null());
}

#[tokio::test]
async fn test_sqlite_date_text_fallback() {
    let (_dir, url) = fixture().await;
    let source = SqliteSource::new(SourceConfig::new(url)).unwrap();

    let result = source
        .fetch("SELECT Received FROM Therapeutics ORDER BY patient_id")
        .await
        .unwrap();

    let first = result.value(0, 0);
    assert!(
        first == &Value::Date(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap())
            || first == &Value::from("2022-01-03")
    );
    assert_eq!(result.value(1, 0), &Value::from("not a date"));
}

#[tokio::test]
async fn test_sqlite_blob_values_are_never_null() {
    let (_dir, url) = fixture().await;
    let source = SqliteSource::new(SourceConfig::new(url)).unwrap();

    let result = source
        .fetch("SELECT CAST('Molnupiravir' AS BLOB) AS Intervention")
        .await
        .unwrap();
    assert_eq!(result.value(0, 0), &Value::from("Molnupiravir"));

    let err = source
        .fetch("SELECT X'FFFE' AS Payload")
        .await
        .unwrap_err();
    assert!(matches!(err, SdcError::Decode { .. }));
    assert!(err.to_string().contains("Payload"));
}

#[tokio::test]
async fn test_sqlite_empty_result_keeps_columns() {
    let (_dir, url) = fixture().await;
    let source = SqliteSource::new(SourceConfig::new(url)).unwrap();

    let result = source
        .fetch("SELECT Intervention, COUNT(*) AS row_count FROM Therapeutics WHERE 1 = 0 GROUP BY Intervention")
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.columns, vec!["Intervention", "row_count"]);
}

#[tokio::test]
async fn test_sqlite_malformed_query_is_query_error() {
    let (_dir, url) = fixture().await;
    let source = SqliteSource::new(SourceConfig::new(url)).unwrap();

    let err = source.fetch("SELECT nope FROM Missing").await.unwrap_err();
    assert!(matches!(err, SdcError::QueryExecution { .. }));

    // the failed query released its connection; the next one runs normally
    assert!(source.test_connection().await.is_ok());
}

#[tokio::test]
async fn test_sqlite_read_only_rejects_writes() {
    let (_dir, url) = fixture().await;
    let source = SqliteSource::new(SourceConfig::new(url)).unwrap();

    let result = source.fetch("DELETE FROM Therapeutics").await;
    assert!(result.is_err());

    let remaining = source
        .fetch("SELECT COUNT(*) AS n FROM Therapeutics")
        .await
        .unwrap();
    assert_eq!(remaining.value(0, 0), &Value::Int(2));
}

#[tokio::test]
async fn test_sqlite_missing_file_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("absent.db").display());
    let source = SqliteSource::new(SourceConfig::new(url)).unwrap();

    let err = source.test_connection().await.unwrap_err();
    assert!(matches!(err, SdcError::Connection { .. }));
}

#[tokio::test]
async fn test_factory_creates_sqlite_source() {
    let (_dir, url) = fixture().await;
    let source = create_data_source(&url).unwrap();

    assert_eq!(source.source_type(), SourceType::Sqlite);
    assert!(source.test_connection().await.is_ok());
}
