//! Shared fixture: a temporary SQLite database shaped like the therapeutics
//! table, with a schema catalogue.
//!
//! Contents:
//! - patients 1..=40: Sotrovimab, London, received 2022-01-03, started 2022-01-05
//! - patients 41..=60: Molnupiravir, North East, received and started 2022-01-10
//! - patients 61..=63: Remdesivir, hospitalised, received `ABC`, no start date
//! - patients 1..=12 also have a second Molnupiravir record on 2022-02-01
//!
//! 75 records in total, 72 of them non-hospitalised.

#![allow(dead_code)]

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, Executor};
use std::str::FromStr;

pub const TABLE: &str = "Therapeutics";

const LIVER_AND_CANCER: &str = "Patients with a solid cancer and Patients with a liver disease";
const LIVER: &str = "Patients with a liver disease";

fn sql_text(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| format!("'{}'", v.replace('\'', "''")))
}

#[allow(clippy::too_many_arguments)]
fn row(
    patient_id: u32,
    intervention: &str,
    region: &str,
    indication: &str,
    received: &str,
    started: Option<&str>,
    cohort: Option<&str>,
    age: Option<u32>,
) -> String {
    format!(
        "({}, '{}', '{}', '{}', '{}', {}, {}, {})",
        patient_id,
        intervention,
        region,
        indication,
        received,
        sql_text(started),
        sql_text(cohort),
        age.map_or_else(|| "NULL".to_string(), |a| a.to_string())
    )
}

fn therapeutics_rows() -> Vec<String> {
    let mut rows = Vec::new();
    for id in 1..=40 {
        rows.push(row(
            id,
            "Sotrovimab",
            "London",
            "non_hospitalised",
            "2022-01-03",
            Some("2022-01-05"),
            Some(LIVER_AND_CANCER),
            Some(50),
        ));
    }
    for id in 41..=60 {
        rows.push(row(
            id,
            "Molnupiravir",
            "North East",
            "non_hospitalised",
            "2022-01-10",
            Some("2022-01-10"),
            Some(LIVER),
            Some(60),
        ));
    }
    for id in 61..=63 {
        rows.push(row(
            id,
            "Remdesivir",
            "London",
            "hospitalised_with",
            "ABC",
            None,
            None,
            None,
        ));
    }
    for id in 1..=12 {
        rows.push(row(
            id,
            "Molnupiravir",
            "London",
            "non_hospitalised",
            "2022-02-01",
            Some("2022-02-01"),
            Some(LIVER_AND_CANCER),
            Some(50),
        ));
    }
    rows
}

/// Creates the fixture database and returns its directory guard and URL.
pub async fn therapeutics_db() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("therapeutics.db").display());

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
            Region TEXT,
            COVID_indication TEXT,
            Received DATE,
            TreatmentStartDate DATE,
            MOL1_high_risk_cohort TEXT,
            AgeAtReceivedDate INTEGER
        )",
    )
    .await
    .unwrap();

    let insert = format!(
        "INSERT INTO Therapeutics VALUES {}",
        therapeutics_rows().join(", ")
    );
    conn.execute(insert.as_str()).await.unwrap();

    conn.execute(
        "CREATE TABLE OpenSAFELYSchemaInformation (
            TableName TEXT,
            ColumnName TEXT,
            ColumnType TEXT,
            MaxLength INTEGER,
            IsNullable INTEGER
        )",
    )
    .await
    .unwrap();
    conn.execute(
        "INSERT INTO OpenSAFELYSchemaInformation VALUES
            ('Therapeutics', 'Intervention', 'varchar', 100, 1),
            ('Therapeutics', 'Region', 'varchar', 100, 1),
            ('Therapeutics', 'TreatmentStartDate', 'date', 3, 1),
            ('Patient', 'DateOfBirth', 'date', 3, 1)",
    )
    .await
    .unwrap();

    conn.close().await.unwrap();
    (dir, url)
}
