//! Summary functions against a temporary SQLite database.
//!
//! This test suite covers:
//! - Grouped queries and query errors
//! - Distinct values (listing and frequency of counts)
//! - Pairwise comparison of date columns
//! - Patients with multiple records
//! - Problem dates, distinct strings and substring counts
//! - Schema summaries, including the sampled fallback

#![cfg(feature = "sqlite")]

mod common;

use sdc_core::{
    DataSource, Result, SdcError, SourceConfig, Tabular, Value, create_data_source,
    create_data_source_with_config,
    disclosure::SmallCount,
    query::simple_sql,
    summary::{
        ComparisonOutcome, DateProblem, DistinctSummary, DistinctValuesOptions, FrequencyRow,
        ProblemDatesOptions, SchemaFilter, SchemaSummaryOptions, StringSplitOptions,
        compare_two_values, count_substrings, distinct_values, identify_distinct_strings,
        multiple_records, problem_dates, schema_summary,
    },
};

async fn source() -> (tempfile::TempDir, Box<dyn DataSource>) {
    let (dir, url) = common::therapeutics_db().await;
    let source = create_data_source(&url).unwrap();
    (dir, source)
}

// =============================================================================
// Query Layer
// =============================================================================

#[tokio::test]
async fn test_simple_sql_counts_records() -> Result<()> {
    let (_dir, source) = source().await;

    let aggregate = simple_sql(
        source.as_ref(),
        common::TABLE,
        &["Intervention"],
        Some("COVID_indication='non_hospitalised'"),
    )
    .await?;

    assert_eq!(aggregate.columns, vec!["Intervention".to_string()]);
    assert_eq!(aggregate.total(), 72);
    Ok(())
}

#[tokio::test]
async fn test_bad_predicate_is_query_error() {
    let (_dir, source) = source().await;

    let err = simple_sql(
        source.as_ref(),
        common::TABLE,
        &["Intervention"],
        Some("NoSuchColumn = 1"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SdcError::QueryExecution { .. }));
}

// =============================================================================
// Distinct Values
// =============================================================================

#[tokio::test]
async fn test_distinct_values_listing() -> Result<()> {
    let (_dir, source) = source().await;
    let options = DistinctValuesOptions::default().with_threshold(10);

    let reports = distinct_values(
        source.as_ref(),
        common::TABLE,
        &["Intervention"],
        None,
        &options,
    )
    .await?;

    let report = &reports[0];
    assert_eq!(report.missing.value(), Some(0));
    assert_eq!(
        report.summary,
        DistinctSummary::Listing {
            values: vec![Value::from("Sotrovimab"), Value::from("Molnupiravir")],
            counts: Some(vec![40, 30]),
            suppressed_values: 1,
        }
    );
    assert_eq!(
        report.export_file_name(),
        "distinct_values_Therapeutics_Intervention_.csv"
    );
    Ok(())
}

#[tokio::test]
async fn test_distinct_patient_ids_fall_back_to_frequencies() -> Result<()> {
    let (_dir, source) = source().await;
    let options = DistinctValuesOptions::default().with_threshold(50);

    let reports = distinct_values(
        source.as_ref(),
        common::TABLE,
        &["patient_id"],
        None,
        &options,
    )
    .await?;

    assert_eq!(
        reports[0].summary,
        DistinctSummary::FrequencyOfCounts {
            rows: vec![
                FrequencyRow {
                    records_per_value: 1,
                    frequency: 50,
                },
                FrequencyRow {
                    records_per_value: 2,
                    frequency: 10,
                },
            ],
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_distinct_values_respect_filter() -> Result<()> {
    let (_dir, source) = source().await;
    let options = DistinctValuesOptions::default()
        .with_threshold(10)
        .with_sort_by_value(true);

    let reports = distinct_values(
        source.as_ref(),
        common::TABLE,
        &["Received"],
        Some("CAST(Received AS DATE) >'2023-06-28'"),
        &options,
    )
    .await?;

    assert_eq!(reports[0].summary, DistinctSummary::NoValues);
    Ok(())
}

// =============================================================================
// Comparison
// =============================================================================

#[tokio::test]
async fn test_compare_received_with_start_date() -> Result<()> {
    let (_dir, source) = source().await;

    let report = compare_two_values(
        source.as_ref(),
        &[common::TABLE],
        &["Received", "TreatmentStartDate"],
        None,
        None,
    )
    .await?;

    let outcomes: Vec<ComparisonOutcome> = report.rows.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            ComparisonOutcome::LessThan,
            ComparisonOutcome::Equal,
            ComparisonOutcome::RightMissing,
        ]
    );

    let less = &report.rows[0];
    assert_eq!(less.label, "Received < TreatmentStartDate");
    assert_eq!(less.median_difference, Some(2.0));
    assert_eq!(less.row_count.value(), Some(40));
    assert_eq!(less.percentage, Some(57.1));

    let equal = &report.rows[1];
    assert_eq!(equal.row_count.value(), Some(30));
    assert_eq!(equal.percentage, Some(42.9));

    let missing = &report.rows[2];
    assert_eq!(missing.label, "TreatmentStartDate is missing");
    assert_eq!(missing.row_count.to_string(), "<=7");
    assert_eq!(missing.percentage, Some(0.0));

    assert_eq!(report.headers()[1], "median difference (days)");
    Ok(())
}

#[tokio::test]
async fn test_compare_two_tables_requires_join_key() {
    let (_dir, source) = source().await;

    let err = compare_two_values(
        source.as_ref(),
        &[common::TABLE, "Patient"],
        &["Received", "DateOfBirth"],
        None,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SdcError::Configuration { .. }));
    assert!(err.to_string().to_lowercase().contains("must supply join key"));
}

#[tokio::test]
async fn test_compare_incompatible_columns() {
    let (_dir, source) = source().await;

    let err = compare_two_values(
        source.as_ref(),
        &[common::TABLE],
        &["AgeAtReceivedDate", "Received"],
        None,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SdcError::TypeIncompatible { .. }));
}

// =============================================================================
// Multiple Records
// =============================================================================

#[tokio::test]
async fn test_multiple_records() -> Result<()> {
    let (_dir, source) = source().await;

    let report = multiple_records(
        source.as_ref(),
        common::TABLE,
        &["Intervention", "Received", "Region"],
        &[("Intervention", "Received")],
        "patient_id",
        None,
    )
    .await?;

    let labels: Vec<&str> = report.rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "patient_ids_with_multiple_records",
            "Intervention",
            "Received",
            "Intervention_AND_Received",
        ]
    );
    assert!(report.rows.iter().all(|r| r.count.value() == Some(10)));
    assert_eq!(
        report.suppressed_fields,
        vec!["Region".to_string(), "none_of_these".to_string()]
    );
    Ok(())
}

// =============================================================================
// Problem Dates and Free Text
// =============================================================================

#[tokio::test]
async fn test_problem_dates() -> Result<()> {
    let (_dir, source) = source().await;

    let report = problem_dates(
        source.as_ref(),
        common::TABLE,
        &["Received", "TreatmentStartDate"],
        None,
        &ProblemDatesOptions::default(),
    )
    .await?;

    assert_eq!(report.values.len(), 1);
    assert_eq!(report.values[0].problem, DateProblem::LargelyNonNumeric);
    assert_eq!(report.values[0].value, "ABC");
    assert_eq!(report.values[0].row_count.to_string(), "1-7");
    assert_eq!(report.summary.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_risk_cohort_strings() -> Result<()> {
    let (_dir, source) = source().await;
    let options = StringSplitOptions::default()
        .with_replacement("Patients with a ")
        .with_split_on(" and ");

    let report = identify_distinct_strings(
        source.as_ref(),
        common::TABLE,
        &["MOL1_high_risk_cohort"],
        None,
        &options,
    )
    .await?;
    assert_eq!(
        report.lists[0].tokens,
        vec!["liver disease".to_string(), "solid cancer".to_string()]
    );

    let counts = count_substrings(
        source.as_ref(),
        common::TABLE,
        &["MOL1_high_risk_cohort"],
        &["liver", "cancer", "Down"],
        None,
        false,
    )
    .await?;
    let displayed: Vec<String> = counts.rows.iter().map(|r| r.count.to_string()).collect();
    // liver 72 -> 70, cancer 52 -> 50, Down 0
    assert_eq!(displayed, vec!["70", "50", "<=5"]);
    Ok(())
}

// =============================================================================
// Schema Summary
// =============================================================================

#[tokio::test]
async fn test_schema_summary_with_filters() -> Result<()> {
    let (_dir, source) = source().await;
    let options = SchemaSummaryOptions::default().with_filter(SchemaFilter::new(
        "_non_hospitalised",
        "COVID_indication='non_hospitalised'",
    ));

    let summary = schema_summary(source.as_ref(), common::TABLE, &options).await?;
    assert_eq!(summary.tables.len(), 1);

    let table = &summary.tables[0];
    assert_eq!(table.total_rows[0].rows.value(), Some(75));
    assert_eq!(table.total_rows[1].rows.value(), Some(70));
    assert_eq!(table.columns.len(), 3);

    let start_date = &table.columns[2];
    assert_eq!(start_date.entry.column_name, "TreatmentStartDate");
    assert_eq!(start_date.counts[0].missing, SmallCount::Suppressed);
    assert_eq!(start_date.counts[0].missing_percentage, "");
    assert_eq!(start_date.counts[1].missing.value(), Some(0));
    assert!(!start_date.counts[0].sampled);

    assert_eq!(
        table.export_file_name(),
        "schema_Therapeutics__unfiltered_non_hospitalised.csv"
    );
    Ok(())
}

#[tokio::test]
async fn test_schema_summary_samples_when_filter_fails() -> Result<()> {
    let (_dir, url) = common::therapeutics_db().await;
    let source = create_data_source_with_config(SourceConfig::new(url).with_sample_limit(10))?;
    let options =
        SchemaSummaryOptions::default().with_filter(SchemaFilter::new("_bad", "NoSuchColumn = 1"));

    let summary = schema_summary(source.as_ref(), common::TABLE, &options).await?;
    let table = &summary.tables[0];
    let region = &table.columns[1];

    assert!(!region.counts[0].sampled);
    assert!(region.counts[1].sampled);
    // the first ten rows are all London
    assert_eq!(region.counts[1].distinct_values, 1);
    assert_eq!(region.counts[0].distinct_values, 2);

    // every column fell back to the sample, so the second total is the sample size
    assert_eq!(table.total_rows[0].rows.value(), Some(75));
    assert!(!table.total_rows[0].sampled);
    assert_eq!(table.total_rows[1].rows.value(), Some(10));
    assert!(table.total_rows[1].sampled);

    let rendered = table.to_string();
    assert!(rendered.contains("- Total rows (all rows): 75\n"));
    assert!(rendered.contains("- Total rows (bad): (sample of 10 rows)\n"));
    Ok(())
}

#[tokio::test]
async fn test_schema_summary_includes_supplementary_tables() -> Result<()> {
    let (_dir, source) = source().await;
    let options = SchemaSummaryOptions::default().with_supplementary_separator("_");

    // 'Patient' does not match 'Therapeutics_%', so only one table is found
    let summary = schema_summary(source.as_ref(), common::TABLE, &options).await?;
    assert_eq!(summary.tables.len(), 1);
    Ok(())
}
