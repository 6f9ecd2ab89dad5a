//! Keys (usually patients) with more than one record.
//!
//! The counting runs server-side: one query finds the keys with several
//! records, counts distinct values of each field per key, and totals how
//! many keys vary in each field, in no field, and in each field pair.

use super::format_filter;
use crate::Result;
use crate::adapters::DataSource;
use crate::disclosure::{Disclosed, SuppressionPolicy, suppress_and_round};
use crate::error::SdcError;
use crate::export::{Tabular, render_markdown};
use crate::query::where_clause;
use serde::Serialize;
use std::fmt;

/// Default key column.
pub const DEFAULT_KEY_FIELD: &str = "patient_id";

/// Column holding the number of keys with no varying field.
pub const NONE_OF_THESE: &str = "none_of_these";

/// SQL for the multiple-records totals.
///
/// # Errors
/// Returns a configuration error when no fields are given.
pub fn build_multiple_records_sql(
    table: &str,
    fields: &[&str],
    combinations: &[(&str, &str)],
    key_field: &str,
    filter: Option<&str>,
) -> Result<String> {
    if fields.is_empty() {
        return Err(SdcError::configuration(
            "At least one field of interest must be supplied",
        ));
    }

    let distinct_counts = fields
        .iter()
        .map(|f| format!("COUNT(DISTINCT {f}) AS {f}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut totals: Vec<String> = fields
        .iter()
        .map(|f| format!("SUM(CASE WHEN {f} > 1 THEN 1 ELSE 0 END) AS {f}"))
        .collect();

    let none_varying = fields
        .iter()
        .map(|f| format!("{} < 2", f))
        .collect::<Vec<_>>()
        .join(" AND ");
    totals.push(format!(
        "SUM(CASE WHEN {} THEN 1 ELSE 0 END) AS {}",
        none_varying, NONE_OF_THESE
    ));

    for (a, b) in combinations {
        totals.push(format!(
            "SUM(CASE WHEN {a} > 1 AND {b} > 1 THEN 1 ELSE 0 END) AS {a}_AND_{b}"
        ));
    }

    Ok(format!(
        "WITH a AS (SELECT {key} FROM {table}{filter} GROUP BY {key} HAVING COUNT(*) > 1), \
         b AS (SELECT {key}, {distinct_counts} FROM {table} WHERE {key} IN (SELECT {key} FROM a) GROUP BY {key}) \
         SELECT COUNT(*) AS {key}s_with_multiple_records, {totals} FROM b",
        key = key_field,
        table = table,
        filter = where_clause(filter),
        distinct_counts = distinct_counts,
        totals = totals.join(", "),
    ))
}

/// Counts of keys with several records, by varying field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultipleRecordsReport {
    /// Table summarized
    pub table: String,
    /// Key column
    pub key_field: String,
    /// Filter the summary ran under
    pub filter: Option<String>,
    /// Kept totals, largest first
    pub rows: Vec<Disclosed<String>>,
    /// Totals withheld by suppression
    pub suppressed_fields: Vec<String>,
}

impl Tabular for MultipleRecordsReport {
    fn headers(&self) -> Vec<String> {
        vec!["field".to_string(), "Patient count".to_string()]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| vec![row.label.clone(), row.count.to_string()])
            .collect()
    }
}

impl fmt::Display for MultipleRecordsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### {}s with multiple records{}\n",
            self.key_field,
            format_filter(self.filter.as_deref())
        )?;
        f.write_str(&render_markdown(self))?;
        if !self.suppressed_fields.is_empty() {
            writeln!(
                f,
                "\nSuppressed (small counts): {}",
                self.suppressed_fields.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Counts keys with more than one record in `table`, and how many of them
/// differ in each field and field pair.
///
/// The filter selects which keys are counted; their distinct values are
/// taken over all of their records.
///
/// # Errors
/// Returns a configuration error when no fields are given, or the query
/// error.
pub async fn multiple_records(
    source: &dyn DataSource,
    table: &str,
    fields: &[&str],
    combinations: &[(&str, &str)],
    key_field: &str,
    filter: Option<&str>,
) -> Result<MultipleRecordsReport> {
    let sql = build_multiple_records_sql(table, fields, combinations, key_field, filter)?;
    let result = source.fetch(&sql).await?;

    let mut totals = Vec::with_capacity(result.columns.len());
    for (index, column) in result.columns.iter().enumerate() {
        let count = result.value(0, index).as_count().ok_or_else(|| {
            SdcError::query_rejected(format!("Column '{}' is not a non-negative count", column))
        })?;
        totals.push((column.clone(), count));
    }

    let outcome = suppress_and_round(totals, &SuppressionPolicy::default());
    let suppressed_fields = outcome.suppressed_labels().cloned().collect();
    let mut rows = outcome.into_displayed();
    rows.sort_by(|a, b| b.count.value_or_zero().cmp(&a.count.value_or_zero()));

    Ok(MultipleRecordsReport {
        table: table.to_string(),
        key_field: key_field.to_string(),
        filter: filter.map(str::to_string),
        rows,
        suppressed_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_shape() {
        let sql = build_multiple_records_sql(
            "Therapeutics",
            &["Intervention", "Received"],
            &[("Intervention", "Received")],
            DEFAULT_KEY_FIELD,
            Some("COVID_indication='non_hospitalised'"),
        )
        .unwrap();

        assert!(sql.starts_with(
            "WITH a AS (SELECT patient_id FROM Therapeutics WHERE COVID_indication='non_hospitalised' \
             GROUP BY patient_id HAVING COUNT(*) > 1)"
        ));
        assert!(sql.contains("COUNT(DISTINCT Intervention) AS Intervention, COUNT(DISTINCT Received) AS Received"));
        assert!(sql.contains("COUNT(*) AS patient_ids_with_multiple_records"));
        assert!(sql.contains(
            "SUM(CASE WHEN Intervention < 2 AND Received < 2 THEN 1 ELSE 0 END) AS none_of_these"
        ));
        assert!(sql.contains(
            "SUM(CASE WHEN Intervention > 1 AND Received > 1 THEN 1 ELSE 0 END) AS Intervention_AND_Received"
        ));
        assert!(sql.ends_with("FROM b"));
    }

    #[test]
    fn test_sql_without_combinations() {
        let sql = build_multiple_records_sql("t", &["a"], &[], "id", None).unwrap();
        assert!(!sql.contains("_AND_"));
        assert!(sql.contains("WITH a AS (SELECT id FROM t GROUP BY id HAVING COUNT(*) > 1)"));
    }

    #[test]
    fn test_requires_fields() {
        assert!(build_multiple_records_sql("t", &[], &[], "id", None).is_err());
    }
}
