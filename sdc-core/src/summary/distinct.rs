//! Distinct-value summaries of single columns.
//!
//! For each column the missing values are counted separately and the
//! non-missing values are suppressed and rounded. What is shown next depends
//! on how many values survive:
//!
//! - a listing when at most `threshold` values survive
//! - a frequency-of-counts table when none survive, or when asked for
//! - otherwise a range summary (min, max, most common value)

use super::{DistinctValuesOptions, format_filter};
use crate::Result;
use crate::adapters::DataSource;
use crate::disclosure::{
    FREQUENCY_MIN_DISPLAY, ROUNDING_BASE, SmallCount, SuppressionPolicy, round_and_suppress_count,
    round_to_nearest, suppress_and_round,
};
use crate::export::{Tabular, file_name_fragment, render_markdown};
use crate::models::{AggregateResult, Value};
use crate::query::simple_sql;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A value with its rounded record count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    /// Column value
    pub value: Value,
    /// Records with this value, rounded to the nearest 5
    pub row_count: u64,
}

/// How many distinct values share a given number of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrequencyRow {
    /// Number of records per value
    pub records_per_value: u64,
    /// Number of values with that many records, rounded to the nearest 5
    pub frequency: u64,
}

/// The body of a distinct-value summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistinctSummary {
    /// The column holds only missing values
    NoValues,
    /// Few enough values survived suppression to list them
    Listing {
        /// Listed values; counts are present when requested
        values: Vec<Value>,
        /// Rounded counts aligned with `values`, when requested
        counts: Option<Vec<u64>>,
        /// Number of values withheld by suppression
        suppressed_values: usize,
    },
    /// Number of values per record count, with missing values grouped as
    /// one value
    FrequencyOfCounts {
        /// Rows with a rounded frequency above the display minimum
        rows: Vec<FrequencyRow>,
    },
    /// Too many values to list
    Range {
        /// Number of distinct non-missing values before suppression
        distinct_values: usize,
        /// Smallest value that survived suppression
        min: Value,
        /// Largest value that survived suppression
        max: Value,
        /// Most common surviving value
        most_common: ValueCount,
    },
}

/// Distinct-value summary of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistinctValuesReport {
    /// Table summarized
    pub table: String,
    /// Column summarized
    pub column: String,
    /// Filter the summary ran under
    pub filter: Option<String>,
    /// Missing values: zero, `1-7`, or rounded to the nearest 5
    pub missing: SmallCount,
    /// What is shown of the non-missing values
    pub summary: DistinctSummary,
}

impl DistinctValuesReport {
    /// CSV file name for a listing: `distinct_values_<table>_<col>_<filter>.csv`.
    pub fn export_file_name(&self) -> String {
        format!(
            "distinct_values_{}_{}_{}.csv",
            self.table,
            self.column,
            file_name_fragment(self.filter.as_deref().unwrap_or(""))
        )
    }

    /// True when the summary has a table worth exporting.
    pub fn is_listing(&self) -> bool {
        matches!(self.summary, DistinctSummary::Listing { .. })
    }

    fn missing_line(&self) -> String {
        match self.missing {
            SmallCount::Count(0) => "No missing values".to_string(),
            SmallCount::Suppressed => format!("Missing values: {}", self.missing),
            SmallCount::Count(_) => format!(
                "Missing values: {} (to the nearest {})",
                self.missing, ROUNDING_BASE
            ),
        }
    }
}

impl Tabular for DistinctValuesReport {
    fn headers(&self) -> Vec<String> {
        match &self.summary {
            DistinctSummary::NoValues => Vec::new(),
            DistinctSummary::Listing { counts, .. } => {
                let mut headers = vec![self.column.clone()];
                if counts.is_some() {
                    headers.push("row_count".to_string());
                }
                headers
            }
            DistinctSummary::FrequencyOfCounts { .. } => vec![
                format!("No. of rows per {}", self.column),
                "frequency".to_string(),
            ],
            DistinctSummary::Range { .. } => vec![
                "distinct values".to_string(),
                "min".to_string(),
                "max".to_string(),
                "most common".to_string(),
                "most common count".to_string(),
            ],
        }
    }

    fn records(&self) -> Vec<Vec<String>> {
        match &self.summary {
            DistinctSummary::NoValues => Vec::new(),
            DistinctSummary::Listing { values, counts, .. } => values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let mut record = vec![value.to_string()];
                    if let Some(counts) = counts {
                        record.push(counts.get(i).map(u64::to_string).unwrap_or_default());
                    }
                    record
                })
                .collect(),
            DistinctSummary::FrequencyOfCounts { rows } => rows
                .iter()
                .map(|row| vec![row.records_per_value.to_string(), row.frequency.to_string()])
                .collect(),
            DistinctSummary::Range {
                distinct_values,
                min,
                max,
                most_common,
            } => vec![vec![
                distinct_values.to_string(),
                min.to_string(),
                max.to_string(),
                most_common.value.to_string(),
                most_common.row_count.to_string(),
            ]],
        }
    }
}

impl fmt::Display for DistinctValuesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### {}{}\n", self.column, format_filter(self.filter.as_deref()))?;
        writeln!(f, "{}\n", self.missing_line())?;

        match &self.summary {
            DistinctSummary::NoValues => writeln!(f, "No non-null values"),
            DistinctSummary::Listing {
                suppressed_values, ..
            } => {
                f.write_str(&render_markdown(self))?;
                if *suppressed_values > 0 {
                    writeln!(
                        f,
                        "\n{} value(s) with small counts were suppressed",
                        suppressed_values
                    )?;
                }
                Ok(())
            }
            DistinctSummary::FrequencyOfCounts { rows } => {
                if rows.is_empty() {
                    writeln!(f, "All frequencies too small to display")
                } else {
                    f.write_str(&render_markdown(self))
                }
            }
            DistinctSummary::Range { .. } => f.write_str(&render_markdown(self)),
        }
    }
}

// The missing-value group counts as one more value.
fn frequency_of_counts<'a>(rows: impl IntoIterator<Item = &'a (Value, u64)>) -> Vec<FrequencyRow> {
    let mut frequencies: BTreeMap<u64, u64> = BTreeMap::new();
    for (_, count) in rows {
        *frequencies.entry(*count).or_default() += 1;
    }

    frequencies
        .into_iter()
        .map(|(records_per_value, frequency)| FrequencyRow {
            records_per_value,
            frequency: round_to_nearest(frequency, ROUNDING_BASE),
        })
        .filter(|row| row.frequency > FREQUENCY_MIN_DISPLAY)
        .collect()
}

/// Builds the summary of `column` from its grouped counts.
///
/// # Errors
/// Returns an error if the column is not part of the aggregate.
pub fn summarize_distinct_values(
    aggregate: &AggregateResult,
    table: &str,
    column: &str,
    filter: Option<&str>,
    options: &DistinctValuesOptions,
) -> Result<DistinctValuesReport> {
    let regrouped = aggregate.regroup(column, Value::truncate_to_date)?;
    let (nulls, non_null): (Vec<_>, Vec<_>) =
        regrouped.into_iter().partition(|(value, _)| value.is_null());

    let missing = round_and_suppress_count(nulls.iter().map(|(_, c)| c).sum());
    let report = |summary| DistinctValuesReport {
        table: table.to_string(),
        column: column.to_string(),
        filter: filter.map(str::to_string),
        missing,
        summary,
    };

    if non_null.is_empty() {
        return Ok(report(DistinctSummary::NoValues));
    }

    let outcome = suppress_and_round(non_null.iter().cloned(), &SuppressionPolicy::default());
    let mut kept: Vec<(Value, u64)> = outcome.kept().map(|(v, c)| (v.clone(), c)).collect();

    if kept.len() > options.threshold && !options.frequency_count {
        kept.sort_by(|a, b| a.0.cmp(&b.0));
        let (Some(min), Some(max)) = (kept.first(), kept.last()) else {
            return Ok(report(DistinctSummary::NoValues));
        };
        let (min, max) = (min.0.clone(), max.0.clone());
        let most_common = outcome
            .kept()
            .fold(None::<(&Value, u64)>, |best, (value, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((value, count)),
            })
            .map(|(value, row_count)| ValueCount {
                value: value.clone(),
                row_count,
            });
        let Some(most_common) = most_common else {
            return Ok(report(DistinctSummary::NoValues));
        };

        return Ok(report(DistinctSummary::Range {
            distinct_values: non_null.len(),
            min,
            max,
            most_common,
        }));
    }

    if kept.is_empty() || options.frequency_count {
        return Ok(report(DistinctSummary::FrequencyOfCounts {
            rows: frequency_of_counts(nulls.iter().chain(&non_null)),
        }));
    }

    if options.include_counts && !options.sort_by_value {
        kept.sort_by(|a, b| b.1.cmp(&a.1));
    } else {
        kept.sort_by(|a, b| a.0.cmp(&b.0));
    }
    let (values, counts): (Vec<Value>, Vec<u64>) = kept.into_iter().unzip();

    Ok(report(DistinctSummary::Listing {
        values,
        counts: options.include_counts.then_some(counts),
        suppressed_values: outcome.suppressed_count(),
    }))
}

/// Summarizes the distinct values of each column of `table`.
///
/// One grouped query is issued per column.
///
/// # Errors
/// Returns the first query error.
pub async fn distinct_values(
    source: &dyn DataSource,
    table: &str,
    columns: &[&str],
    filter: Option<&str>,
    options: &DistinctValuesOptions,
) -> Result<Vec<DistinctValuesReport>> {
    let mut reports = Vec::with_capacity(columns.len());
    for &column in columns {
        tracing::debug!("Summarizing distinct values of {}.{}", table, column);
        let aggregate = simple_sql(source, table, &[column], filter).await?;
        reports.push(summarize_distinct_values(
            &aggregate, table, column, filter, options,
        )?);
    }
    Ok(reports)
}
