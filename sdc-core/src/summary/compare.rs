//! Pairwise comparison of two columns.
//!
//! Every distinct pair of values is classified into exactly one
//! [`ComparisonOutcome`]. Missing values take precedence over the value
//! comparison, and a missing right-hand value takes precedence over a
//! missing left-hand one.

use super::coerce::{ColumnKind, Comparable, ComparisonMode, comparison_mode};
use super::stats::{median, quartiles};
use crate::Result;
use crate::adapters::DataSource;
use crate::disclosure::{DisclosedCount, SuppressionPolicy, percentage};
use crate::export::Tabular;
use crate::models::{AggregateResult, Value};
use crate::query::joined_pair_sql;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Outcome of comparing one pair of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// Left value is smaller
    LessThan,
    /// Values are equal
    Equal,
    /// Left value is larger
    GreaterThan,
    /// Left value is missing (right present)
    LeftMissing,
    /// Right value is missing
    RightMissing,
    /// Both present but at least one could not be converted or ordered
    CouldNotCompare,
}

impl ComparisonOutcome {
    /// Display label for the outcome, e.g. `Received < TreatmentStartDate`.
    pub fn label(self, left: &str, right: &str) -> String {
        match self {
            ComparisonOutcome::LessThan => format!("{} < {}", left, right),
            ComparisonOutcome::Equal => format!("{} = {}", left, right),
            ComparisonOutcome::GreaterThan => format!("{} > {}", left, right),
            ComparisonOutcome::LeftMissing => format!("{} is missing", left),
            ComparisonOutcome::RightMissing => format!("{} is missing", right),
            ComparisonOutcome::CouldNotCompare => "couldn't compare".to_string(),
        }
    }

    /// True for the three outcomes where both values were compared.
    pub fn is_compared(self) -> bool {
        matches!(
            self,
            ComparisonOutcome::LessThan | ComparisonOutcome::Equal | ComparisonOutcome::GreaterThan
        )
    }
}

/// Classifies one pair of raw values, returning the outcome and, for
/// compared pairs, the absolute difference.
pub fn classify_pair(
    left: &Value,
    right: &Value,
    mode: ComparisonMode,
) -> (ComparisonOutcome, Option<f64>) {
    if right.is_null() {
        return (ComparisonOutcome::RightMissing, None);
    }
    if left.is_null() {
        return (ComparisonOutcome::LeftMissing, None);
    }

    let (Some(a), Some(b)) = (
        Comparable::convert(left, mode),
        Comparable::convert(right, mode),
    ) else {
        return (ComparisonOutcome::CouldNotCompare, None);
    };

    let outcome = match a.partial_cmp(&b) {
        Some(Ordering::Less) => ComparisonOutcome::LessThan,
        Some(Ordering::Equal) => ComparisonOutcome::Equal,
        Some(Ordering::Greater) => ComparisonOutcome::GreaterThan,
        None => return (ComparisonOutcome::CouldNotCompare, None),
    };
    (outcome, a.difference(b))
}

/// One category of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    /// Category
    pub outcome: ComparisonOutcome,
    /// Display label of the category
    pub label: String,
    /// Median absolute difference over distinct compared pairs
    pub median_difference: Option<f64>,
    /// First quartile of the difference
    pub q1: Option<f64>,
    /// Third quartile of the difference
    pub q3: Option<f64>,
    /// Records in the category, suppressed and rounded
    pub row_count: DisclosedCount,
    /// Share of the displayed total, one decimal place
    pub percentage: Option<f64>,
}

/// Result of [`compare_two_values`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    /// Left-hand column
    pub left: String,
    /// Right-hand column
    pub right: String,
    /// How values were compared
    #[serde(skip)]
    pub mode: ComparisonMode,
    /// Filter the comparison ran under
    pub filter: Option<String>,
    /// Categories present in the data, in outcome order
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonReport {
    /// Header of the median column; date differences are in days.
    pub fn median_header(&self) -> &'static str {
        match self.mode {
            ComparisonMode::Temporal => "median difference (days)",
            ComparisonMode::Numeric => "median difference",
        }
    }
}

fn format_statistic(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl Tabular for ComparisonReport {
    fn headers(&self) -> Vec<String> {
        vec![
            "comparison".to_string(),
            self.median_header().to_string(),
            "Q1".to_string(),
            "Q3".to_string(),
            "row_count".to_string(),
            "%".to_string(),
        ]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                vec![
                    row.label.clone(),
                    format_statistic(row.median_difference),
                    format_statistic(row.q1),
                    format_statistic(row.q3),
                    row.row_count.to_string(),
                    row.percentage
                        .map(|p| format!("{:.1}", p))
                        .unwrap_or_default(),
                ]
            })
            .collect()
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => writeln!(f, "### {} vs {} ({})\n", self.left, self.right, filter)?,
            None => writeln!(f, "### {} vs {}\n", self.left, self.right)?,
        }
        f.write_str(&crate::export::render_markdown(self))
    }
}

/// Builds the comparison report from a grouped pair of columns.
///
/// # Errors
/// Returns an error if a column is missing from the aggregate or the two
/// columns hold incompatible kinds.
pub fn summarize_comparison(
    aggregate: &AggregateResult,
    left: &str,
    right: &str,
    filter: Option<&str>,
) -> Result<ComparisonReport> {
    let left_index = aggregate.require_column(left)?;
    let right_index = aggregate.require_column(right)?;

    let mode = comparison_mode(
        left,
        ColumnKind::of(aggregate.rows.iter().map(|r| r.value(left_index))),
        right,
        ColumnKind::of(aggregate.rows.iter().map(|r| r.value(right_index))),
    )?;

    // outcome -> (raw count, differences of distinct pairs)
    let mut categories: std::collections::BTreeMap<ComparisonOutcome, (u64, Vec<f64>)> =
        std::collections::BTreeMap::new();
    for row in &aggregate.rows {
        let (outcome, difference) =
            classify_pair(row.value(left_index), row.value(right_index), mode);
        let entry = categories.entry(outcome).or_default();
        entry.0 += row.row_count;
        if let Some(d) = difference {
            entry.1.push(d);
        }
    }

    let policy = SuppressionPolicy::default();
    let disclosed: Vec<(ComparisonOutcome, DisclosedCount, Vec<f64>)> = categories
        .into_iter()
        .map(|(outcome, (count, differences))| (outcome, policy.disclose(count), differences))
        .collect();
    let displayed_total: u64 = disclosed.iter().map(|(_, c, _)| c.value_or_zero()).sum();

    let rows = disclosed
        .into_iter()
        .map(|(outcome, row_count, differences)| {
            let (q1, q3) = quartiles(&differences).unzip();
            ComparisonRow {
                outcome,
                label: outcome.label(left, right),
                median_difference: median(&differences),
                q1,
                q3,
                row_count,
                percentage: percentage(row_count.value_or_zero(), displayed_total, 1),
            }
        })
        .collect();

    Ok(ComparisonReport {
        left: left.to_string(),
        right: right.to_string(),
        mode,
        filter: filter.map(str::to_string),
        rows,
    })
}

/// Compares two columns, from one table or from a left join of two tables
/// on `join_on`.
///
/// # Errors
/// Returns a configuration error for the wrong number of tables or columns
/// or a missing join key, a type error for incompatible columns, or the
/// query error.
pub async fn compare_two_values(
    source: &dyn DataSource,
    tables: &[&str],
    columns: &[&str],
    join_on: Option<&str>,
    filter: Option<&str>,
) -> Result<ComparisonReport> {
    let aggregate = joined_pair_sql(source, tables, columns, join_on, filter).await?;
    let [left, right] = columns else {
        return Err(crate::error::SdcError::configuration(
            "Exactly 2 columns must be supplied",
        ));
    };

    tracing::debug!(
        "Comparing {} with {} over {} distinct pairs",
        left,
        right,
        aggregate.len()
    );
    summarize_comparison(&aggregate, left, right, filter)
}
