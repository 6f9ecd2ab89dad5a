//! Detection of malformed date strings.
//!
//! Values are checked against an ordered list of patterns; a later match
//! overrides an earlier one, so each value carries at most one problem.

use super::{ProblemDatesOptions, format_filter};
use crate::Result;
use crate::adapters::DataSource;
use crate::disclosure::{SmallCount, round_and_suppress_count};
use crate::error::SdcError;
use crate::export::{Tabular, render_markdown};
use crate::models::{AggregateResult, Value};
use crate::query::simple_sql;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Stand-in for missing values; a valid date, so nulls are never reported.
pub const NULL_PLACEHOLDER: &str = "2022-01-01";

/// Kind of malformation found in a date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateProblem {
    /// At most two digits anywhere
    LimitedNumericCharacters,
    /// None of the valid years appears
    NoValidYear,
    /// First or last character is not a digit
    StartsOrEndsNonNumeric,
    /// No digits, or no digits between non-digit ends
    LargelyNonNumeric,
    /// One or two digits and nothing else
    EntirelyNumeric,
}

impl fmt::Display for DateProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DateProblem::LimitedNumericCharacters => "limited numeric characters",
            DateProblem::NoValidYear => "no valid year",
            DateProblem::StartsOrEndsNonNumeric => "starts/ends non-numeric",
            DateProblem::LargelyNonNumeric => "largely or entirely non-numeric",
            DateProblem::EntirelyNumeric => "entirely numeric",
        };
        f.write_str(text)
    }
}

/// Classifies date strings.
#[derive(Debug, Clone)]
pub struct DateClassifier {
    limited_digits: Regex,
    valid_year: Option<Regex>,
    non_numeric_end: Regex,
    any_digit: Regex,
    non_numeric_span: Regex,
    short_number: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| SdcError::configuration(format!("Invalid pattern '{}': {}", pattern, e)))
}

impl DateClassifier {
    /// Creates a classifier; each valid year is matched literally anywhere
    /// in the value. With no valid years the year check is skipped.
    ///
    /// # Errors
    /// Returns a configuration error if a pattern fails to compile.
    pub fn new(valid_years: &[String]) -> Result<Self> {
        let valid_year = if valid_years.is_empty() {
            None
        } else {
            let alternatives: Vec<String> =
                valid_years.iter().map(|y| regex::escape(y)).collect();
            Some(compile(&alternatives.join("|"))?)
        };

        Ok(Self {
            limited_digits: compile(r"^\D*\d?\d?\D*$")?,
            valid_year,
            non_numeric_end: compile(r"^\D|\D$")?,
            any_digit: compile(r"\d")?,
            non_numeric_span: compile(r"^\D*\D$")?,
            short_number: compile(r"^\d\d?$")?,
        })
    }

    /// The problem with `value`, if any.
    pub fn classify(&self, value: &str) -> Option<DateProblem> {
        let mut problem = None;

        if self.limited_digits.is_match(value) {
            problem = Some(DateProblem::LimitedNumericCharacters);
        }
        if let Some(valid_year) = &self.valid_year
            && !valid_year.is_match(value)
        {
            problem = Some(DateProblem::NoValidYear);
        }
        if self.non_numeric_end.is_match(value) {
            problem = Some(DateProblem::StartsOrEndsNonNumeric);
        }
        if !self.any_digit.is_match(value) || self.non_numeric_span.is_match(value) {
            problem = Some(DateProblem::LargelyNonNumeric);
        }
        if self.short_number.is_match(value) {
            problem = Some(DateProblem::EntirelyNumeric);
        }

        problem
    }
}

/// One problematic value with its records across all checked columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemValue {
    /// Problem found
    pub problem: DateProblem,
    /// Offending value
    pub value: String,
    /// Records with this value: zero, `1-7` or rounded to the nearest 5
    pub row_count: SmallCount,
}

/// Roll-up of one problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemSummary {
    /// Problem found
    pub problem: DateProblem,
    /// Number of distinct offending values
    pub different_values: usize,
    /// Records with an offending value: `1-7` or rounded to the nearest 5
    pub row_count: SmallCount,
}

/// Result of [`problem_dates`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemDatesReport {
    /// Table checked
    pub table: String,
    /// Columns checked
    pub columns: Vec<String>,
    /// Filter the check ran under
    pub filter: Option<String>,
    /// Offending values, ordered by problem then value; empty in
    /// summary-only mode
    pub values: Vec<ProblemValue>,
    /// One row per problem found
    pub summary: Vec<ProblemSummary>,
}

/// The per-problem roll-up of a [`ProblemDatesReport`] as a table.
#[derive(Debug, Clone, Copy)]
pub struct ProblemSummaryTable<'a>(pub &'a ProblemDatesReport);

impl Tabular for ProblemSummaryTable<'_> {
    fn headers(&self) -> Vec<String> {
        vec![
            "problem".to_string(),
            "no_of_different_values".to_string(),
            "row_count".to_string(),
        ]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.0
            .summary
            .iter()
            .map(|row| {
                vec![
                    row.problem.to_string(),
                    row.different_values.to_string(),
                    row.row_count.to_string(),
                ]
            })
            .collect()
    }
}

impl Tabular for ProblemDatesReport {
    fn headers(&self) -> Vec<String> {
        vec![
            "problem".to_string(),
            "value".to_string(),
            "row_count".to_string(),
        ]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.values
            .iter()
            .map(|row| {
                vec![
                    row.problem.to_string(),
                    row.value.clone(),
                    row.row_count.to_string(),
                ]
            })
            .collect()
    }
}

impl fmt::Display for ProblemDatesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### Problem dates in {}{}\n",
            self.columns.join(", "),
            format_filter(self.filter.as_deref())
        )?;
        if self.summary.is_empty() {
            return writeln!(f, "No problem dates found");
        }
        f.write_str(&render_markdown(&ProblemSummaryTable(self)))?;
        if !self.values.is_empty() {
            writeln!(f)?;
            f.write_str(&render_markdown(self))?;
        }
        Ok(())
    }
}

/// Checks the grouped values of `columns` for malformed dates.
///
/// # Errors
/// Returns an error if a column is missing from the aggregate or the
/// classifier cannot be built.
pub fn summarize_problem_dates(
    aggregate: &AggregateResult,
    table: &str,
    columns: &[&str],
    filter: Option<&str>,
    options: &ProblemDatesOptions,
) -> Result<ProblemDatesReport> {
    let classifier = DateClassifier::new(&options.valid_years)?;

    // (problem, value) -> raw records, summed over every column
    let mut found: BTreeMap<(DateProblem, String), u64> = BTreeMap::new();
    for &column in columns {
        let index = aggregate.require_column(column)?;
        for row in &aggregate.rows {
            let value = match row.value(index) {
                Value::Null => NULL_PLACEHOLDER.to_string(),
                other => other.to_string(),
            };
            if let Some(problem) = classifier.classify(&value) {
                *found.entry((problem, value)).or_default() += row.row_count;
            }
        }
    }

    let mut rollup: BTreeMap<DateProblem, (usize, u64)> = BTreeMap::new();
    for ((problem, _), count) in &found {
        let entry = rollup.entry(*problem).or_default();
        entry.0 += 1;
        entry.1 += count;
    }

    let summary = rollup
        .into_iter()
        .map(|(problem, (different_values, total))| ProblemSummary {
            problem,
            different_values,
            row_count: round_and_suppress_count(total),
        })
        .collect();

    let values = if options.summary_only {
        Vec::new()
    } else {
        found
            .into_iter()
            .map(|((problem, value), count)| ProblemValue {
                problem,
                value,
                row_count: round_and_suppress_count(count),
            })
            .collect()
    };

    Ok(ProblemDatesReport {
        table: table.to_string(),
        columns: columns.iter().map(|c| (*c).to_string()).collect(),
        filter: filter.map(str::to_string),
        values,
        summary,
    })
}

/// Reports values of `columns` that do not look like dates.
///
/// # Errors
/// Returns a configuration error when no columns are given, or the query
/// error.
pub async fn problem_dates(
    source: &dyn DataSource,
    table: &str,
    columns: &[&str],
    filter: Option<&str>,
    options: &ProblemDatesOptions,
) -> Result<ProblemDatesReport> {
    let aggregate = simple_sql(source, table, columns, filter).await?;
    tracing::debug!(
        "Checking {} distinct combinations of {} for problem dates",
        aggregate.len(),
        columns.join(", ")
    );
    summarize_problem_dates(&aggregate, table, columns, filter, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregateRow;

    fn classifier() -> DateClassifier {
        DateClassifier::new(&ProblemDatesOptions::default().valid_years).unwrap()
    }

    #[test]
    fn test_classification_examples() {
        let c = classifier();
        assert_eq!(c.classify("ABC"), Some(DateProblem::LargelyNonNumeric));
        assert_eq!(c.classify("12"), Some(DateProblem::EntirelyNumeric));
        assert_eq!(c.classify("2022-03-04"), None);
        assert_eq!(c.classify("2021-03-04"), None);
        assert_eq!(c.classify("1999-03-04"), Some(DateProblem::NoValidYear));
        assert_eq!(c.classify("2022-03-04x"), Some(DateProblem::StartsOrEndsNonNumeric));
        assert_eq!(c.classify("a1b"), Some(DateProblem::StartsOrEndsNonNumeric));
        assert_eq!(c.classify("-"), Some(DateProblem::LargelyNonNumeric));
        assert_eq!(c.classify("x2022"), Some(DateProblem::StartsOrEndsNonNumeric));
    }

    #[test]
    fn test_later_checks_override_earlier_ones() {
        // limited digits, no valid year and non-numeric ends all match first
        let c = classifier();
        assert_eq!(c.classify("n/a"), Some(DateProblem::LargelyNonNumeric));
        assert_eq!(c.classify("7"), Some(DateProblem::EntirelyNumeric));
    }

    #[test]
    fn test_years_are_literal() {
        let c = DateClassifier::new(&["20.2".to_string()]).unwrap();
        assert_eq!(c.classify("20120101"), Some(DateProblem::NoValidYear));
    }

    #[test]
    fn test_merge_across_columns() {
        let agg = AggregateResult::new(
            vec!["Received".to_string(), "TreatmentStartDate".to_string()],
            vec![
                AggregateRow::new(vec![Value::from("ABC"), Value::from("2022-01-05")], 6),
                AggregateRow::new(vec![Value::from("2022-01-05"), Value::from("ABC")], 6),
                AggregateRow::new(vec![Value::Null, Value::from("12")], 30),
            ],
        );

        let report = summarize_problem_dates(
            &agg,
            "Therapeutics",
            &["Received", "TreatmentStartDate"],
            None,
            &ProblemDatesOptions::default(),
        )
        .unwrap();

        assert_eq!(
            report.values,
            vec![
                ProblemValue {
                    problem: DateProblem::LargelyNonNumeric,
                    value: "ABC".to_string(),
                    row_count: round_and_suppress_count(12),
                },
                ProblemValue {
                    problem: DateProblem::EntirelyNumeric,
                    value: "12".to_string(),
                    row_count: round_and_suppress_count(30),
                },
            ]
        );
        assert_eq!(report.summary.len(), 2);
        assert_eq!(report.summary[0].different_values, 1);
        assert_eq!(report.summary[0].row_count.to_string(), "10");
    }

    #[test]
    fn test_summary_only() {
        let agg = AggregateResult::new(
            vec!["Received".to_string()],
            vec![AggregateRow::new(vec![Value::from("ABC")], 3)],
        );
        let options = ProblemDatesOptions::default().with_summary_only(true);
        let report = summarize_problem_dates(&agg, "t", &["Received"], None, &options).unwrap();

        assert!(report.values.is_empty());
        assert_eq!(report.summary[0].row_count, SmallCount::Suppressed);
    }
}
