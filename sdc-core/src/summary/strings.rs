//! Free-text columns: distinct tokens and substring counts.

use super::{StringSplitOptions, format_filter};
use crate::Result;
use crate::adapters::DataSource;
use crate::disclosure::{DisclosedCount, SUBSTRING_ROUNDING_BASE, SuppressionPolicy};
use crate::export::{Tabular, render_markdown};
use crate::models::{AggregateResult, Value};
use crate::query::simple_sql;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Distinct tokens of one column, or of all columns merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistinctStrings {
    /// Column name, `None` for the merged list
    pub column: Option<String>,
    /// Tokens in sorted order
    pub tokens: Vec<String>,
}

/// Result of [`identify_distinct_strings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistinctStringsReport {
    /// Table summarized
    pub table: String,
    /// Filter the summary ran under
    pub filter: Option<String>,
    /// One entry per column, or a single merged entry
    pub lists: Vec<DistinctStrings>,
}

impl fmt::Display for DistinctStringsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for list in &self.lists {
            let name = list.column.as_deref().unwrap_or("all columns");
            writeln!(f, "### {}{}\n", name, format_filter(self.filter.as_deref()))?;
            for token in &list.tokens {
                writeln!(f, "- {}", token)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn tokens_of(value: &Value, options: &StringSplitOptions) -> Vec<String> {
    if value.is_null() {
        return Vec::new();
    }

    let mut text = value.to_string();
    if !options.replacement.is_empty() {
        text = text.replace(&options.replacement, "");
    }

    let tokens: Vec<String> = if options.split_on.is_empty() {
        vec![text]
    } else {
        text.split(options.split_on.as_str()).map(str::to_string).collect()
    };
    tokens.into_iter().filter(|t| !t.is_empty()).collect()
}

/// Lists the distinct tokens of each column from their grouped values.
///
/// # Errors
/// Returns an error if a column is missing from the aggregate.
pub fn summarize_distinct_strings(
    aggregate: &AggregateResult,
    table: &str,
    columns: &[&str],
    filter: Option<&str>,
    options: &StringSplitOptions,
) -> Result<DistinctStringsReport> {
    let mut per_column: Vec<(String, BTreeSet<String>)> = Vec::with_capacity(columns.len());
    for &column in columns {
        let index = aggregate.require_column(column)?;
        let tokens = aggregate
            .rows
            .iter()
            .flat_map(|row| tokens_of(row.value(index), options))
            .collect();
        per_column.push((column.to_string(), tokens));
    }

    let lists = if options.merge_all {
        let merged: BTreeSet<String> = per_column.into_iter().flat_map(|(_, t)| t).collect();
        vec![DistinctStrings {
            column: None,
            tokens: merged.into_iter().collect(),
        }]
    } else {
        per_column
            .into_iter()
            .map(|(column, tokens)| DistinctStrings {
                column: Some(column),
                tokens: tokens.into_iter().collect(),
            })
            .collect()
    };

    Ok(DistinctStringsReport {
        table: table.to_string(),
        filter: filter.map(str::to_string),
        lists,
    })
}

/// Lists the distinct tokens found in free-text columns, after removing a
/// fixed prefix and splitting on a delimiter.
///
/// # Errors
/// Returns a configuration error when no columns are given, or the query
/// error.
pub async fn identify_distinct_strings(
    source: &dyn DataSource,
    table: &str,
    columns: &[&str],
    filter: Option<&str>,
    options: &StringSplitOptions,
) -> Result<DistinctStringsReport> {
    let aggregate = simple_sql(source, table, columns, filter).await?;
    summarize_distinct_strings(&aggregate, table, columns, filter, options)
}

/// Policy for substring counts: rounded to the nearest 10, so anything at or
/// below half the base would display as zero and is shown as `<=5` instead.
pub fn substring_policy() -> SuppressionPolicy {
    SuppressionPolicy::new()
        .with_threshold(SUBSTRING_ROUNDING_BASE / 2)
        .with_rounding_base(SUBSTRING_ROUNDING_BASE)
}

/// Records containing one substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstringCount {
    /// Substring searched for
    pub substring: String,
    /// Column searched, `None` for the total over all columns
    pub column: Option<String>,
    /// Records containing the substring, rounded to the nearest 10
    pub count: DisclosedCount,
}

/// Result of [`count_substrings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstringCountsReport {
    /// Table searched
    pub table: String,
    /// Filter the search ran under
    pub filter: Option<String>,
    /// Counts per substring and column, then merged totals when requested
    pub rows: Vec<SubstringCount>,
}

impl Tabular for SubstringCountsReport {
    fn headers(&self) -> Vec<String> {
        vec![
            "substring".to_string(),
            "column".to_string(),
            "row_count".to_string(),
        ]
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                vec![
                    row.substring.clone(),
                    row.column.clone().unwrap_or_else(|| "all columns".to_string()),
                    row.count.to_string(),
                ]
            })
            .collect()
    }
}

impl fmt::Display for SubstringCountsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### Substring counts in {}{}\n",
            self.table,
            format_filter(self.filter.as_deref())
        )?;
        f.write_str(&render_markdown(self))
    }
}

/// Counts records containing each substring, per column and optionally
/// merged, from grouped values.
///
/// # Errors
/// Returns an error if a column is missing from the aggregate.
pub fn summarize_substrings(
    aggregate: &AggregateResult,
    table: &str,
    columns: &[&str],
    substrings: &[&str],
    filter: Option<&str>,
    merge_all: bool,
) -> Result<SubstringCountsReport> {
    let policy = substring_policy();
    let mut rows = Vec::new();

    for &substring in substrings {
        let mut merged_total = 0;
        for &column in columns {
            let index = aggregate.require_column(column)?;
            let raw: u64 = aggregate
                .rows
                .iter()
                .filter(|row| {
                    let value = row.value(index);
                    !value.is_null() && value.to_string().contains(substring)
                })
                .map(|row| row.row_count)
                .sum();

            let count = policy.disclose(raw);
            merged_total += count.value_or_zero();
            if !merge_all {
                rows.push(SubstringCount {
                    substring: substring.to_string(),
                    column: Some(column.to_string()),
                    count,
                });
            }
        }

        if merge_all {
            rows.push(SubstringCount {
                substring: substring.to_string(),
                column: None,
                count: policy.disclose(merged_total),
            });
        }
    }

    Ok(SubstringCountsReport {
        table: table.to_string(),
        filter: filter.map(str::to_string),
        rows,
    })
}

/// Counts records whose columns contain each substring literally.
///
/// # Errors
/// Returns a configuration error when no columns are given, or the query
/// error.
pub async fn count_substrings(
    source: &dyn DataSource,
    table: &str,
    columns: &[&str],
    substrings: &[&str],
    filter: Option<&str>,
    merge_all: bool,
) -> Result<SubstringCountsReport> {
    let aggregate = simple_sql(source, table, columns, filter).await?;
    summarize_substrings(&aggregate, table, columns, substrings, filter, merge_all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregateRow;

    fn risk_cohorts() -> AggregateResult {
        AggregateResult::new(
            vec![
                "MOL1_high_risk_cohort".to_string(),
                "SOT02_risk_cohorts".to_string(),
            ],
            vec![
                AggregateRow::new(
                    vec![
                        Value::from("Patients with a solid cancer and Patients with a liver disease"),
                        Value::Null,
                    ],
                    12,
                ),
                AggregateRow::new(
                    vec![Value::Null, Value::from("Patients with a Down's syndrome")],
                    3,
                ),
                AggregateRow::new(
                    vec![
                        Value::from("Patients with a liver disease"),
                        Value::from("Patients with a liver disease"),
                    ],
                    20,
                ),
            ],
        )
    }

    fn split_options() -> StringSplitOptions {
        StringSplitOptions::default()
            .with_replacement("Patients with a ")
            .with_split_on(" and ")
    }

    #[test]
    fn test_distinct_strings_per_column() {
        let report = summarize_distinct_strings(
            &risk_cohorts(),
            "Therapeutics",
            &["MOL1_high_risk_cohort", "SOT02_risk_cohorts"],
            None,
            &split_options(),
        )
        .unwrap();

        assert_eq!(report.lists.len(), 2);
        assert_eq!(
            report.lists[0].tokens,
            vec!["liver disease".to_string(), "solid cancer".to_string()]
        );
        assert_eq!(
            report.lists[1].tokens,
            vec!["Down's syndrome".to_string(), "liver disease".to_string()]
        );
    }

    #[test]
    fn test_distinct_strings_merged() {
        let report = summarize_distinct_strings(
            &risk_cohorts(),
            "Therapeutics",
            &["MOL1_high_risk_cohort", "SOT02_risk_cohorts"],
            None,
            &split_options().with_merge_all(true),
        )
        .unwrap();

        assert_eq!(report.lists.len(), 1);
        assert_eq!(report.lists[0].column, None);
        assert_eq!(report.lists[0].tokens.len(), 3);
    }

    #[test]
    fn test_empty_delimiter_does_not_split() {
        let options = StringSplitOptions::default();
        assert_eq!(
            tokens_of(&Value::from("a and b"), &options),
            vec!["a and b".to_string()]
        );
        assert!(tokens_of(&Value::Null, &options).is_empty());
    }

    #[test]
    fn test_substring_counts() {
        let report = summarize_substrings(
            &risk_cohorts(),
            "Therapeutics",
            &["MOL1_high_risk_cohort", "SOT02_risk_cohorts"],
            &["liver", "Down"],
            None,
            false,
        )
        .unwrap();

        let displayed: Vec<String> = report.rows.iter().map(|r| r.count.to_string()).collect();
        // liver: 32 -> 30, 20 -> 20; Down: 0 -> <=5, 3 -> <=5
        assert_eq!(displayed, vec!["30", "20", "<=5", "<=5"]);
    }

    #[test]
    fn test_substring_counts_merged() {
        let report = summarize_substrings(
            &risk_cohorts(),
            "Therapeutics",
            &["MOL1_high_risk_cohort", "SOT02_risk_cohorts"],
            &["liver", "Down"],
            None,
            true,
        )
        .unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].count.value(), Some(50));
        assert_eq!(report.rows[1].count.to_string(), "<=5");
    }
}
