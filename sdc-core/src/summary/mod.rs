//! Disclosure-controlled summaries of database tables.
//!
//! Each summary issues grouped count queries through a [`DataSource`],
//! passes every count through [`crate::disclosure`], and returns a report
//! that is safe to display or export.
//!
//! # Module Structure
//! - `schema`: column-level overview from the schema catalogue
//! - `distinct`: distinct values of single columns
//! - `compare`: pairwise comparison of two columns
//! - `multiple`: keys with more than one record
//! - `problem_dates`: malformed date strings
//! - `strings`: distinct tokens and substring counts in free text
//!
//! [`DataSource`]: crate::adapters::DataSource

mod coerce;
mod compare;
mod distinct;
mod multiple;
mod problem_dates;
mod schema;
mod stats;
mod strings;

use serde::{Deserialize, Serialize};

pub use coerce::ComparisonMode;
pub use compare::{
    ComparisonOutcome, ComparisonReport, ComparisonRow, classify_pair, compare_two_values,
    summarize_comparison,
};
pub use distinct::{
    DistinctSummary, DistinctValuesReport, FrequencyRow, ValueCount, distinct_values,
    summarize_distinct_values,
};
pub use multiple::{
    DEFAULT_KEY_FIELD, MultipleRecordsReport, NONE_OF_THESE, build_multiple_records_sql,
    multiple_records,
};
pub use problem_dates::{
    DateClassifier, DateProblem, NULL_PLACEHOLDER, ProblemDatesReport, ProblemSummary,
    ProblemSummaryTable, ProblemValue, problem_dates, summarize_problem_dates,
};
pub use schema::{
    CatalogueEntry, ColumnCounts, ColumnSummary, SCHEMA_CATALOGUE_TABLE, SchemaSummary,
    TableSummary, TableTotal, UNFILTERED_SUFFIX, build_catalogue_sql, build_column_counts_sql, schema_summary,
};
pub use stats::{median, quantile, quartiles};
pub use strings::{
    DistinctStrings, DistinctStringsReport, SubstringCount, SubstringCountsReport,
    count_substrings, identify_distinct_strings, substring_policy, summarize_distinct_strings,
    summarize_substrings,
};

/// Heading suffix naming the filter a report ran under.
pub(crate) fn format_filter(filter: Option<&str>) -> String {
    match filter {
        Some(f) if !f.trim().is_empty() => format!(" ({})", f.trim()),
        _ => String::new(),
    }
}

/// Options for [`distinct_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctValuesOptions {
    /// List values when at most this many survive suppression
    pub threshold: usize,
    /// Show rounded counts next to listed values
    pub include_counts: bool,
    /// Sort a listing with counts by value rather than by count
    pub sort_by_value: bool,
    /// Always show the frequency-of-counts table
    pub frequency_count: bool,
}

impl Default for DistinctValuesOptions {
    fn default() -> Self {
        Self {
            threshold: 1,
            include_counts: true,
            sort_by_value: false,
            frequency_count: false,
        }
    }
}

impl DistinctValuesOptions {
    /// Builder method to set the listing threshold.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Builder method to show or hide counts in listings.
    pub fn with_include_counts(mut self, include_counts: bool) -> Self {
        self.include_counts = include_counts;
        self
    }

    /// Builder method to sort listings by value.
    pub fn with_sort_by_value(mut self, sort_by_value: bool) -> Self {
        self.sort_by_value = sort_by_value;
        self
    }

    /// Builder method to force the frequency-of-counts table.
    pub fn with_frequency_count(mut self, frequency_count: bool) -> Self {
        self.frequency_count = frequency_count;
        self
    }
}

/// Options for [`problem_dates`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDatesOptions {
    /// Year fragments a valid date contains, matched literally
    pub valid_years: Vec<String>,
    /// Only report the per-problem roll-up
    pub summary_only: bool,
}

impl Default for ProblemDatesOptions {
    fn default() -> Self {
        Self {
            valid_years: vec!["202".to_string(), "21".to_string(), "22".to_string()],
            summary_only: false,
        }
    }
}

impl ProblemDatesOptions {
    /// Builder method to set the valid year fragments.
    pub fn with_valid_years(mut self, valid_years: Vec<String>) -> Self {
        self.valid_years = valid_years;
        self
    }

    /// Builder method to report the roll-up only.
    pub fn with_summary_only(mut self, summary_only: bool) -> Self {
        self.summary_only = summary_only;
        self
    }
}

/// Options for [`identify_distinct_strings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringSplitOptions {
    /// Substring removed from every value before splitting
    pub replacement: String,
    /// Delimiter between tokens; empty means no split
    pub split_on: String,
    /// Merge the tokens of all columns into one list
    pub merge_all: bool,
}

impl StringSplitOptions {
    /// Builder method to set the removed substring.
    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }

    /// Builder method to set the delimiter.
    pub fn with_split_on(mut self, split_on: impl Into<String>) -> Self {
        self.split_on = split_on.into();
        self
    }

    /// Builder method to merge all columns.
    pub fn with_merge_all(mut self, merge_all: bool) -> Self {
        self.merge_all = merge_all;
        self
    }
}

/// A named filter of a schema summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFilter {
    /// Suffix appended to column headers, e.g. `_non_hospitalised`
    pub suffix: String,
    /// Predicate fragment, `None` for all rows
    pub predicate: Option<String>,
}

impl SchemaFilter {
    /// A filter with a predicate.
    pub fn new(suffix: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            predicate: Some(predicate.into()),
        }
    }

    /// The filter over all rows, with an empty suffix.
    pub fn unfiltered() -> Self {
        Self {
            suffix: String::new(),
            predicate: None,
        }
    }
}

/// Options for [`schema_summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummaryOptions {
    /// Filters to count under, in header order
    pub filters: Vec<SchemaFilter>,
    /// Include tables named `<table><separator>...`
    pub supplementary_separator: Option<String>,
}

impl Default for SchemaSummaryOptions {
    fn default() -> Self {
        Self {
            filters: vec![SchemaFilter::unfiltered()],
            supplementary_separator: None,
        }
    }
}

impl SchemaSummaryOptions {
    /// Builder method to add a filter.
    pub fn with_filter(mut self, filter: SchemaFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Builder method to include supplementary tables.
    pub fn with_supplementary_separator(mut self, separator: impl Into<String>) -> Self {
        self.supplementary_separator = Some(separator.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let distinct = DistinctValuesOptions::default();
        assert_eq!(distinct.threshold, 1);
        assert!(distinct.include_counts);

        let dates = ProblemDatesOptions::default();
        assert_eq!(dates.valid_years, vec!["202", "21", "22"]);

        let schema = SchemaSummaryOptions::default().with_filter(SchemaFilter::new(
            "_non_hospitalised",
            "COVID_indication='non_hospitalised'",
        ));
        assert_eq!(schema.filters.len(), 2);
        assert_eq!(schema.filters[0], SchemaFilter::unfiltered());
    }

    #[test]
    fn test_format_filter() {
        assert_eq!(format_filter(None), "");
        assert_eq!(format_filter(Some(" ")), "");
        assert_eq!(format_filter(Some("Region='London'")), " (Region='London')");
    }
}
