//! Column-level overview of a table and its supplementary tables.
//!
//! The column list comes from the schema catalogue table. For each column
//! and each named filter the summary counts distinct values, missing values
//! and total rows. A column whose count query fails is retried once on a
//! bounded sample of the table, without the filter, and is marked as sampled.

use super::{SchemaFilter, SchemaSummaryOptions};
use crate::Result;
use crate::adapters::DataSource;
use crate::disclosure::{
    DisclosedCount, ROUNDING_BASE, SmallCount, add_percentage_column, round_and_suppress_count,
    round_to_nearest,
};
use crate::export::{Tabular, render_markdown};
use crate::models::{ResultSet, Value};
use crate::query::where_clause;
use serde::Serialize;
use std::fmt;

/// Catalogue table listing every table's columns.
pub const SCHEMA_CATALOGUE_TABLE: &str = "OpenSAFELYSchemaInformation";

/// Suffix used in file names for the filter without a predicate.
pub const UNFILTERED_SUFFIX: &str = "_unfiltered";

/// SQL listing the catalogue entries of `table`, and of its supplementary
/// tables when a separator is given.
pub fn build_catalogue_sql(table: &str, supplementary_separator: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT TableName, ColumnName, ColumnType, MaxLength, IsNullable FROM {} \
         WHERE TableName = '{}'",
        SCHEMA_CATALOGUE_TABLE, table
    );
    if let Some(separator) = supplementary_separator {
        sql.push_str(&format!(" OR TableName LIKE '{}{}%'", table, separator));
    }
    sql
}

fn count_select_list(column: &str) -> String {
    format!(
        "COUNT(DISTINCT {c}) AS distinct_values, \
         SUM(CASE WHEN {c} IS NULL THEN 1 ELSE 0 END) AS missing_values, \
         COUNT(*) AS total_rows",
        c = column
    )
}

/// SQL counting distinct, missing and total values of one column.
pub fn build_column_counts_sql(table: &str, column: &str, filter: Option<&str>) -> String {
    format!(
        "SELECT {} FROM {}{}",
        count_select_list(column),
        table,
        where_clause(filter)
    )
}

/// One catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogueEntry {
    /// Table the column belongs to
    pub table_name: String,
    /// Column name
    pub column_name: String,
    /// Declared type
    pub column_type: Value,
    /// Declared maximum length
    pub max_length: Value,
    /// Declared nullability
    pub is_nullable: Value,
}

fn read_catalogue(result: &ResultSet) -> Result<Vec<CatalogueEntry>> {
    let table = result.require_column("TableName")?;
    let column = result.require_column("ColumnName")?;
    let column_type = result.require_column("ColumnType")?;
    let max_length = result.require_column("MaxLength")?;
    let is_nullable = result.require_column("IsNullable")?;

    Ok((0..result.len())
        .map(|row| CatalogueEntry {
            table_name: result.value(row, table).to_string(),
            column_name: result.value(row, column).to_string(),
            column_type: result.value(row, column_type).clone(),
            max_length: result.value(row, max_length).clone(),
            is_nullable: result.value(row, is_nullable).clone(),
        })
        .collect())
}

/// Counts for one column under one filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCounts {
    /// Number of distinct non-missing values
    pub distinct_values: u64,
    /// Missing values: zero, `1-7`, or rounded to the nearest 5
    pub missing: SmallCount,
    /// Missing values as a percentage of the table's rounded total, or of
    /// the sample size for sampled counts
    pub missing_percentage: String,
    /// True when the counts come from a bounded sample without the filter
    pub sampled: bool,
}

/// One column of a table summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    /// Catalogue entry
    pub entry: CatalogueEntry,
    /// Counts aligned with [`TableSummary::filters`]
    pub counts: Vec<ColumnCounts>,
}

/// Row total of a table under one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableTotal {
    /// Rounded to the nearest 5
    pub rows: DisclosedCount,
    /// True when every column fell back to a sample, so `rows` is the
    /// sample size rather than the filtered total
    pub sampled: bool,
}

impl fmt::Display for TableTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sampled {
            write!(f, "(sample of {} rows)", self.rows)
        } else {
            write!(f, "{}", self.rows)
        }
    }
}

/// Summary of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Table name
    pub table: String,
    /// Filters the counts ran under
    pub filters: Vec<SchemaFilter>,
    /// Total rows per filter
    pub total_rows: Vec<TableTotal>,
    /// One entry per catalogue column
    pub columns: Vec<ColumnSummary>,
}

impl TableSummary {
    /// CSV file name: `schema_<table><filter suffixes>.csv`.
    pub fn export_file_name(&self) -> String {
        let suffixes: String = self
            .filters
            .iter()
            .map(|f| {
                if f.suffix.is_empty() {
                    UNFILTERED_SUFFIX
                } else {
                    f.suffix.as_str()
                }
            })
            .collect();
        format!("schema_{}_{}.csv", self.table, suffixes)
    }
}

impl Tabular for TableSummary {
    fn headers(&self) -> Vec<String> {
        let mut headers = vec![
            "TableName".to_string(),
            "ColumnName".to_string(),
            "ColumnType".to_string(),
            "MaxLength".to_string(),
            "IsNullable".to_string(),
        ];
        for filter in &self.filters {
            let s = &filter.suffix;
            headers.push(format!("Distinct_Values{}", s));
            headers.push(format!("Missing_Values{}", s));
            headers.push(format!("Missing_Values_Percentage{}", s));
            headers.push(format!("Sampled{}", s));
        }
        headers
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.columns
            .iter()
            .map(|column| {
                let mut record = vec![
                    column.entry.table_name.clone(),
                    column.entry.column_name.clone(),
                    column.entry.column_type.to_string(),
                    column.entry.max_length.to_string(),
                    column.entry.is_nullable.to_string(),
                ];
                for counts in &column.counts {
                    record.push(counts.distinct_values.to_string());
                    record.push(counts.missing.to_string());
                    record.push(counts.missing_percentage.clone());
                    record.push(if counts.sampled { "yes" } else { "" }.to_string());
                }
                record
            })
            .collect()
    }
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### {}\n", self.table)?;
        for (filter, total) in self.filters.iter().zip(&self.total_rows) {
            let name = if filter.suffix.is_empty() {
                "all rows"
            } else {
                filter.suffix.trim_start_matches('_')
            };
            writeln!(f, "- Total rows ({}): {}", name, total)?;
        }
        writeln!(f)?;
        f.write_str(&render_markdown(self))
    }
}

/// Result of [`schema_summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSummary {
    /// One summary per table found in the catalogue
    pub tables: Vec<TableSummary>,
}

impl fmt::Display for SchemaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in &self.tables {
            writeln!(f, "{}", table)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawCounts {
    distinct_values: u64,
    missing_values: u64,
    total_rows: u64,
    sampled: bool,
}

fn read_counts(result: &ResultSet, sampled: bool) -> Result<RawCounts> {
    let count = |name: &str| -> Result<u64> {
        let index = result.require_column(name)?;
        result.value(0, index).as_count().ok_or_else(|| {
            crate::error::SdcError::query_rejected(format!(
                "Column '{}' is not a non-negative count",
                name
            ))
        })
    };

    Ok(RawCounts {
        distinct_values: count("distinct_values")?,
        missing_values: count("missing_values")?,
        total_rows: count("total_rows")?,
        sampled,
    })
}

async fn column_counts(
    source: &dyn DataSource,
    table: &str,
    column: &str,
    filter: Option<&str>,
) -> Result<RawCounts> {
    let sql = build_column_counts_sql(table, column, filter);
    match source.fetch(&sql).await {
        Ok(result) => read_counts(&result, false),
        Err(e) => {
            let limit = source.config().sample_limit;
            tracing::warn!(
                "Counting {}.{} failed ({}); retrying on the first {} rows without filter",
                table,
                column,
                e,
                limit
            );
            let sample = source.dialect().limit_query(column, table, limit);
            let sql = format!("WITH a AS ({}) SELECT {} FROM a", sample, count_select_list(column));
            let result = source.fetch(&sql).await?;
            read_counts(&result, true)
        }
    }
}

fn disclose_table(
    table: &str,
    filters: &[SchemaFilter],
    entries: Vec<CatalogueEntry>,
    raw: &[Vec<RawCounts>],
) -> TableSummary {
    // a sampled count only saw the first rows without the filter, so the
    // total comes from the first column that ran under the filter
    let total_rows: Vec<TableTotal> = (0..filters.len())
        .map(|i| {
            let per_filter = move || raw.iter().filter_map(move |c| c.get(i));
            let (total, sampled) = per_filter()
                .find(|c| !c.sampled)
                .or_else(|| per_filter().next())
                .map_or((0, false), |c| (c.total_rows, c.sampled));
            TableTotal {
                rows: DisclosedCount::rounded(round_to_nearest(total, ROUNDING_BASE)),
                sampled,
            }
        })
        .collect();

    let columns = entries
        .into_iter()
        .zip(raw)
        .map(|(entry, per_filter)| {
            let counts = per_filter
                .iter()
                .zip(&total_rows)
                .map(|(raw, total)| {
                    let denominator = if raw.sampled {
                        round_to_nearest(raw.total_rows, ROUNDING_BASE)
                    } else {
                        total.rows.value_or_zero()
                    };
                    let missing = round_and_suppress_count(raw.missing_values);
                    let missing_percentage = add_percentage_column(&[missing], denominator)
                        .into_iter()
                        .next()
                        .unwrap_or_default();
                    ColumnCounts {
                        distinct_values: raw.distinct_values,
                        missing,
                        missing_percentage,
                        sampled: raw.sampled,
                    }
                })
                .collect();
            ColumnSummary { entry, counts }
        })
        .collect();

    TableSummary {
        table: table.to_string(),
        filters: filters.to_vec(),
        total_rows,
        columns,
    }
}

/// Summarizes every column of `table` (and its supplementary tables) under
/// each filter in `options`.
///
/// # Errors
/// Returns the catalogue query error, or a count query error that persists
/// on the sampled retry.
pub async fn schema_summary(
    source: &dyn DataSource,
    table: &str,
    options: &SchemaSummaryOptions,
) -> Result<SchemaSummary> {
    let catalogue = source
        .fetch(&build_catalogue_sql(
            table,
            options.supplementary_separator.as_deref(),
        ))
        .await?;
    let entries = read_catalogue(&catalogue)?;

    let mut table_names: Vec<String> = Vec::new();
    for entry in &entries {
        if !table_names.contains(&entry.table_name) {
            table_names.push(entry.table_name.clone());
        }
    }

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        let table_entries: Vec<CatalogueEntry> = entries
            .iter()
            .filter(|e| e.table_name == name)
            .cloned()
            .collect();
        tracing::info!("Summarizing {} columns of {}", table_entries.len(), name);

        let mut raw = Vec::with_capacity(table_entries.len());
        for entry in &table_entries {
            let mut per_filter = Vec::with_capacity(options.filters.len());
            for filter in &options.filters {
                per_filter.push(
                    column_counts(source, &name, &entry.column_name, filter.predicate.as_deref())
                        .await?,
                );
            }
            raw.push(per_filter);
        }

        tables.push(disclose_table(&name, &options.filters, table_entries, &raw));
    }

    Ok(SchemaSummary { tables })
}
