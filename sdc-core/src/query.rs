//! Grouped count queries.
//!
//! Every summary starts from one of these: a `SELECT cols, COUNT(*) AS
//! row_count ... GROUP BY cols` over a table (or a left join of two tables),
//! optionally filtered by a predicate fragment. Table names, columns and
//! predicates are trusted input and are passed through unchanged.

use crate::Result;
use crate::adapters::DataSource;
use crate::error::SdcError;
use crate::models::{AggregateResult, ROW_COUNT_COLUMN};

/// Builds the `WHERE` clause for an optional predicate fragment.
pub(crate) fn where_clause(filter: Option<&str>) -> String {
    match filter.map(str::trim) {
        Some(predicate) if !predicate.is_empty() => format!(" WHERE {}", predicate),
        _ => String::new(),
    }
}

/// SQL for a grouped count over one table.
///
/// # Example
/// ```rust
/// use sdc_core::query::build_simple_sql;
///
/// assert_eq!(
///     build_simple_sql("Therapeutics", &["Region"], Some("COVID_indication='non_hospitalised'")),
///     "SELECT Region, COUNT(*) AS row_count FROM Therapeutics \
///      WHERE COVID_indication='non_hospitalised' GROUP BY Region"
/// );
/// ```
pub fn build_simple_sql(table: &str, columns: &[&str], filter: Option<&str>) -> String {
    let cols = columns.join(", ");
    format!(
        "SELECT {}, COUNT(*) AS {} FROM {}{} GROUP BY {}",
        cols,
        ROW_COUNT_COLUMN,
        table,
        where_clause(filter),
        cols
    )
}

/// SQL for a grouped count over two columns, from one table or from a left
/// join of two tables on `join_on`.
///
/// # Errors
/// Returns a configuration error if:
/// - two tables are given without a join key
/// - more than two tables, or other than two columns, are given
pub fn build_joined_pair_sql(
    tables: &[&str],
    columns: &[&str],
    join_on: Option<&str>,
    filter: Option<&str>,
) -> Result<String> {
    if tables.len() > 2 || columns.len() > 2 {
        return Err(SdcError::configuration(
            "Reduce number of tables/columns to 2 each",
        ));
    }
    let [first, second] = columns else {
        return Err(SdcError::configuration("Exactly 2 columns must be supplied"));
    };

    match tables {
        [table] => Ok(build_simple_sql(table, &[*first, *second], filter)),
        [left, right] => {
            let key = join_on
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    SdcError::configuration("Must supply join key ('join_on') for multiple tables")
                })?;
            Ok(format!(
                "SELECT t1.{a} AS {a}, t2.{b} AS {b}, COUNT(*) AS {count} \
                 FROM {left} t1 LEFT JOIN {right} t2 ON t1.{key} = t2.{key}{filter} \
                 GROUP BY t1.{a}, t2.{b}",
                a = first,
                b = second,
                count = ROW_COUNT_COLUMN,
                left = left,
                right = right,
                key = key,
                filter = where_clause(filter),
            ))
        }
        _ => Err(SdcError::configuration("At least one table must be supplied")),
    }
}

/// Counts records per distinct combination of `columns` in `table`.
///
/// # Errors
/// Returns error if no columns are given or the query fails.
pub async fn simple_sql(
    source: &dyn DataSource,
    table: &str,
    columns: &[&str],
    filter: Option<&str>,
) -> Result<AggregateResult> {
    if columns.is_empty() {
        return Err(SdcError::configuration("At least one column must be supplied"));
    }

    let sql = build_simple_sql(table, columns, filter);
    let result = source.fetch(&sql).await?;
    AggregateResult::from_result_set(result)
}

/// Counts records per distinct pair of values, joining two tables when two
/// are given.
///
/// # Errors
/// Returns a configuration error for a missing join key or wrong arity, or
/// the query error.
pub async fn joined_pair_sql(
    source: &dyn DataSource,
    tables: &[&str],
    columns: &[&str],
    join_on: Option<&str>,
    filter: Option<&str>,
) -> Result<AggregateResult> {
    let sql = build_joined_pair_sql(tables, columns, join_on, filter)?;
    let result = source.fetch(&sql).await?;
    AggregateResult::from_result_set(result)
}
