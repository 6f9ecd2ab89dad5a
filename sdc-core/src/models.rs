//! Tabular data model shared by the query layer and the summaries.
//!
//! A data source returns a [`ResultSet`] of [`Value`] cells. Grouped count
//! queries are reshaped into an [`AggregateResult`], whose counts are raw and
//! must pass through [`crate::disclosure`] before they reach any report.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::SdcError;
use crate::Result;

/// Name of the count column every grouped query produces.
pub const ROW_COUNT_COLUMN: &str = "row_count";

/// A single scalar cell returned by a data source.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean / bit column
    Bool(bool),
    /// Integer column
    Int(i64),
    /// Floating point or decimal column
    Float(f64),
    /// Character data
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Timestamp without time zone (zoned timestamps are normalized to UTC)
    DateTime(NaiveDateTime),
}

/// Broad category of a value, used when deciding whether two columns can be
/// compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// No value
    Null,
    /// Boolean
    Bool,
    /// Integer or floating point
    Numeric,
    /// Character data
    Text,
    /// Date or timestamp
    Temporal,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "boolean",
            ValueKind::Numeric => "numeric",
            ValueKind::Text => "text",
            ValueKind::Temporal => "date",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the broad category of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) | Value::Float(_) => ValueKind::Numeric,
            Value::Text(_) => ValueKind::Text,
            Value::Date(_) | Value::DateTime(_) => ValueKind::Temporal,
        }
    }

    /// Numeric view of the value, if it is a number.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of the value, if it is character data.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interprets the value as a non-negative count.
    ///
    /// Drivers disagree on the type of `COUNT(*)` and `SUM(...)`; integral
    /// floats are accepted, NULL counts as zero.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Null => Some(0),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Truncates timestamps to their date; every other value is unchanged.
    pub fn truncate_to_date(&self) -> Value {
        match self {
            Value::DateTime(dt) => Value::Date(dt.date()),
            other => other.clone(),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self.kind() {
            ValueKind::Null => 0,
            ValueKind::Bool => 1,
            ValueKind::Numeric => 2,
            ValueKind::Text => 3,
            ValueKind::Temporal => 4,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Date(_) => 5,
            Value::DateTime(_) => 6,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order: nulls first, then booleans, numbers, text and dates. Numbers
/// compare by magnitude across integer and float; ties between variants
/// are broken by variant so the order stays consistent with equality.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_kind = self.kind_rank().cmp(&other.kind_rank());
        if by_kind != Ordering::Equal {
            return by_kind;
        }

        let by_content = match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Date(a), Value::DateTime(b)) => a.and_time(chrono::NaiveTime::MIN).cmp(b),
            (Value::DateTime(a), Value::Date(b)) => a.cmp(&b.and_time(chrono::NaiveTime::MIN)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            },
        };

        by_content.then_with(|| self.variant_rank().cmp(&other.variant_rank()))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Rows returned by a data source, with their column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// Column names in select-list order
    pub columns: Vec<String>,
    /// Row values, each the same length as `columns`
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Creates an empty result with the given column names.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Like [`ResultSet::column_index`], failing with a query error.
    ///
    /// # Errors
    /// Returns an error if the column is not part of the result.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            SdcError::query_rejected(format!("Column '{}' missing from query result", name))
        })
    }

    /// Cell at (row, column), NULL when out of range.
    pub fn value(&self, row: usize, column: usize) -> &Value {
        const NULL: &Value = &Value::Null;
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(NULL)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One distinct combination of grouped values with its raw record count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    /// Grouped values, aligned with [`AggregateResult::columns`]
    pub values: Vec<Value>,
    /// True, unrounded count of underlying records
    pub row_count: u64,
}

impl AggregateRow {
    /// Creates a row from its grouped values and raw count.
    pub fn new(values: Vec<Value>, row_count: u64) -> Self {
        Self { values, row_count }
    }

    /// Grouped value at `index`, NULL when out of range.
    pub fn value(&self, index: usize) -> &Value {
        const NULL: &Value = &Value::Null;
        self.values.get(index).unwrap_or(NULL)
    }
}

/// Result of a grouped count query: one row per distinct value combination.
///
/// Counts are raw. Nothing in this type is fit for display until it has been
/// through the suppression/rounding engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    /// Grouped column names (the count column is not included)
    pub columns: Vec<String>,
    /// Rows in the order returned by the data source
    pub rows: Vec<AggregateRow>,
}

impl AggregateResult {
    /// Creates an aggregate over the given grouped columns.
    pub fn new(columns: Vec<String>, rows: Vec<AggregateRow>) -> Self {
        Self { columns, rows }
    }

    /// Splits a raw result set into grouped values and the `row_count` column.
    ///
    /// # Errors
    /// Returns an error if the count column is missing or holds a value that
    /// is not a non-negative integer.
    pub fn from_result_set(result: ResultSet) -> Result<Self> {
        let count_index = result.require_column(ROW_COUNT_COLUMN)?;

        let columns = result
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != count_index)
            .map(|(_, c)| c.clone())
            .collect();

        let mut rows = Vec::with_capacity(result.rows.len());
        for mut values in result.rows {
            if count_index >= values.len() {
                return Err(SdcError::query_rejected("Short row in grouped query result"));
            }
            let count = values.remove(count_index);
            let row_count = count.as_count().ok_or_else(|| {
                SdcError::query_rejected(format!(
                    "Column '{}' is not a non-negative count",
                    ROW_COUNT_COLUMN
                ))
            })?;
            rows.push(AggregateRow { values, row_count });
        }

        Ok(Self { columns, rows })
    }

    /// Position of a grouped column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Like [`AggregateResult::column_index`], failing with a query error.
    ///
    /// # Errors
    /// Returns an error if the column was not grouped.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            SdcError::query_rejected(format!("Column '{}' missing from query result", name))
        })
    }

    /// Number of distinct combinations.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the query matched no records.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of raw counts.
    pub fn total(&self) -> u64 {
        self.rows.iter().map(|r| r.row_count).sum()
    }

    /// Regroups on a single column after mapping its values, summing counts.
    ///
    /// First-seen order of the mapped values is preserved.
    ///
    /// # Errors
    /// Returns an error if the column was not grouped.
    pub fn regroup<F>(&self, column: &str, map: F) -> Result<Vec<(Value, u64)>>
    where
        F: Fn(&Value) -> Value,
    {
        let index = self.require_column(column)?;
        let mut order: Vec<Value> = Vec::new();
        let mut totals: std::collections::HashMap<Value, u64> = std::collections::HashMap::new();

        for row in &self.rows {
            let key = map(row.value(index));
            match totals.get_mut(&key) {
                Some(total) => *total += row.row_count,
                None => {
                    totals.insert(key.clone(), row.row_count);
                    order.push(key);
                }
            }
        }

        Ok(order
            .into_iter()
            .map(|key| {
                let count = totals.get(&key).copied().unwrap_or(0);
                (key, count)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::from("Molnupiravir").to_string(), "Molnupiravir");
        assert_eq!(Value::Date(date(2022, 1, 3)).to_string(), "2022-01-03");
        let dt = date(2022, 1, 3).and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2022-01-03 10:30:00");
    }

    #[test]
    fn test_value_ordering() {
        let mut values = vec![
            Value::from("b"),
            Value::Int(3),
            Value::Null,
            Value::Float(2.5),
            Value::from("a"),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Float(2.5),
                Value::Int(3),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_int_and_float_are_distinct_but_ordered() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert!(Value::Int(1) < Value::Float(1.0));
        assert!(Value::Float(0.5) < Value::Int(1));
    }

    #[test]
    fn test_as_count() {
        assert_eq!(Value::Int(12).as_count(), Some(12));
        assert_eq!(Value::Float(12.0).as_count(), Some(12));
        assert_eq!(Value::Null.as_count(), Some(0));
        assert_eq!(Value::Int(-1).as_count(), None);
        assert_eq!(Value::Float(1.5).as_count(), None);
        assert_eq!(Value::from("12").as_count(), None);
    }

    #[test]
    fn test_aggregate_from_result_set() {
        let result = ResultSet {
            columns: vec!["Intervention".to_string(), "row_count".to_string()],
            rows: vec![
                vec![Value::from("Sotrovimab"), Value::Int(40)],
                vec![Value::Null, Value::Int(3)],
            ],
        };

        let aggregate = AggregateResult::from_result_set(result).unwrap();
        assert_eq!(aggregate.columns, vec!["Intervention".to_string()]);
        assert_eq!(aggregate.len(), 2);
        assert_eq!(aggregate.rows[0].row_count, 40);
        assert_eq!(aggregate.total(), 43);
    }

    #[test]
    fn test_aggregate_requires_count_column() {
        let result = ResultSet::new(vec!["Intervention".to_string()]);
        assert!(AggregateResult::from_result_set(result).is_err());
    }

    #[test]
    fn test_regroup_truncated_dates() {
        let d = date(2022, 1, 3);
        let aggregate = AggregateResult::new(
            vec!["Received".to_string()],
            vec![
                AggregateRow::new(vec![Value::DateTime(d.and_hms_opt(9, 0, 0).unwrap())], 6),
                AggregateRow::new(vec![Value::DateTime(d.and_hms_opt(17, 0, 0).unwrap())], 4),
                AggregateRow::new(vec![Value::Null], 2),
            ],
        );

        let regrouped = aggregate
            .regroup("received", Value::truncate_to_date)
            .unwrap();
        assert_eq!(regrouped, vec![(Value::Date(d), 10), (Value::Null, 2)]);
    }
}
