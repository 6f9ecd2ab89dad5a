//! Cascading suppression for measure tables.

use serde::Serialize;

use crate::error::SdcError;
use crate::Result;

/// A table of numeric measures (numerators, denominators) with one derived
/// rate column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureTable {
    columns: Vec<String>,
    rate_column: usize,
    rows: Vec<Vec<Option<f64>>>,
}

impl MeasureTable {
    /// Creates an empty table.
    ///
    /// # Errors
    /// Returns a configuration error if `rate_column` is not one of `columns`.
    pub fn new(columns: Vec<String>, rate_column: &str) -> Result<Self> {
        let rate_column = columns
            .iter()
            .position(|c| c == rate_column)
            .ok_or_else(|| {
                SdcError::configuration(format!(
                    "Rate column '{}' is not one of the table columns",
                    rate_column
                ))
            })?;

        Ok(Self {
            columns,
            rate_column,
            rows: Vec::new(),
        })
    }

    /// Appends a row of cells aligned with the columns.
    ///
    /// # Errors
    /// Returns a configuration error if the row length does not match.
    pub fn push_row(&mut self, row: Vec<Option<f64>>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(SdcError::configuration(format!(
                "Row has {} cells but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder form of [`MeasureTable::push_row`].
    ///
    /// # Errors
    /// Returns a configuration error if the row length does not match.
    pub fn with_row(mut self, row: Vec<Option<f64>>) -> Result<Self> {
        self.push_row(row)?;
        Ok(self)
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Name of the rate column.
    pub fn rate_column(&self) -> &str {
        &self.columns[self.rate_column]
    }

    /// Rows of cells; `None` is a missing or redacted value.
    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    /// All cells of a named column.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }
}

/// Rounds every non-rate column to the nearest 5 and redacts small values.
///
/// A rounded value at or below `n` (so zero, and `n` itself when it is a
/// multiple of 5) becomes missing. Any row with a missing measure cell,
/// redacted here or missing on input, has its rate cell removed too, so a
/// small numerator cannot be recovered from the displayed rate.
///
/// The input table is not modified.
///
/// # Example
/// ```rust
/// use sdc_core::disclosure::{redact_small_numbers, MeasureTable, REDACTION_THRESHOLD};
///
/// let table = MeasureTable::new(
///     vec!["numerator".into(), "denominator".into(), "rate".into()],
///     "rate",
/// )?
/// .with_row(vec![Some(2.0), Some(50.0), Some(0.04)])?
/// .with_row(vec![Some(12.0), Some(50.0), Some(0.24)])?;
///
/// let redacted = redact_small_numbers(&table, REDACTION_THRESHOLD);
/// assert_eq!(redacted.rows()[0], vec![None, Some(50.0), None]);
/// assert_eq!(redacted.rows()[1], vec![Some(10.0), Some(50.0), Some(0.24)]);
/// # Ok::<(), sdc_core::SdcError>(())
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn redact_small_numbers(table: &MeasureTable, n: u64) -> MeasureTable {
    let threshold = n as f64;
    let rate = table.rate_column;

    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut out: Vec<Option<f64>> = row
                .iter()
                .enumerate()
                .map(|(index, cell)| {
                    if index == rate {
                        return *cell;
                    }
                    cell.map(|v| (v / 5.0).round_ties_even() * 5.0)
                        .filter(|rounded| *rounded > threshold)
                })
                .collect();

            let any_missing = out
                .iter()
                .enumerate()
                .any(|(index, cell)| index != rate && cell.is_none());
            if any_missing {
                out[rate] = None;
            }
            out
        })
        .collect();

    MeasureTable {
        columns: table.columns.clone(),
        rate_column: rate,
        rows,
    }
}
