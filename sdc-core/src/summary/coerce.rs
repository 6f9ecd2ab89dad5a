//! Explicit conversion of column values for pairwise comparison.
//!
//! Two columns are compared either as numbers or as dates. The comparison
//! mode is decided once per column pair from the kinds of their non-null
//! values; individual values that do not convert under that mode are
//! reported rather than silently coerced.

use crate::Result;
use crate::error::SdcError;
use crate::models::{Value, ValueKind};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%Y%m%d"];

/// How a pair of columns is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Numbers, differences as absolute values
    Numeric,
    /// Dates, differences in whole days
    Temporal,
}

/// Kind shared by every non-null value of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    /// Only nulls
    Empty,
    /// A single kind other than text
    Uniform(ValueKind),
    /// Only text, with what that text parses as
    Text(TextContent),
    /// Values of more than one kind
    Mixed,
}

/// What the values of a text-only column parse as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextContent {
    /// At least one value is a date or timestamp
    pub(crate) dates: bool,
    /// Every value is a number
    pub(crate) numbers: bool,
}

impl ColumnKind {
    /// Text mixed with numbers or dates takes the other kind; its values
    /// are converted one by one.
    pub(crate) fn of<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        use ValueKind::{Numeric, Temporal, Text};

        let mut kind = ColumnKind::Empty;
        let mut content = TextContent {
            dates: false,
            numbers: true,
        };
        for value in values {
            let value_kind = value.kind();
            if value_kind == ValueKind::Null {
                continue;
            }
            if let Value::Text(text) = value {
                content.dates |= parse_datetime(text).is_some();
                content.numbers &= parse_number(text).is_some();
            }
            kind = match (kind, value_kind) {
                (ColumnKind::Empty, k) => ColumnKind::Uniform(k),
                (ColumnKind::Uniform(k), v) if k == v => kind,
                (ColumnKind::Uniform(Text), k @ (Numeric | Temporal)) => ColumnKind::Uniform(k),
                (ColumnKind::Uniform(Numeric | Temporal), Text) => kind,
                _ => return ColumnKind::Mixed,
            };
        }

        match kind {
            ColumnKind::Uniform(Text) => ColumnKind::Text(content),
            other => other,
        }
    }

    fn describe(self) -> String {
        match self {
            ColumnKind::Empty => "empty".to_string(),
            ColumnKind::Uniform(kind) => kind.to_string(),
            ColumnKind::Text(content) if content.dates => "date text".to_string(),
            ColumnKind::Text(content) if content.numbers => "numeric text".to_string(),
            ColumnKind::Text(_) => "free text".to_string(),
            ColumnKind::Mixed => "mixed".to_string(),
        }
    }
}

/// Decides how two columns are compared.
///
/// Text is accepted opposite a numeric column when all of it holds
/// numbers, and opposite a date column when some of it holds dates (the
/// rest is reported as not comparable). Two text columns are compared as
/// dates when either holds dates, otherwise as numbers when both hold only
/// numbers. A column with no values takes the
/// mode of the other one.
///
/// # Errors
/// Returns [`SdcError::TypeIncompatible`] for booleans, mixed columns, free
/// text, or a numeric column against a date column.
pub(crate) fn comparison_mode(
    left_name: &str,
    left: ColumnKind,
    right_name: &str,
    right: ColumnKind,
) -> Result<ComparisonMode> {
    use ColumnKind::{Empty, Text, Uniform};
    use ValueKind::{Numeric, Temporal};

    let mode = match (left, right) {
        (Empty, Empty)
        | (Uniform(Numeric), Uniform(Numeric) | Empty)
        | (Empty, Uniform(Numeric)) => Some(ComparisonMode::Numeric),
        (Uniform(Numeric), Text(t)) | (Text(t), Uniform(Numeric)) if t.numbers => {
            Some(ComparisonMode::Numeric)
        }
        (Uniform(Temporal), Uniform(Temporal) | Empty) | (Empty, Uniform(Temporal)) => {
            Some(ComparisonMode::Temporal)
        }
        (Uniform(Temporal), Text(t)) | (Text(t), Uniform(Temporal)) if t.dates => {
            Some(ComparisonMode::Temporal)
        }
        (Text(l), Text(r)) if l.dates || r.dates => Some(ComparisonMode::Temporal),
        (Text(l), Text(r)) if l.numbers && r.numbers => Some(ComparisonMode::Numeric),
        (Text(t), Empty) | (Empty, Text(t)) if t.dates => Some(ComparisonMode::Temporal),
        (Text(t), Empty) | (Empty, Text(t)) if t.numbers => Some(ComparisonMode::Numeric),
        _ => None,
    };

    mode.ok_or_else(|| {
        SdcError::type_incompatible(
            left_name,
            right_name,
            format!(
                "{} values cannot be compared with {} values",
                left.describe(),
                right.describe()
            ),
        )
    })
}

/// A value converted for comparison.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub(crate) enum Comparable {
    Number(f64),
    Instant(NaiveDateTime),
}

impl Comparable {
    /// Converts a non-null value under `mode`, `None` if it does not convert.
    pub(crate) fn convert(value: &Value, mode: ComparisonMode) -> Option<Self> {
        match mode {
            ComparisonMode::Numeric => match value {
                Value::Text(s) => parse_number(s).map(Comparable::Number),
                other => other.as_f64().map(Comparable::Number),
            },
            ComparisonMode::Temporal => match value {
                Value::Date(d) => Some(Comparable::Instant(d.and_time(NaiveTime::MIN))),
                Value::DateTime(dt) => Some(Comparable::Instant(*dt)),
                Value::Text(s) => parse_datetime(s).map(Comparable::Instant),
                _ => None,
            },
        }
    }

    /// Absolute difference: plain for numbers, whole days for dates.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn difference(self, other: Self) -> Option<f64> {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => Some((a - b).abs()),
            (Comparable::Instant(a), Comparable::Instant(b)) => {
                Some((a - b).num_days().unsigned_abs() as f64)
            }
            _ => None,
        }
    }
}

/// Parses numeric text, ignoring surrounding whitespace.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses date or timestamp text in the common ISO and day-first layouts.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_column_kind() {
        let values = [Value::Null, Value::Int(1), Value::Float(2.0)];
        assert_eq!(ColumnKind::of(&values), ColumnKind::Uniform(ValueKind::Numeric));
        assert_eq!(ColumnKind::of(&[Value::Null]), ColumnKind::Empty);
        assert_eq!(
            ColumnKind::of(&[Value::from("ABC"), Value::Date(date(2022, 1, 3))]),
            ColumnKind::Uniform(ValueKind::Temporal)
        );
        assert_eq!(
            ColumnKind::of(&[Value::Int(1), Value::Date(date(2022, 1, 3))]),
            ColumnKind::Mixed
        );
    }

    fn text(values: &[&str]) -> ColumnKind {
        let values: Vec<Value> = values.iter().copied().map(Value::from).collect();
        ColumnKind::of(&values)
    }

    #[test]
    fn test_text_content() {
        assert_eq!(
            text(&["2022-01-03", "ABC"]),
            ColumnKind::Text(TextContent {
                dates: true,
                numbers: false
            })
        );
        assert_eq!(
            text(&["12", "15"]),
            ColumnKind::Text(TextContent {
                dates: false,
                numbers: true
            })
        );
        assert_eq!(
            text(&["12", "Sotrovimab"]),
            ColumnKind::Text(TextContent {
                dates: false,
                numbers: false
            })
        );
    }

    #[test]
    fn test_comparison_modes() {
        let numeric = ColumnKind::Uniform(ValueKind::Numeric);
        let temporal = ColumnKind::Uniform(ValueKind::Temporal);
        let dates = text(&["2022-01-03"]);
        let numbers = text(&["12"]);

        assert_eq!(
            comparison_mode("a", numeric, "b", numbers).unwrap(),
            ComparisonMode::Numeric
        );
        assert_eq!(
            comparison_mode("a", temporal, "b", dates).unwrap(),
            ComparisonMode::Temporal
        );
        assert_eq!(
            comparison_mode("a", dates, "b", text(&["ABC"])).unwrap(),
            ComparisonMode::Temporal
        );
        assert_eq!(
            comparison_mode("a", numbers, "b", text(&["15"])).unwrap(),
            ComparisonMode::Numeric
        );
        assert_eq!(
            comparison_mode("a", ColumnKind::Empty, "b", temporal).unwrap(),
            ComparisonMode::Temporal
        );
    }

    #[test]
    fn test_free_text_is_incompatible() {
        let free = text(&["Sotrovimab"]);
        let err = comparison_mode("Intervention", free, "FormName", text(&["Molnupiravir"]))
            .unwrap_err();
        assert!(err.to_string().contains("free text values cannot be compared"));

        let numbers = text(&["12"]);
        assert!(comparison_mode("a", numbers, "b", free).is_err());
        assert!(
            comparison_mode("a", ColumnKind::Uniform(ValueKind::Temporal), "b", numbers)
                .is_err()
        );
        assert!(
            comparison_mode("a", ColumnKind::Uniform(ValueKind::Numeric), "b", free).is_err()
        );
    }

    #[test]
    fn test_incompatible_kinds_name_both_columns() {
        let err = comparison_mode(
            "AgeAtReceivedDate",
            ColumnKind::Uniform(ValueKind::Numeric),
            "Received",
            ColumnKind::Uniform(ValueKind::Temporal),
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("AgeAtReceivedDate"));
        assert!(message.contains("Received"));
        assert!(message.contains("numeric values cannot be compared with date values"));
        assert!(message.ends_with("Check dtypes"));
    }

    #[test]
    fn test_convert_values() {
        assert_eq!(
            Comparable::convert(&Value::from(" 12.5 "), ComparisonMode::Numeric),
            Some(Comparable::Number(12.5))
        );
        assert_eq!(
            Comparable::convert(&Value::from("twelve"), ComparisonMode::Numeric),
            None
        );
        assert_eq!(
            Comparable::convert(&Value::from("2022-01-03"), ComparisonMode::Temporal),
            Some(Comparable::Instant(date(2022, 1, 3).and_time(NaiveTime::MIN)))
        );
        assert_eq!(
            Comparable::convert(&Value::from("03/01/2022"), ComparisonMode::Temporal),
            Some(Comparable::Instant(date(2022, 1, 3).and_time(NaiveTime::MIN)))
        );
        assert_eq!(
            Comparable::convert(&Value::Int(3), ComparisonMode::Temporal),
            None
        );
    }

    #[test]
    fn test_difference_in_days() {
        let a = Comparable::Instant(date(2022, 1, 3).and_hms_opt(18, 0, 0).unwrap());
        let b = Comparable::Instant(date(2022, 1, 1).and_time(NaiveTime::MIN));
        assert_eq!(a.difference(b), Some(2.0));
        assert_eq!(b.difference(a), Some(2.0));
        assert_eq!(
            Comparable::Number(3.0).difference(Comparable::Number(7.5)),
            Some(4.5)
        );
    }
}
