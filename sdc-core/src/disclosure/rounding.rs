//! Row-level suppression and rounding of counts.
//!
//! Every count that leaves the core goes through this module. The display
//! types ([`DisclosedCount`], [`SmallCount`]) cannot be built from a raw
//! count outside the crate, so a report cannot carry an unsuppressed value.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Counts at or below this value are suppressed.
pub const SUPPRESSION_THRESHOLD: u64 = 7;

/// Counts that survive suppression are rounded to a multiple of this.
pub const ROUNDING_BASE: u64 = 5;

/// Frequency-of-counts tables only show frequencies above this value.
pub const FREQUENCY_MIN_DISPLAY: u64 = 5;

/// Substring occurrence counts are rounded to a multiple of this.
pub const SUBSTRING_ROUNDING_BASE: u64 = 10;

/// Default threshold for [`crate::disclosure::redact_small_numbers`].
pub const REDACTION_THRESHOLD: u64 = 5;

/// Rounds `count` to the nearest multiple of `base`, ties to even.
///
/// A `base` of zero leaves the count unchanged.
///
/// # Example
/// ```rust
/// use sdc_core::disclosure::round_to_nearest;
///
/// assert_eq!(round_to_nearest(12, 5), 10);
/// assert_eq!(round_to_nearest(13, 5), 15);
/// assert_eq!(round_to_nearest(25, 10), 20);
/// assert_eq!(round_to_nearest(35, 10), 40);
/// ```
pub fn round_to_nearest(count: u64, base: u64) -> u64 {
    if base == 0 {
        return count;
    }

    let quotient = count / base;
    let remainder = count % base;
    let rounded_up = match remainder.cmp(&(base - remainder)) {
        Ordering::Greater => true,
        Ordering::Equal => quotient % 2 == 1,
        Ordering::Less => false,
    };

    let quotient = if rounded_up { quotient + 1 } else { quotient };
    quotient.saturating_mul(base)
}

/// A count that has been through the suppression/rounding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisclosedCount {
    /// Count above the threshold, rounded to the policy's base
    #[non_exhaustive]
    Rounded(u64),
    /// Count at or below the threshold; the value is withheld
    #[non_exhaustive]
    Redacted {
        /// Threshold the count fell under
        threshold: u64,
    },
}

impl DisclosedCount {
    pub(crate) fn rounded(value: u64) -> Self {
        DisclosedCount::Rounded(value)
    }

    pub(crate) fn redacted(threshold: u64) -> Self {
        DisclosedCount::Redacted { threshold }
    }

    /// The rounded count, or `None` when redacted.
    pub fn value(&self) -> Option<u64> {
        match self {
            DisclosedCount::Rounded(v) => Some(*v),
            DisclosedCount::Redacted { .. } => None,
        }
    }

    /// True when the count was withheld.
    pub fn is_redacted(&self) -> bool {
        matches!(self, DisclosedCount::Redacted { .. })
    }

    /// Value used when summing displayed counts; redacted counts add nothing.
    pub fn value_or_zero(&self) -> u64 {
        self.value().unwrap_or(0)
    }
}

impl fmt::Display for DisclosedCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisclosedCount::Rounded(v) => write!(f, "{}", v),
            DisclosedCount::Redacted { threshold } => write!(f, "<={}", threshold),
        }
    }
}

impl Serialize for DisclosedCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DisclosedCount::Rounded(v) => serializer.serialize_u64(*v),
            DisclosedCount::Redacted { .. } => serializer.collect_str(self),
        }
    }
}

/// A numerator for percentage columns: zero, a rounded count, or the `1-7`
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmallCount {
    /// Zero or a count rounded to the nearest 5
    #[non_exhaustive]
    Count(u64),
    /// Between 1 and 7 records; displays as `1-7`
    Suppressed,
}

impl SmallCount {
    /// The displayable count, `None` for the sentinel.
    pub fn value(&self) -> Option<u64> {
        match self {
            SmallCount::Count(v) => Some(*v),
            SmallCount::Suppressed => None,
        }
    }

    /// True for the `1-7` sentinel.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, SmallCount::Suppressed)
    }
}

impl fmt::Display for SmallCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmallCount::Count(v) => write!(f, "{}", v),
            SmallCount::Suppressed => write!(f, "1-{}", SUPPRESSION_THRESHOLD),
        }
    }
}

impl Serialize for SmallCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SmallCount::Count(v) => serializer.serialize_u64(*v),
            SmallCount::Suppressed => serializer.collect_str(self),
        }
    }
}

/// Maps a raw count onto a [`SmallCount`]: zero stays zero, 1 to 7 becomes
/// the `1-7` sentinel, anything larger is rounded to the nearest 5.
pub fn round_and_suppress_count(count: u64) -> SmallCount {
    match count {
        0 => SmallCount::Count(0),
        c if c <= SUPPRESSION_THRESHOLD => SmallCount::Suppressed,
        c => SmallCount::Count(round_to_nearest(c, ROUNDING_BASE)),
    }
}

/// Parameters of row-level suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuppressionPolicy {
    /// Rows with a raw count at or below this are suppressed
    pub threshold: u64,
    /// Kept counts are rounded to a multiple of this
    pub rounding_base: u64,
    /// Keep suppressed rows in the displayed output as redacted placeholders
    pub keep_suppressed: bool,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            threshold: SUPPRESSION_THRESHOLD,
            rounding_base: ROUNDING_BASE,
            keep_suppressed: false,
        }
    }
}

impl SuppressionPolicy {
    /// Creates the default policy (threshold 7, nearest 5, drop suppressed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the suppression threshold.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Builder method to set the rounding base.
    pub fn with_rounding_base(mut self, rounding_base: u64) -> Self {
        self.rounding_base = rounding_base;
        self
    }

    /// Builder method to keep suppressed rows as redacted placeholders.
    pub fn with_keep_suppressed(mut self, keep_suppressed: bool) -> Self {
        self.keep_suppressed = keep_suppressed;
        self
    }

    /// Applies the policy to a single raw count.
    pub fn disclose(&self, count: u64) -> DisclosedCount {
        if count <= self.threshold {
            DisclosedCount::redacted(self.threshold)
        } else {
            DisclosedCount::rounded(round_to_nearest(count, self.rounding_base))
        }
    }
}

/// A labelled row after suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disclosed<T> {
    /// Row identity (value, field name, category, ...)
    pub label: T,
    /// Rounded count or redaction marker
    pub count: DisclosedCount,
}

impl<T> Disclosed<T> {
    /// True when the row fell at or below the threshold.
    pub fn is_suppressed(&self) -> bool {
        self.count.is_redacted()
    }
}

/// Every input row exactly once, in input order, either kept (rounded) or
/// suppressed (count withheld).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionOutcome<T> {
    rows: Vec<Disclosed<T>>,
    policy: SuppressionPolicy,
}

impl<T> SuppressionOutcome<T> {
    /// All rows, kept and suppressed, in input order.
    pub fn rows(&self) -> &[Disclosed<T>] {
        &self.rows
    }

    /// Policy the rows were disclosed under.
    pub fn policy(&self) -> &SuppressionPolicy {
        &self.policy
    }

    /// Kept rows with their rounded counts.
    pub fn kept(&self) -> impl Iterator<Item = (&T, u64)> + '_ {
        self.rows
            .iter()
            .filter_map(|row| row.count.value().map(|v| (&row.label, v)))
    }

    /// Number of kept rows.
    pub fn kept_count(&self) -> usize {
        self.rows.iter().filter(|row| !row.is_suppressed()).count()
    }

    /// Identities of suppressed rows. Their counts are not available.
    pub fn suppressed_labels(&self) -> impl Iterator<Item = &T> + '_ {
        self.rows
            .iter()
            .filter(|row| row.is_suppressed())
            .map(|row| &row.label)
    }

    /// Number of suppressed rows.
    pub fn suppressed_count(&self) -> usize {
        self.rows.len() - self.kept_count()
    }

    /// Rows for display: kept rows, plus suppressed placeholders when the
    /// policy keeps them.
    pub fn displayed(&self) -> Vec<&Disclosed<T>> {
        self.rows
            .iter()
            .filter(|row| self.policy.keep_suppressed || !row.is_suppressed())
            .collect()
    }

    /// Consumes the outcome, returning the rows for display.
    pub fn into_displayed(self) -> Vec<Disclosed<T>> {
        let keep = self.policy.keep_suppressed;
        self.rows
            .into_iter()
            .filter(|row| keep || !row.is_suppressed())
            .collect()
    }

    /// Total number of input rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there were no input rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Suppresses rows whose raw count is at or below the policy threshold and
/// rounds the rest.
///
/// Membership of each row depends only on its raw count and the threshold.
///
/// # Example
/// ```rust
/// use sdc_core::disclosure::{suppress_and_round, SuppressionPolicy};
///
/// let rows = vec![("Molnupiravir", 42), ("Remdesivir", 3)];
/// let outcome = suppress_and_round(rows, &SuppressionPolicy::default());
///
/// assert_eq!(outcome.kept().collect::<Vec<_>>(), vec![(&"Molnupiravir", 40)]);
/// assert_eq!(outcome.suppressed_labels().collect::<Vec<_>>(), vec![&"Remdesivir"]);
/// ```
pub fn suppress_and_round<T, I>(rows: I, policy: &SuppressionPolicy) -> SuppressionOutcome<T>
where
    I: IntoIterator<Item = (T, u64)>,
{
    let rows = rows
        .into_iter()
        .map(|(label, count)| Disclosed {
            label,
            count: policy.disclose(count),
        })
        .collect();

    SuppressionOutcome {
        rows,
        policy: *policy,
    }
}
