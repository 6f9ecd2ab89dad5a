//! Statistical disclosure control for counts.
//!
//! This module provides the suppression and rounding rules every report
//! passes through:
//! - **Row-level suppression**: counts at or below 7 are withheld
//! - **Rounding**: remaining counts go to the nearest multiple of 5
//! - **Cascading redaction**: small measures null their derived rate
//! - **Percentages**: computed from disclosed counts only
//!
//! The thresholds differ between call sites (5, 7 and 10) and are kept as
//! separate constants rather than unified.

mod percentage;
mod redact;
mod rounding;

// Re-export public API
pub use percentage::{add_percentage_column, format_percentage, percentage};
pub use redact::{MeasureTable, redact_small_numbers};
pub use rounding::{
    Disclosed, DisclosedCount, FREQUENCY_MIN_DISPLAY, REDACTION_THRESHOLD, ROUNDING_BASE,
    SUBSTRING_ROUNDING_BASE, SUPPRESSION_THRESHOLD, SmallCount, SuppressionOutcome,
    SuppressionPolicy, round_and_suppress_count, round_to_nearest, suppress_and_round,
};
