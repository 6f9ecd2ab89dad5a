//! Percentage columns derived from disclosed counts.

use super::rounding::SmallCount;

/// `100 * numerator / denominator` rounded to `decimals` places, `None` when
/// the denominator is zero.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn percentage(numerator: u64, denominator: u64, decimals: u32) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    let scale = 10f64.powi(decimals as i32);
    let value = 100.0 * numerator as f64 / denominator as f64;
    Some((value * scale).round_ties_even() / scale)
}

/// Renders a rounded percentage: whole numbers keep one decimal place
/// (`25.0`), others print as-is (`16.67`).
pub fn format_percentage(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Computes a percentage string for each numerator against a fixed
/// denominator.
///
/// Suppressed numerators and a zero denominator produce an empty string,
/// so the percentage never reveals a small count.
///
/// # Example
/// ```rust
/// use sdc_core::disclosure::{add_percentage_column, round_and_suppress_count};
///
/// let numerators = [10, 15, 3].map(round_and_suppress_count);
/// assert_eq!(add_percentage_column(&numerators, 60), vec!["16.67", "25.0", ""]);
/// ```
pub fn add_percentage_column(numerators: &[SmallCount], denominator: u64) -> Vec<String> {
    numerators
        .iter()
        .map(|numerator| {
            numerator
                .value()
                .and_then(|n| percentage(n, denominator, 2))
                .map(format_percentage)
                .unwrap_or_default()
        })
        .collect()
}
