//! Property-based tests for the suppression and rounding engine.
//!
//! These check that no small count can reach a displayed value, whatever
//! the input rows are.

use proptest::prelude::*;
use sdc_core::disclosure::{
    MeasureTable, REDACTION_THRESHOLD, ROUNDING_BASE, SUPPRESSION_THRESHOLD, SmallCount,
    SuppressionPolicy, add_percentage_column, redact_small_numbers, round_and_suppress_count,
    round_to_nearest, suppress_and_round,
};

fn labelled_counts() -> impl Strategy<Value = Vec<(usize, u64)>> {
    prop::collection::vec(0u64..500, 0..40)
        .prop_map(|counts| counts.into_iter().enumerate().collect())
}

proptest! {
    #[test]
    fn prop_rounding_is_a_nearby_multiple(count in 0u64..1_000_000) {
        let rounded = round_to_nearest(count, ROUNDING_BASE);
        prop_assert_eq!(rounded % ROUNDING_BASE, 0);
        prop_assert!(rounded.abs_diff(count) <= ROUNDING_BASE / 2);
        prop_assert_eq!(round_to_nearest(rounded, ROUNDING_BASE), rounded);
    }

    #[test]
    fn prop_every_row_is_kept_or_suppressed_once(rows in labelled_counts()) {
        let outcome = suppress_and_round(rows.clone(), &SuppressionPolicy::default());

        prop_assert_eq!(outcome.len(), rows.len());
        prop_assert_eq!(outcome.kept_count() + outcome.suppressed_count(), rows.len());

        for (disclosed, (label, raw)) in outcome.rows().iter().zip(&rows) {
            prop_assert_eq!(disclosed.label, *label);
            prop_assert_eq!(disclosed.is_suppressed(), *raw <= SUPPRESSION_THRESHOLD);
        }
    }

    #[test]
    fn prop_kept_counts_are_rounded_and_large(rows in labelled_counts()) {
        let outcome = suppress_and_round(rows, &SuppressionPolicy::default());

        for (_, count) in outcome.kept() {
            prop_assert_eq!(count % ROUNDING_BASE, 0);
            prop_assert!(count > SUPPRESSION_THRESHOLD);
        }
        prop_assert!(outcome.displayed().iter().all(|row| !row.is_suppressed()));
    }

    #[test]
    fn prop_small_counts_never_display(count in 0u64..200) {
        let small = round_and_suppress_count(count);
        match count {
            0 => prop_assert_eq!(small.value(), Some(0)),
            c if c <= SUPPRESSION_THRESHOLD => {
                prop_assert!(small.is_suppressed());
                prop_assert_eq!(small.to_string(), "1-7");
            }
            _ => prop_assert_eq!(small.value(), Some(round_to_nearest(count, ROUNDING_BASE))),
        }
    }

    #[test]
    fn prop_percentages_hide_suppressed_numerators(
        counts in prop::collection::vec(0u64..100, 1..20),
        denominator in 1u64..1000,
    ) {
        let numerators: Vec<SmallCount> =
            counts.iter().copied().map(round_and_suppress_count).collect();
        let percentages = add_percentage_column(&numerators, denominator);

        for (numerator, pct) in numerators.iter().zip(&percentages) {
            prop_assert_eq!(numerator.is_suppressed(), pct.is_empty());
        }
    }

    #[test]
    fn prop_redaction_cascades_to_rate(
        rows in prop::collection::vec((0u32..60, 1u32..400), 1..20),
    ) {
        let mut table = MeasureTable::new(
            vec!["numerator".to_string(), "denominator".to_string(), "rate".to_string()],
            "rate",
        ).unwrap();
        for (numerator, denominator) in &rows {
            let rate = f64::from(*numerator) / f64::from(*denominator);
            table.push_row(vec![
                Some(f64::from(*numerator)),
                Some(f64::from(*denominator)),
                Some(rate),
            ]).unwrap();
        }

        let redacted = redact_small_numbers(&table, REDACTION_THRESHOLD);
        for row in redacted.rows() {
            let measures_present = row[0].is_some() && row[1].is_some();
            prop_assert_eq!(row[2].is_some(), measures_present);
            for cell in row[..2].iter().flatten() {
                prop_assert!(*cell > 5.0);
                prop_assert_eq!(cell % 5.0, 0.0);
            }
        }
    }
}
