//! Contractor compliance tests
//!
//! Property-based tests for the weekly check cycle:
//! - Property: every date belongs to exactly one Monday-to-Sunday week
//! - Property: the streak never exceeds the checked weeks
//! - Property: compliance percentage stays within 0-100

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;
use rust_decimal::Decimal;

use shared::{
    build_history, compliance_percent, current_streak, recent_weeks, week_end, week_label,
    week_start,
};

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..20_000).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap() + Duration::days(offset)
    })
}

proptest! {
    /// Property: the week of a date starts on a Monday on or before it and
    /// ends on the Sunday on or after it
    #[test]
    fn test_week_contains_date(date in date_strategy()) {
        let start = week_start(date);
        let end = week_end(start);
        prop_assert_eq!(start.weekday(), Weekday::Mon);
        prop_assert_eq!(end.weekday(), Weekday::Sun);
        prop_assert!(start <= date && date <= end);
        prop_assert_eq!(week_start(end), start);
    }

    /// Property: days of the same week share a label
    #[test]
    fn test_week_label_stable(date in date_strategy(), day in 0i64..7) {
        let start = week_start(date);
        prop_assert_eq!(week_label(start), week_label(start + Duration::days(day)));
    }

    /// Property: recent weeks are consecutive Mondays, newest first
    #[test]
    fn test_recent_weeks_consecutive(date in date_strategy(), count in 1u32..60) {
        let weeks = recent_weeks(date, count);
        prop_assert_eq!(weeks.len(), count as usize);
        prop_assert_eq!(weeks[0], week_start(date));
        for pair in weeks.windows(2) {
            prop_assert_eq!(pair[0] - pair[1], Duration::weeks(1));
        }
    }

    /// Property: the streak is bounded by the number of checked weeks
    #[test]
    fn test_streak_bounded(
        today in date_strategy(),
        checked in prop::collection::vec(any::<bool>(), 1..30),
    ) {
        let weeks = recent_weeks(today, checked.len() as u32);
        let checks: Vec<(NaiveDate, bool)> = weeks
            .iter()
            .zip(&checked)
            .filter(|(_, c)| **c)
            .map(|(w, _)| (*w, true))
            .collect();
        let history = build_history(&weeks, &checks);

        let streak = current_streak(&history);
        prop_assert!(streak as usize <= checks.len());
        prop_assert_eq!(history.iter().filter(|m| m.checked).count(), checks.len());
    }

    /// Property: percentage stays within bounds
    #[test]
    fn test_percent_bounded(checked in 0i64..500, total in 0i64..500) {
        let pct = compliance_percent(checked, total);
        prop_assert!(pct >= Decimal::ZERO);
        prop_assert!(pct <= Decimal::from(100));
    }
}

#[cfg(test)]
mod streak_tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_week_does_not_break_streak() {
        let weeks = recent_weeks(date(2026, 10, 21), 4);
        // Current week not yet checked, previous three checked
        let checks = vec![(weeks[1], true), (weeks[2], false), (weeks[3], true)];
        let history = build_history(&weeks, &checks);
        assert_eq!(current_streak(&history), 3);
    }

    #[test]
    fn test_missed_week_breaks_streak() {
        let weeks = recent_weeks(date(2026, 10, 21), 4);
        let checks = vec![(weeks[0], true), (weeks[2], true), (weeks[3], true)];
        let history = build_history(&weeks, &checks);
        assert_eq!(current_streak(&history), 1);
        assert_eq!(history[2].passed, Some(true));
        assert_eq!(history[1].passed, None);
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(compliance_percent(1, 3), Decimal::new(3333, 2));
        assert_eq!(compliance_percent(0, 0), Decimal::from(100));
    }
}
