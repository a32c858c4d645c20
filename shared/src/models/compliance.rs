//! Contractor vehicle compliance: the weekly check cycle
//!
//! Every active contractor vehicle must be checked once per ISO week. Weeks
//! are identified by their Monday.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Sunday closing the week that starts on `week_start`
pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

/// ISO week label, e.g. `2026-W07`
pub fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// The `count` most recent week starts ending with the week of `today`,
/// newest first
pub fn recent_weeks(today: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let current = week_start(today);
    (0..count)
        .map(|i| current - Duration::weeks(i64::from(i)))
        .collect()
}

/// One week in a vehicle's compliance history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeekMarker {
    pub week_start: NaiveDate,
    pub label: String,
    pub checked: bool,
    pub passed: Option<bool>,
}

/// Build history markers for `weeks` (newest first) from the week starts
/// that have a check and their pass flag
pub fn build_history(weeks: &[NaiveDate], checks: &[(NaiveDate, bool)]) -> Vec<WeekMarker> {
    weeks
        .iter()
        .map(|week| {
            let check = checks.iter().find(|(w, _)| w == week);
            WeekMarker {
                week_start: *week,
                label: week_label(*week),
                checked: check.is_some(),
                passed: check.map(|(_, passed)| *passed),
            }
        })
        .collect()
}

/// Consecutive checked weeks counting back from the newest marker.
///
/// The current week does not break the streak while it is still open; it
/// only adds to it once checked.
pub fn current_streak(history: &[WeekMarker]) -> u32 {
    let mut iter = history.iter().peekable();
    let mut streak = 0;
    if let Some(first) = iter.peek() {
        if !first.checked {
            iter.next();
        }
    }
    for marker in iter {
        if !marker.checked {
            break;
        }
        streak += 1;
    }
    streak
}

/// Percentage of vehicles checked, rounded to two places. An empty fleet is
/// fully compliant.
pub fn compliance_percent(checked: i64, total: i64) -> Decimal {
    if total <= 0 {
        return Decimal::from(100);
    }
    (Decimal::from(checked.min(total)) * Decimal::from(100) / Decimal::from(total)).round_dp(2)
}
