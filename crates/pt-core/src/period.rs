//! Period planning and snapshots.
//!
//! Each user has a rolling window of `period_length_days`. When the window
//! has elapsed, the daily summaries it covers are folded into one immutable
//! [`PeriodSnapshot`] and the window advances.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::DayBoundary;
use crate::ledger::DailySummary;
use crate::types::{UserId, ValidationError};

/// Period length used when a user has no settings yet.
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

/// Longest accepted period, about a century.
pub const MAX_PERIOD_DAYS: i64 = 36_500;

/// Upper bound on windows planned in one catch-up run.
const MAX_CATCH_UP_PERIODS: usize = 1000;

/// How many elapsed periods a single rollover run closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolloverPolicy {
    /// At most one period per run; a long-idle user catches up one period per day.
    #[default]
    Single,
    /// Every elapsed period, one snapshot each.
    CatchUp,
}

impl RolloverPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::CatchUp => "catch-up",
        }
    }
}

impl fmt::Display for RolloverPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-user period configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user: UserId,
    pub period_length_days: i64,
    /// Advances only on rollover.
    pub current_period_start: DateTime<Utc>,
}

/// Checks that a period length lies in `1..=MAX_PERIOD_DAYS`.
pub const fn validate_period_length(days: i64) -> Result<i64, ValidationError> {
    if days < 1 || days > MAX_PERIOD_DAYS {
        return Err(ValidationError::InvalidPeriodLength { days });
    }
    Ok(days)
}

impl UserSettings {
    pub fn new(
        user: UserId,
        period_length_days: i64,
        current_period_start: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_period_length(period_length_days)?;
        Ok(Self {
            user,
            period_length_days,
            current_period_start,
        })
    }

    /// Settings for a user seen for the first time: the period starts at the
    /// beginning of their current logical day.
    pub fn initial(
        user: UserId,
        period_length_days: i64,
        now: DateTime<Utc>,
        days: &DayBoundary,
    ) -> Result<Self, ValidationError> {
        Self::new(user, period_length_days, days.start_of_day(now))
    }

    /// End of the current period; `None` if it falls outside the representable range.
    #[must_use]
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        let length = Duration::try_days(self.period_length_days)?;
        self.current_period_start.checked_add_signed(length)
    }
}

/// One elapsed period, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl PeriodWindow {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>, days: &DayBoundary) -> Self {
        Self {
            start,
            end,
            start_date: days.day_of(start),
            end_date: days.day_of(end),
        }
    }

    /// Whether a daily row keyed by `date` belongs to this window.
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date < self.end_date
    }
}

/// Windows that have elapsed as of `now`, oldest first.
///
/// Empty when the current period is still open.
#[must_use]
pub fn due_periods(
    settings: &UserSettings,
    now: DateTime<Utc>,
    policy: RolloverPolicy,
    days: &DayBoundary,
) -> Vec<PeriodWindow> {
    let Some(length) = Duration::try_days(settings.period_length_days.max(1)) else {
        return Vec::new();
    };
    let limit = match policy {
        RolloverPolicy::Single => 1,
        RolloverPolicy::CatchUp => MAX_CATCH_UP_PERIODS,
    };

    let mut windows = Vec::new();
    let mut start = settings.current_period_start;
    while windows.len() < limit {
        let Some(end) = start.checked_add_signed(length) else {
            break;
        };
        if now < end {
            break;
        }
        windows.push(PeriodWindow::new(start, end, days));
        start = end;
    }
    windows
}

/// Immutable rollup of the daily summaries in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSnapshot {
    pub user: UserId,
    pub start_date: NaiveDate,
    /// Exclusive.
    pub end_date: NaiveDate,
    pub total_work_seconds: i64,
    pub total_break_seconds: i64,
    /// Mean productivity score of the covered days; absent when none were tracked.
    pub average_productivity: Option<f64>,
    pub completed_tasks_count: i64,
    pub days_tracked: i64,
    pub created_at: DateTime<Utc>,
}

impl PeriodSnapshot {
    /// Folds the summaries that fall inside `window`; rows outside it are ignored.
    #[must_use]
    pub fn from_summaries(
        user: UserId,
        window: &PeriodWindow,
        summaries: &[DailySummary],
        now: DateTime<Utc>,
    ) -> Self {
        let covered: Vec<&DailySummary> = summaries
            .iter()
            .filter(|s| s.user == user && window.covers(s.date))
            .collect();

        let days_tracked = i64::try_from(covered.len()).unwrap_or(i64::MAX);
        let score_sum: u32 = covered.iter().map(|s| u32::from(s.productivity_score)).sum();
        #[expect(
            clippy::cast_precision_loss,
            reason = "day counts are far below f64's exact integer range"
        )]
        let average_productivity =
            (days_tracked > 0).then(|| f64::from(score_sum) / days_tracked as f64);

        Self {
            user,
            start_date: window.start_date,
            end_date: window.end_date,
            total_work_seconds: covered.iter().map(|s| s.total_work_seconds).sum(),
            total_break_seconds: covered.iter().map(|s| s.total_break_seconds).sum(),
            average_productivity,
            completed_tasks_count: covered.iter().map(|s| s.completed_tasks_count).sum(),
            days_tracked,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    fn settings_from(start: &str) -> UserSettings {
        let days = DayBoundary::default();
        UserSettings::new(user(), DEFAULT_PERIOD_DAYS, days.start_of(day(start))).unwrap()
    }

    fn summary(date: &str, work: i64, brk: i64, tasks: i64, score: u8) -> DailySummary {
        DailySummary {
            total_work_seconds: work,
            total_break_seconds: brk,
            completed_tasks_count: tasks,
            productivity_score: score,
            ..DailySummary::empty(user(), day(date))
        }
    }

    #[test]
    fn rejects_non_positive_period_length() {
        let now = Utc::now();
        assert!(matches!(
            UserSettings::new(user(), 0, now),
            Err(ValidationError::InvalidPeriodLength { days: 0 })
        ));
        assert!(UserSettings::new(user(), -3, now).is_err());
    }

    #[test]
    fn rejects_period_lengths_beyond_the_maximum() {
        let now = Utc::now();
        assert!(UserSettings::new(user(), MAX_PERIOD_DAYS, now).is_ok());
        assert!(matches!(
            UserSettings::new(user(), 1_000_000_000_000, now),
            Err(ValidationError::InvalidPeriodLength { .. })
        ));
        assert!(UserSettings::initial(user(), i64::MAX, now, &DayBoundary::default()).is_err());
    }

    #[test]
    fn out_of_range_settings_plan_nothing() {
        let days = DayBoundary::default();
        // pub fields allow bypassing validation, e.g. rows written by another version
        let settings = UserSettings {
            period_length_days: 1_000_000_000_000,
            ..settings_from("2024-01-01")
        };
        assert!(settings.period_end().is_none());
        assert!(due_periods(&settings, Utc::now(), RolloverPolicy::CatchUp, &days).is_empty());
    }

    #[test]
    fn initial_settings_start_at_local_midnight() {
        let days = DayBoundary::from_utc_offset_minutes(60).unwrap();
        let now = DateTime::parse_from_rfc3339("2024-05-01T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let settings = UserSettings::initial(user(), 30, now, &days).unwrap();
        // 23:30Z is 00:30 on May 2nd at +01:00
        assert_eq!(days.day_of(settings.current_period_start), day("2024-05-02"));
        assert_eq!(
            settings.current_period_start,
            DateTime::parse_from_rfc3339("2024-05-01T23:00:00Z").unwrap()
        );
    }

    #[test]
    fn nothing_is_due_before_the_period_ends() {
        let days = DayBoundary::default();
        let settings = settings_from("2024-01-01");
        let day_29 = days.start_of(day("2024-01-30"));
        assert!(due_periods(&settings, day_29, RolloverPolicy::Single, &days).is_empty());
        assert!(due_periods(&settings, day_29, RolloverPolicy::CatchUp, &days).is_empty());
    }

    #[test]
    fn period_is_due_exactly_at_its_end() {
        let days = DayBoundary::default();
        let settings = settings_from("2024-01-01");
        let day_30 = days.start_of(day("2024-01-31"));
        let due = due_periods(&settings, day_30, RolloverPolicy::Single, &days);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].start_date, day("2024-01-01"));
        assert_eq!(due[0].end_date, day("2024-01-31"));
        assert_eq!(Some(due[0].end), settings.period_end());
    }

    #[test]
    fn catch_up_plans_every_elapsed_period() {
        let days = DayBoundary::default();
        let settings = settings_from("2024-01-01");
        let later = days.start_of(day("2024-04-05"));

        assert_eq!(
            due_periods(&settings, later, RolloverPolicy::Single, &days).len(),
            1
        );
        let due = due_periods(&settings, later, RolloverPolicy::CatchUp, &days);
        assert_eq!(due.len(), 3);
        assert_eq!(due[1].start, due[0].end);
        assert_eq!(due[2].end_date, day("2024-03-31"));
    }

    #[test]
    fn snapshot_sums_rows_inside_the_window_only() {
        let days = DayBoundary::default();
        let settings = settings_from("2024-01-01");
        let window = due_periods(
            &settings,
            days.start_of(day("2024-01-31")),
            RolloverPolicy::Single,
            &days,
        )[0];

        let rows = vec![
            summary("2023-12-31", 999, 999, 9, 90),
            summary("2024-01-01", 3600, 600, 2, 90),
            summary("2024-01-15", 1800, 0, 1, 100),
            summary("2024-01-30", 60, 60, 0, 50),
            summary("2024-01-31", 999, 999, 9, 10),
        ];
        let now = Utc::now();
        let snapshot = PeriodSnapshot::from_summaries(user(), &window, &rows, now);

        assert_eq!(snapshot.total_work_seconds, 5460);
        assert_eq!(snapshot.total_break_seconds, 660);
        assert_eq!(snapshot.completed_tasks_count, 3);
        assert_eq!(snapshot.days_tracked, 3);
        assert_eq!(snapshot.average_productivity, Some(80.0));
        assert_eq!(snapshot.created_at, now);
    }

    #[test]
    fn empty_period_has_no_average() {
        let days = DayBoundary::default();
        let settings = settings_from("2024-01-01");
        let window = due_periods(
            &settings,
            days.start_of(day("2024-02-01")),
            RolloverPolicy::Single,
            &days,
        )[0];
        let snapshot = PeriodSnapshot::from_summaries(user(), &window, &[], Utc::now());
        assert_eq!(snapshot.total_work_seconds, 0);
        assert_eq!(snapshot.days_tracked, 0);
        assert!(snapshot.average_productivity.is_none());
    }

    #[test]
    fn policy_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&RolloverPolicy::CatchUp).unwrap(),
            "\"catch-up\""
        );
        assert_eq!(RolloverPolicy::default(), RolloverPolicy::Single);
    }
}
