//! Period rollover job.

use chrono::{DateTime, Utc};
use pt_core::{
    DEFAULT_PERIOD_DAYS, DayBoundary, PeriodSnapshot, RolloverPolicy, UserId, UserSettings,
    due_periods,
};
use pt_db::Database;
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Rollover tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverConfig {
    /// Period length given to users seen for the first time.
    pub default_period_days: i64,
    pub policy: RolloverPolicy,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            default_period_days: DEFAULT_PERIOD_DAYS,
            policy: RolloverPolicy::default(),
        }
    }
}

/// What one rollover run did for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverOutcome {
    /// Snapshots written by this run, oldest first. Empty when nothing was due.
    pub snapshots: Vec<PeriodSnapshot>,
    pub current_period_start: DateTime<Utc>,
}

/// Closes the user's elapsed period(s) as of `now`.
///
/// Settings are created on first use with the period starting at the
/// beginning of the current logical day. Each closed period is committed on
/// its own; if another run already advanced the period, this run stops
/// without writing.
pub fn run_rollover(
    db: &mut Database,
    user: &UserId,
    now: DateTime<Utc>,
    config: &RolloverConfig,
    days: &DayBoundary,
) -> Result<RolloverOutcome, TrackerError> {
    let initial = UserSettings::initial(user.clone(), config.default_period_days, now, days)?;
    let settings = db.load_or_create_settings(&initial, now)?;

    let mut outcome = RolloverOutcome {
        snapshots: Vec::new(),
        current_period_start: settings.current_period_start,
    };
    let windows = due_periods(&settings, now, config.policy, days);
    if windows.is_empty() {
        tracing::debug!(
            user = %user,
            period_end = ?settings.period_end(),
            "period still open"
        );
        return Ok(outcome);
    }

    for window in windows {
        let summaries = db.summaries_between(user, window.start_date, window.end_date)?;
        let snapshot = PeriodSnapshot::from_summaries(user.clone(), &window, &summaries, now);
        if !db.commit_rollover(&snapshot, window.start, window.end, now)? {
            tracing::info!(
                user = %user,
                start = %window.start_date,
                "period already rolled over elsewhere"
            );
            break;
        }
        tracing::info!(
            user = %user,
            start = %snapshot.start_date,
            end = %snapshot.end_date,
            work_seconds = snapshot.total_work_seconds,
            break_seconds = snapshot.total_break_seconds,
            days_tracked = snapshot.days_tracked,
            "period snapshot created"
        );
        outcome.current_period_start = window.end;
        outcome.snapshots.push(snapshot);
    }
    Ok(outcome)
}
