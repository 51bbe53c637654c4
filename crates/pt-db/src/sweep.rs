//! Retention deletes. Each runs on its own so one failing category leaves the
//! others untouched.

use chrono::{DateTime, NaiveDate, Utc};
use pt_core::{TaskStatus, TimerStatus, UserId};
use rusqlite::params;

use crate::{Database, DbError, format_date, format_timestamp};

impl Database {
    /// Deletes the user's completed timers created before `cutoff`.
    ///
    /// Live timers are kept whatever their age: their work reaches the ledger
    /// only when they stop.
    pub fn delete_timers_created_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "DELETE FROM timers WHERE user_id = ? AND status = ? AND created_at < ?",
            params![
                user.as_str(),
                TimerStatus::Completed.as_str(),
                format_timestamp(cutoff)
            ],
        )?)
    }

    /// Deletes the user's transactions dated before `cutoff`.
    pub fn delete_transactions_dated_before(
        &self,
        user: &UserId,
        cutoff: NaiveDate,
    ) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "DELETE FROM transactions WHERE user_id = ? AND date < ?",
            params![user.as_str(), format_date(cutoff)],
        )?)
    }

    /// Deletes the user's done tasks last updated before `cutoff`.
    pub fn delete_done_tasks_updated_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "DELETE FROM tasks WHERE user_id = ? AND status = ? AND updated_at < ?",
            params![
                user.as_str(),
                TaskStatus::Done.as_str(),
                format_timestamp(cutoff)
            ],
        )?)
    }

    /// Deletes the user's idempotency keys applied before `cutoff`.
    ///
    /// The summary rows those keys fed are left as they are.
    pub fn delete_ledger_keys_applied_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "DELETE FROM ledger_events WHERE user_id = ? AND applied_at < ?",
            params![user.as_str(), format_timestamp(cutoff)],
        )?)
    }
}
