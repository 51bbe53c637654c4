//! Retention sweeper.
//!
//! Prunes raw rows and ledger idempotency keys older than the retention
//! horizon. Daily summaries and period snapshots are never touched.
//! Categories are swept independently: a failure is logged and recorded,
//! and the remaining categories still run.

use chrono::{DateTime, NaiveDate, Utc};
use pt_core::{DayBoundary, RetentionPolicy, SweepCategory, SweepReport, UserId};
use pt_db::{Database, DbError};

/// The deletes the sweeper needs from storage.
pub trait RetentionStore {
    fn delete_timers_created_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError>;

    fn delete_transactions_dated_before(
        &self,
        user: &UserId,
        cutoff: NaiveDate,
    ) -> Result<usize, DbError>;

    fn delete_done_tasks_updated_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError>;

    fn delete_ledger_keys_applied_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError>;
}

impl RetentionStore for Database {
    fn delete_timers_created_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        Self::delete_timers_created_before(self, user, cutoff)
    }

    fn delete_transactions_dated_before(
        &self,
        user: &UserId,
        cutoff: NaiveDate,
    ) -> Result<usize, DbError> {
        Self::delete_transactions_dated_before(self, user, cutoff)
    }

    fn delete_done_tasks_updated_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        Self::delete_done_tasks_updated_before(self, user, cutoff)
    }

    fn delete_ledger_keys_applied_before(
        &self,
        user: &UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        Self::delete_ledger_keys_applied_before(self, user, cutoff)
    }
}

/// Sweeps every category for one user.
pub fn run_sweep<S: RetentionStore + ?Sized>(
    store: &S,
    user: &UserId,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
    days: &DayBoundary,
) -> SweepReport {
    let cutoff = policy.cutoff(now);
    let cutoff_date = policy.cutoff_date(now, days);
    let mut report = SweepReport::default();

    for category in SweepCategory::ALL {
        let result = match category {
            SweepCategory::Timers => store.delete_timers_created_before(user, cutoff),
            SweepCategory::Transactions => {
                store.delete_transactions_dated_before(user, cutoff_date)
            }
            SweepCategory::CompletedTasks => store.delete_done_tasks_updated_before(user, cutoff),
            SweepCategory::LedgerKeys => store.delete_ledger_keys_applied_before(user, cutoff),
        };
        match result {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(
                        user = %user,
                        category = %category,
                        deleted,
                        "swept expired rows"
                    );
                }
                report.record(category, deleted);
            }
            Err(err) => {
                tracing::error!(user = %user, category = %category, error = %err, "sweep failed");
                report.fail(category, err.to_string());
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pt_core::{Timer, TimerAction};

    use super::*;

    /// Fails on transactions and succeeds everywhere else.
    struct FlakyStore;

    impl RetentionStore for FlakyStore {
        fn delete_timers_created_before(
            &self,
            _: &UserId,
            _: DateTime<Utc>,
        ) -> Result<usize, DbError> {
            Ok(2)
        }

        fn delete_transactions_dated_before(
            &self,
            _: &UserId,
            _: NaiveDate,
        ) -> Result<usize, DbError> {
            Err(DbError::InvalidData {
                context: "transactions".to_string(),
                message: "table is locked".to_string(),
            })
        }

        fn delete_done_tasks_updated_before(
            &self,
            _: &UserId,
            _: DateTime<Utc>,
        ) -> Result<usize, DbError> {
            Ok(1)
        }

        fn delete_ledger_keys_applied_before(
            &self,
            _: &UserId,
            _: DateTime<Utc>,
        ) -> Result<usize, DbError> {
            Ok(7)
        }
    }

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    #[test]
    fn a_failing_category_does_not_block_the_others() {
        let report = run_sweep(
            &FlakyStore,
            &user(),
            Utc::now(),
            &RetentionPolicy::default(),
            &DayBoundary::default(),
        );
        assert_eq!(report.timers_deleted, 2);
        assert_eq!(report.completed_tasks_deleted, 1);
        assert_eq!(report.ledger_keys_deleted, 7);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].category, SweepCategory::Transactions);
    }

    #[test]
    fn sweeps_database_rows_past_the_horizon() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let days = DayBoundary::default();
        let now = Utc::now();
        let old = Timer::start(user(), None, vec![], now - Duration::days(91));
        let fresh = Timer::start(user(), None, vec![], now - Duration::days(1));
        db.insert_timer(&old).unwrap();
        let stopped = old
            .apply(TimerAction::Stop, now - Duration::days(90) - Duration::hours(23))
            .unwrap();
        db.update_timer(&stopped).unwrap();
        db.insert_timer(&fresh).unwrap();
        let day = days.day_of(stopped.timer.start_time);
        for contribution in &stopped.contributions {
            db.apply_contribution(&user(), day, contribution, stopped.timer.updated_at)
                .unwrap();
        }

        let report = run_sweep(&db, &user(), now, &RetentionPolicy::default(), &days);
        assert!(report.is_clean());
        assert_eq!(report.timers_deleted, 1);
        assert_eq!(report.ledger_keys_deleted, 1);
        assert!(db.daily_summary(&user(), day).unwrap().is_some());
        assert!(db.get_timer(&old.id).unwrap().is_none());
        assert!(db.get_timer(&fresh.id).unwrap().is_some());
    }
}
