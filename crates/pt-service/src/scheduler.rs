//! Daily scheduler.
//!
//! Once a day, at a fixed wall-clock time in the configured day boundary,
//! runs rollover then sweep for every known user. Each user runs on the
//! blocking pool under a timeout; an error, panic or timeout is logged with
//! the user's ID and the run moves on to the next user.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use pt_core::{DayBoundary, RetentionPolicy, SweepReport, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{JobFailure, SchedulerUserFailure, TrackerError};
use crate::rollover::{RolloverConfig, RolloverOutcome, run_rollover};
use crate::store::Store;
use crate::sweeper::run_sweep;

/// Enumerates the users the daily run covers.
pub trait UserDirectory: Send + Sync {
    fn list_users(&self) -> Result<Vec<UserId>, TrackerError>;
}

/// The per-user work of a daily run. Both steps are synchronous and run on
/// the blocking pool.
pub trait DailyJobs: Send + Sync + 'static {
    fn rollover(&self, user: &UserId, now: DateTime<Utc>) -> Result<RolloverOutcome, TrackerError>;
    fn sweep(&self, user: &UserId, now: DateTime<Utc>) -> Result<SweepReport, TrackerError>;
}

/// Scheduler timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Local wall-clock time of the daily run.
    pub run_at: NaiveTime,
    pub per_user_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::MIN,
            per_user_timeout_secs: 30,
        }
    }
}

/// Daily jobs backed by the SQLite store.
#[derive(Debug, Clone)]
pub struct StoreJobs {
    store: Store,
    rollover: RolloverConfig,
    retention: RetentionPolicy,
    days: DayBoundary,
}

impl StoreJobs {
    pub const fn new(
        store: Store,
        rollover: RolloverConfig,
        retention: RetentionPolicy,
        days: DayBoundary,
    ) -> Self {
        Self {
            store,
            rollover,
            retention,
            days,
        }
    }
}

impl UserDirectory for StoreJobs {
    fn list_users(&self) -> Result<Vec<UserId>, TrackerError> {
        Ok(self.store.open()?.list_users()?)
    }
}

impl DailyJobs for StoreJobs {
    fn rollover(&self, user: &UserId, now: DateTime<Utc>) -> Result<RolloverOutcome, TrackerError> {
        let mut db = self.store.open()?;
        run_rollover(&mut db, user, now, &self.rollover, &self.days)
    }

    fn sweep(&self, user: &UserId, now: DateTime<Utc>) -> Result<SweepReport, TrackerError> {
        let db = self.store.open()?;
        Ok(run_sweep(&db, user, now, &self.retention, &self.days))
    }
}

/// What one user's daily run did.
#[derive(Debug, Clone)]
pub struct UserRun {
    pub user: UserId,
    pub snapshots_created: usize,
    pub sweep: SweepReport,
}

/// Result of one pass over all users.
#[derive(Debug, Default)]
pub struct DailyRunReport {
    pub completed: Vec<UserRun>,
    pub failures: Vec<SchedulerUserFailure>,
}

impl DailyRunReport {
    #[must_use]
    pub fn users_seen(&self) -> usize {
        self.completed.len() + self.failures.len()
    }
}

pub struct Scheduler {
    directory: Arc<dyn UserDirectory>,
    jobs: Arc<dyn DailyJobs>,
    config: SchedulerConfig,
    days: DayBoundary,
}

impl Scheduler {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        jobs: Arc<dyn DailyJobs>,
        config: SchedulerConfig,
        days: DayBoundary,
    ) -> Self {
        Self {
            directory,
            jobs,
            config,
            days,
        }
    }

    /// A scheduler whose directory and jobs both come from `jobs`.
    pub fn from_store(jobs: StoreJobs, config: SchedulerConfig) -> Self {
        let days = jobs.days;
        let jobs = Arc::new(jobs);
        Self::new(jobs.clone(), jobs, config, days)
    }

    fn per_user_timeout(&self) -> Duration {
        Duration::from_secs(self.config.per_user_timeout_secs)
    }

    /// Runs every user's daily jobs once, as of `now`.
    ///
    /// Only a failure to list users fails the whole run.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<DailyRunReport, TrackerError> {
        let directory = Arc::clone(&self.directory);
        let users = tokio::task::spawn_blocking(move || directory.list_users()).await??;
        tracing::info!(users = users.len(), at = %now, "daily run started");

        let mut report = DailyRunReport::default();
        for user in users {
            match self.run_user(user.clone(), now).await {
                Ok(run) => report.completed.push(run),
                Err(cause) => {
                    let failure = SchedulerUserFailure { user, cause };
                    tracing::error!(
                        user = %failure.user,
                        error = %failure.cause,
                        "daily jobs failed for user"
                    );
                    report.failures.push(failure);
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            "daily run finished"
        );
        Ok(report)
    }

    async fn run_user(&self, user: UserId, now: DateTime<Utc>) -> Result<UserRun, JobFailure> {
        let jobs = Arc::clone(&self.jobs);
        let task = tokio::task::spawn_blocking(move || run_jobs(jobs.as_ref(), user, now));
        let timeout = self.per_user_timeout();
        // a timed-out job keeps its blocking thread until it returns; the run
        // does not wait for it
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(JobFailure::Panicked(join.to_string())),
            Err(_) => Err(JobFailure::TimedOut(timeout)),
        }
    }

    /// Runs daily at the configured time until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            let now = Utc::now();
            let next = self.days.next_occurrence(now, self.config.run_at);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next_run = %next, "scheduler waiting");

            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
                () = tokio::time::sleep(wait) => {
                    if let Err(err) = self.run_once_at(Utc::now()).await {
                        tracing::error!(error = %err, "daily run failed");
                    }
                }
            }
        }
    }
}

/// Rollover then sweep. The sweep runs even when rollover failed.
fn run_jobs(jobs: &dyn DailyJobs, user: UserId, now: DateTime<Utc>) -> Result<UserRun, JobFailure> {
    let rollover = jobs.rollover(&user, now);
    if let Err(err) = &rollover {
        tracing::warn!(user = %user, error = %err, "rollover failed; sweeping anyway");
    }
    let sweep = jobs.sweep(&user, now);

    let outcome = rollover.map_err(JobFailure::Rollover)?;
    let sweep = sweep.map_err(|err| JobFailure::Sweep(err.to_string()))?;
    if !sweep.is_clean() {
        let categories: Vec<&str> = sweep.failures.iter().map(|f| f.category.as_str()).collect();
        return Err(JobFailure::Sweep(format!(
            "categories failed: {}",
            categories.join(", ")
        )));
    }
    Ok(UserRun {
        user,
        snapshots_created: outcome.snapshots.len(),
        sweep,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::Duration as ChronoDuration;
    use pt_core::TimerAction;

    use super::*;
    use crate::tracker::Tracker;

    struct FixedUsers(Vec<&'static str>);

    impl UserDirectory for FixedUsers {
        fn list_users(&self) -> Result<Vec<UserId>, TrackerError> {
            Ok(self.0.iter().map(|id| UserId::new(*id).unwrap()).collect())
        }
    }

    /// Records calls; misbehaves for selected users.
    #[derive(Default)]
    struct ScriptedJobs {
        calls: Mutex<Vec<String>>,
        fail_rollover: HashSet<&'static str>,
        panic_rollover: HashSet<&'static str>,
        slow_sweep: HashSet<&'static str>,
    }

    impl ScriptedJobs {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DailyJobs for ScriptedJobs {
        fn rollover(
            &self,
            user: &UserId,
            now: DateTime<Utc>,
        ) -> Result<RolloverOutcome, TrackerError> {
            self.calls.lock().unwrap().push(format!("rollover:{user}"));
            if self.panic_rollover.contains(user.as_str()) {
                panic!("scripted panic for {user}");
            }
            if self.fail_rollover.contains(user.as_str()) {
                return Err(TrackerError::Conflict("scripted failure".to_string()));
            }
            Ok(RolloverOutcome {
                snapshots: Vec::new(),
                current_period_start: now,
            })
        }

        fn sweep(&self, user: &UserId, _now: DateTime<Utc>) -> Result<SweepReport, TrackerError> {
            self.calls.lock().unwrap().push(format!("sweep:{user}"));
            if self.slow_sweep.contains(user.as_str()) {
                std::thread::sleep(std::time::Duration::from_millis(500));
            }
            Ok(SweepReport::default())
        }
    }

    fn scheduler(
        users: Vec<&'static str>,
        jobs: Arc<ScriptedJobs>,
        timeout_secs: u64,
    ) -> Scheduler {
        Scheduler::new(
            Arc::new(FixedUsers(users)),
            jobs,
            SchedulerConfig {
                run_at: NaiveTime::MIN,
                per_user_timeout_secs: timeout_secs,
            },
            DayBoundary::default(),
        )
    }

    #[tokio::test]
    async fn rollover_failure_for_one_user_does_not_stop_the_next() {
        let jobs = Arc::new(ScriptedJobs {
            fail_rollover: HashSet::from(["alice"]),
            ..ScriptedJobs::default()
        });
        let report = scheduler(vec!["alice", "bob"], jobs.clone(), 5)
            .run_once_at(Utc::now())
            .await
            .unwrap();

        assert_eq!(
            jobs.calls(),
            vec!["rollover:alice", "sweep:alice", "rollover:bob", "sweep:bob"]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].user.as_str(), "alice");
        assert!(matches!(report.failures[0].cause, JobFailure::Rollover(_)));
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].user.as_str(), "bob");
    }

    #[tokio::test]
    async fn panicking_user_is_isolated() {
        let jobs = Arc::new(ScriptedJobs {
            panic_rollover: HashSet::from(["alice"]),
            ..ScriptedJobs::default()
        });
        let report = scheduler(vec!["alice", "bob"], jobs.clone(), 5)
            .run_once_at(Utc::now())
            .await
            .unwrap();

        assert!(matches!(report.failures[0].cause, JobFailure::Panicked(_)));
        assert_eq!(report.completed.len(), 1);
        assert!(jobs.calls().contains(&"sweep:bob".to_string()));
    }

    #[tokio::test]
    async fn slow_user_times_out() {
        let jobs = Arc::new(ScriptedJobs {
            slow_sweep: HashSet::from(["alice"]),
            ..ScriptedJobs::default()
        });
        let report = scheduler(vec!["alice", "bob"], jobs, 0)
            .run_once_at(Utc::now())
            .await
            .unwrap();

        assert!(
            report
                .failures
                .iter()
                .any(|f| f.user.as_str() == "alice" && matches!(f.cause, JobFailure::TimedOut(_)))
        );
        assert_eq!(report.users_seen(), 2);
    }

    #[tokio::test]
    async fn store_backed_run_rolls_and_sweeps_registered_users() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(dir.path().join("pt.db"));
        let days = DayBoundary::default();
        let tracker = Tracker::new(store.clone(), days);

        let long_ago = Utc::now() - ChronoDuration::days(120);
        let user = UserId::new("u1").unwrap();
        tracker.start_at(&user, None, vec![], long_ago).await.unwrap();
        tracker
            .apply_at(&user, TimerAction::Stop, long_ago + ChronoDuration::hours(2))
            .await
            .unwrap();

        // period settings were created when the user was first rolled over
        let jobs = StoreJobs::new(
            store.clone(),
            RolloverConfig::default(),
            RetentionPolicy::default(),
            days,
        );
        jobs.rollover(&user, long_ago).unwrap();

        let scheduler = Scheduler::from_store(jobs, SchedulerConfig::default());
        let report = scheduler.run_once_at(Utc::now()).await.unwrap();

        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].snapshots_created, 1);
        assert_eq!(report.completed[0].sweep.timers_deleted, 1);
        assert_eq!(report.completed[0].sweep.ledger_keys_deleted, 1);

        let db = store.open().unwrap();
        let snapshots = db.period_snapshots(&user).unwrap();
        assert_eq!(snapshots[0].total_work_seconds, 7200);
        let stop_day = days.day_of(long_ago + ChronoDuration::hours(2));
        let summary = db.daily_summary(&user, stop_day).unwrap().unwrap();
        assert_eq!(summary.total_work_seconds, 7200);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let jobs = Arc::new(ScriptedJobs::default());
        let scheduler = scheduler(vec!["alice"], jobs.clone(), 5);
        scheduler.run(async {}).await;
        assert!(jobs.calls().is_empty());
    }
}
