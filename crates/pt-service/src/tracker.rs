//! Timer operations and task events, forwarded into the daily ledger.

use chrono::{DateTime, Utc};
use pt_core::{
    DailySummary, DayBoundary, TaskId, TaskStatus, TaskStatusChange, Timer, TimerAction, UserId,
};
use serde::Serialize;

use crate::error::{AggregationFailure, TrackerError};
use crate::ledger::{self, PendingContribution};
use crate::retry::RetrySender;
use crate::store::Store;

/// A live timer together with its elapsed work time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTimer {
    #[serde(flatten)]
    pub timer: Timer,
    pub elapsed_seconds: i64,
}

/// Request-driven entry point for the serving path.
#[derive(Debug, Clone)]
pub struct Tracker {
    store: Store,
    days: DayBoundary,
    retry: Option<RetrySender>,
}

impl Tracker {
    pub fn new(store: Store, days: DayBoundary) -> Self {
        Self {
            store,
            days,
            retry: None,
        }
    }

    /// Routes aggregation failures to an asynchronous retry worker.
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySender) -> Self {
        self.retry = Some(retry);
        self
    }

    pub const fn days(&self) -> &DayBoundary {
        &self.days
    }

    pub async fn start(
        &self,
        user: &UserId,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Result<Timer, TrackerError> {
        self.start_at(user, description, tags, Utc::now()).await
    }

    /// Starts a timer. Fails with a conflict if the user already has a live one.
    pub async fn start_at(
        &self,
        user: &UserId,
        description: Option<String>,
        tags: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Timer, TrackerError> {
        let user = user.clone();
        let timer = self
            .store
            .run(move |db| {
                if db.register_user(&user, now)? {
                    tracing::info!(user = %user, "registered new user");
                }
                let timer = Timer::start(user, description, tags, now);
                db.insert_timer(&timer)?;
                Ok(timer)
            })
            .await?;
        tracing::info!(user = %timer.user, timer = %timer.id, "timer started");
        Ok(timer)
    }

    pub async fn pause(&self, user: &UserId) -> Result<Timer, TrackerError> {
        self.apply_at(user, TimerAction::Pause, Utc::now()).await
    }

    pub async fn resume(&self, user: &UserId) -> Result<Timer, TrackerError> {
        self.apply_at(user, TimerAction::Resume, Utc::now()).await
    }

    pub async fn stop(&self, user: &UserId) -> Result<Timer, TrackerError> {
        self.apply_at(user, TimerAction::Stop, Utc::now()).await
    }

    /// Moves the user's live timer and forwards the resulting contributions
    /// to the ledger for the day of `now`.
    ///
    /// Ledger failures do not fail the move: they are logged and queued for
    /// retry, and the updated timer is returned.
    pub async fn apply_at(
        &self,
        user: &UserId,
        action: TimerAction,
        now: DateTime<Utc>,
    ) -> Result<Timer, TrackerError> {
        let user = user.clone();
        let date = self.days.day_of(now);
        let (timer, failures) = self
            .store
            .run(move |db| {
                let Some(timer) = db
                    .live_timer(&user)?
                    .filter(|timer| action.accepts(timer.status))
                else {
                    return Err(TrackerError::NotFound(no_timer_message(action)));
                };
                let transition = timer
                    .apply(action, now)
                    .map_err(|e| TrackerError::Conflict(e.to_string()))?;
                db.update_timer(&transition)?;

                let failures = ledger::record_all(db, &user, date, transition.contributions, now);
                Ok((transition.timer, failures))
            })
            .await?;

        tracing::info!(
            user = %timer.user,
            timer = %timer.id,
            action = %action,
            status = %timer.status,
            "timer updated"
        );
        self.defer(failures);
        Ok(timer)
    }

    /// The user's running or paused timer, if any.
    pub async fn active_timer(&self, user: &UserId) -> Result<Option<ActiveTimer>, TrackerError> {
        self.active_timer_at(user, Utc::now()).await
    }

    pub async fn active_timer_at(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveTimer>, TrackerError> {
        let user = user.clone();
        let timer = self.store.run(move |db| Ok(db.live_timer(&user)?)).await?;
        Ok(timer.map(|timer| ActiveTimer {
            elapsed_seconds: timer.elapsed_seconds(now),
            timer,
        }))
    }

    pub async fn today_summary(&self, user: &UserId) -> Result<DailySummary, TrackerError> {
        self.summary_at(user, Utc::now()).await
    }

    /// The summary for the day of `now`, or zeroed counters if nothing has
    /// been contributed yet.
    pub async fn summary_at(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<DailySummary, TrackerError> {
        let user = user.clone();
        let date = self.days.day_of(now);
        self.store
            .run(move |db| {
                Ok(db
                    .daily_summary(&user, date)?
                    .unwrap_or_else(|| DailySummary::empty(user, date)))
            })
            .await
    }

    /// Timers changed after `last_sync`, for client-side reconciliation.
    pub async fn sync(
        &self,
        user: &UserId,
        last_sync: DateTime<Utc>,
    ) -> Result<Vec<Timer>, TrackerError> {
        let user = user.clone();
        self.store
            .run(move |db| Ok(db.timers_updated_since(&user, last_sync)?))
            .await
    }

    pub async fn save_task(
        &self,
        user: &UserId,
        task: &TaskId,
        title: Option<String>,
        status: TaskStatus,
    ) -> Result<TaskStatusChange, TrackerError> {
        self.save_task_at(user, task, title, status, Utc::now()).await
    }

    /// Stores a task save and counts it if it completed the task.
    pub async fn save_task_at(
        &self,
        user: &UserId,
        task: &TaskId,
        title: Option<String>,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<TaskStatusChange, TrackerError> {
        let change_user = user.clone();
        let change_task = task.clone();
        let previous = self
            .store
            .run(move |db| {
                db.register_user(&change_user, now)?;
                Ok(db.save_task(&change_user, &change_task, title.as_deref(), status, now)?)
            })
            .await?;

        let change = TaskStatusChange {
            user: user.clone(),
            task: task.clone(),
            previous,
            new: status,
            occurred_at: now,
        };
        self.record_task_event(&change).await?;
        Ok(change)
    }

    /// Applies a task-completion event reported by the task collaborator.
    ///
    /// Only the transition into `done` counts; any other change is ignored.
    pub async fn record_task_event(&self, change: &TaskStatusChange) -> Result<(), TrackerError> {
        let Some(contribution) = change.contribution() else {
            tracing::debug!(
                task = %change.task,
                status = %change.new,
                "task change is not a completion"
            );
            return Ok(());
        };
        let pending = PendingContribution {
            user: change.user.clone(),
            date: self.days.day_of(change.occurred_at),
            contribution,
        };
        let now = change.occurred_at;
        let failure = self
            .store
            .run(move |db| Ok(ledger::record(db, &pending, now).err()))
            .await?;

        tracing::info!(user = %change.user, task = %change.task, "task completed");
        self.defer(failure.into_iter().collect());
        Ok(())
    }

    fn defer(&self, failures: Vec<AggregationFailure>) {
        for failure in failures {
            tracing::warn!(error = %failure, "aggregation failed; queueing retry");
            let queued = self
                .retry
                .as_ref()
                .is_some_and(|retry| retry.enqueue(failure.into()));
            if !queued {
                tracing::error!("no retry worker available; contribution dropped");
            }
        }
    }
}

fn no_timer_message(action: TimerAction) -> String {
    match action {
        TimerAction::Pause => "no running timer to pause".to_string(),
        TimerAction::Resume => "no paused timer to resume".to_string(),
        TimerAction::Stop => "no active timer to stop".to_string(),
    }
}
