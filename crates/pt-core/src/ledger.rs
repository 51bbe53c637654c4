//! Daily productivity ledger.
//!
//! A [`DailySummary`] is an append-only accumulator keyed by `(user, date)`.
//! Producers never write the counters directly; they emit [`Contribution`]s
//! which the storage layer applies as atomic upsert-increments. The
//! productivity score is a derived cache recomputed from the counters after
//! every increment.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TaskId, TaskStatus, TimerId, UserId};

/// Upper bound of the productivity score.
pub const MAX_SCORE: u8 = 100;

/// Score points awarded per completed task.
pub const TASK_BONUS: i64 = 2;

/// The per-user, per-day rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub user: UserId,
    pub date: NaiveDate,
    pub total_work_seconds: i64,
    pub total_break_seconds: i64,
    pub completed_tasks_count: i64,
    pub productivity_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DailySummary {
    /// The zeroed summary reported for a day nothing has contributed to yet.
    #[must_use]
    pub const fn empty(user: UserId, date: NaiveDate) -> Self {
        Self {
            user,
            date,
            total_work_seconds: 0,
            total_break_seconds: 0,
            completed_tasks_count: 0,
            productivity_score: 0,
            updated_at: None,
        }
    }

    /// Score derived from the current counters.
    #[must_use]
    pub fn derived_score(&self) -> u8 {
        productivity_score(
            self.total_work_seconds,
            self.total_break_seconds,
            self.completed_tasks_count,
        )
    }
}

/// Computes `min(100, round(100·W/(W+B)) + 2·C)`.
///
/// The base is 0 when no time has been tracked. Halves round up.
#[must_use]
pub fn productivity_score(work_seconds: i64, break_seconds: i64, completed_tasks: i64) -> u8 {
    let work = work_seconds.max(0);
    let tracked = work + break_seconds.max(0);
    let base = if tracked > 0 {
        (200 * work + tracked) / (2 * tracked)
    } else {
        0
    };
    let bonus = TASK_BONUS.saturating_mul(completed_tasks.max(0));
    let score = base.saturating_add(bonus).min(i64::from(MAX_SCORE));
    u8::try_from(score).unwrap_or(MAX_SCORE)
}

/// What a contribution adds to a daily summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContributionKind {
    Work { seconds: i64 },
    Break { seconds: i64 },
    CompletedTask,
}

/// A single ledger increment together with the key of the event that caused it.
///
/// The key makes application idempotent: applying the same key twice adds once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub kind: ContributionKind,
    pub key: String,
}

impl Contribution {
    /// Work time from a stopped timer.
    #[must_use]
    pub fn work(timer: &TimerId, seconds: i64) -> Self {
        Self {
            kind: ContributionKind::Work { seconds },
            key: format!("timer:{timer}:work"),
        }
    }

    /// Break time from the closure of the pause at `index` of a timer.
    #[must_use]
    pub fn pause_break(timer: &TimerId, index: usize, seconds: i64) -> Self {
        Self {
            kind: ContributionKind::Break { seconds },
            key: format!("timer:{timer}:pause:{index}"),
        }
    }

    /// One completed task, keyed by the instant of the completing save.
    #[must_use]
    pub fn completed_task(task: &TaskId, at: DateTime<Utc>) -> Self {
        Self {
            kind: ContributionKind::CompletedTask,
            key: format!(
                "task:{task}:done:{}",
                at.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        }
    }

    /// Whether applying this contribution changes any counter.
    #[must_use]
    pub const fn is_effective(&self) -> bool {
        match self.kind {
            ContributionKind::Break { seconds } => seconds > 0,
            ContributionKind::Work { .. } | ContributionKind::CompletedTask => true,
        }
    }
}

/// A task save reported by the task collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusChange {
    pub user: UserId,
    pub task: TaskId,
    /// `None` when the save created the task.
    pub previous: Option<TaskStatus>,
    pub new: TaskStatus,
    pub occurred_at: DateTime<Utc>,
}

impl TaskStatusChange {
    /// True only on the edge into `done`; re-saving a done task is not a completion.
    #[must_use]
    pub fn completes_task(&self) -> bool {
        self.new.is_done() && !self.previous.is_some_and(TaskStatus::is_done)
    }

    /// The ledger contribution for this change, if it is a completion.
    #[must_use]
    pub fn contribution(&self) -> Option<Contribution> {
        self.completes_task()
            .then(|| Contribution::completed_task(&self.task, self.occurred_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_matches_reference_example() {
        // base = round(100 * 80 / 100) = 80, bonus = 2 * 3 = 6
        assert_eq!(productivity_score(80, 20, 3), 86);
    }

    #[test]
    fn score_is_zero_without_tracked_time() {
        assert_eq!(productivity_score(0, 0, 0), 0);
        assert_eq!(productivity_score(0, 0, 4), 8);
    }

    #[test]
    fn score_rounds_half_up() {
        // 62.5 -> 63
        assert_eq!(productivity_score(5, 3, 0), 63);
        // 33.33 -> 33
        assert_eq!(productivity_score(1, 2, 0), 33);
        // 66.67 -> 67
        assert_eq!(productivity_score(2, 1, 0), 67);
    }

    #[test]
    fn score_is_capped_at_100() {
        assert_eq!(productivity_score(3600, 0, 10), 100);
        assert_eq!(productivity_score(1, 1, i64::MAX), 100);
    }

    #[test]
    fn empty_summary_has_zeroed_counters() {
        let user = UserId::new("u1").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let summary = DailySummary::empty(user, date);
        assert_eq!(summary.total_work_seconds, 0);
        assert_eq!(summary.derived_score(), 0);
        assert!(summary.updated_at.is_none());
    }

    #[test]
    fn only_the_transition_into_done_counts() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let change = |previous, new| TaskStatusChange {
            user: UserId::new("u1").unwrap(),
            task: TaskId::new("t1").unwrap(),
            previous,
            new,
            occurred_at: at,
        };

        assert!(change(Some(TaskStatus::InProgress), TaskStatus::Done).completes_task());
        assert!(change(None, TaskStatus::Done).completes_task());
        assert!(!change(Some(TaskStatus::Done), TaskStatus::Done).completes_task());
        assert!(!change(Some(TaskStatus::Done), TaskStatus::Todo).completes_task());
        assert!(!change(Some(TaskStatus::Todo), TaskStatus::InProgress).completes_task());

        let contribution = change(Some(TaskStatus::Todo), TaskStatus::Done)
            .contribution()
            .unwrap();
        assert_eq!(contribution.kind, ContributionKind::CompletedTask);
        assert_eq!(contribution.key, "task:t1:done:2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn zero_second_breaks_are_not_effective() {
        let timer = TimerId::new("t").unwrap();
        assert!(!Contribution::pause_break(&timer, 0, 0).is_effective());
        assert!(Contribution::pause_break(&timer, 0, 1).is_effective());
        assert!(Contribution::work(&timer, 0).is_effective());
    }
}
