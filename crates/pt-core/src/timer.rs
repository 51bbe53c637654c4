//! Work/break timer state machine.
//!
//! A timer moves `running ⇄ paused` any number of times and ends in
//! `completed`, after which it is immutable. Every legal move goes through
//! [`Timer::apply`], which returns the updated timer together with the ledger
//! contributions the move produced.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Contribution;
use crate::types::{TimerId, UserId, ValidationError};

/// Lifecycle state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Running,
    Paused,
    Completed,
}

impl TimerStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// Running or paused. A user holds at most one live timer.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TimerStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            _ => Err(ValidationError::InvalidTimerStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// One pause. `end` is absent only for the trailing pause of a paused timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl PauseInterval {
    /// Length of a closed pause.
    #[must_use]
    pub fn length(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }
}

/// A command that moves an existing timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Pause,
    Resume,
    Stop,
}

impl TimerAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }

    /// Whether a timer in `status` can take this action.
    #[must_use]
    pub const fn accepts(self, status: TimerStatus) -> bool {
        match self {
            Self::Pause => matches!(status, TimerStatus::Running),
            Self::Resume => matches!(status, TimerStatus::Paused),
            Self::Stop => status.is_live(),
        }
    }
}

impl fmt::Display for TimerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An illegal move.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("timer {id} is {status}, not running")]
    NotRunning { id: TimerId, status: TimerStatus },

    #[error("timer {id} is {status}, not paused")]
    NotPaused { id: TimerId, status: TimerStatus },

    #[error("timer {id} is already completed")]
    Completed { id: TimerId },

    #[error("timer {id} is paused but has no open pause")]
    NoOpenPause { id: TimerId },
}

/// The outcome of a legal move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status before the move; the persisted row must still carry it.
    pub previous_status: TimerStatus,
    pub timer: Timer,
    /// Ledger increments to forward for the day the move happened.
    pub contributions: Vec<Contribution>,
}

/// A single focus/break session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub id: TimerId,
    pub user: UserId,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds of work, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub status: TimerStatus,
    #[serde(default)]
    pub pauses: Vec<PauseInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every move; used for compare-and-swap persistence.
    pub version: i64,
}

impl Timer {
    /// A freshly started timer.
    #[must_use]
    pub fn start(
        user: UserId,
        description: Option<String>,
        tags: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TimerId::generate(),
            user,
            start_time: now,
            end_time: None,
            duration_seconds: None,
            status: TimerStatus::Running,
            pauses: Vec::new(),
            description: description.filter(|d| !d.trim().is_empty()),
            tags,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Applies `action` at `now`, leaving `self` untouched.
    pub fn apply(
        &self,
        action: TimerAction,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let mut next = self.clone();
        let mut contributions = Vec::new();

        match (action, self.status) {
            (_, TimerStatus::Completed) => {
                return Err(TransitionError::Completed {
                    id: self.id.clone(),
                });
            }
            (TimerAction::Pause, TimerStatus::Running) => {
                next.pauses.push(PauseInterval {
                    start: now,
                    end: None,
                });
                next.status = TimerStatus::Paused;
            }
            (TimerAction::Pause, status) => {
                return Err(TransitionError::NotRunning {
                    id: self.id.clone(),
                    status,
                });
            }
            (TimerAction::Resume, TimerStatus::Paused) => {
                contributions.extend(next.close_open_pause(now)?);
                next.status = TimerStatus::Running;
            }
            (TimerAction::Resume, status) => {
                return Err(TransitionError::NotPaused {
                    id: self.id.clone(),
                    status,
                });
            }
            (TimerAction::Stop, status) => {
                if status == TimerStatus::Paused {
                    contributions.extend(next.close_open_pause(now)?);
                }
                let worked = now - next.start_time - next.closed_pause_total();
                let seconds = worked.num_milliseconds().div_euclid(1000).max(0);
                next.end_time = Some(now);
                next.duration_seconds = Some(seconds);
                next.status = TimerStatus::Completed;
                contributions.push(Contribution::work(&next.id, seconds));
            }
        }

        next.updated_at = now;
        next.version += 1;

        Ok(Transition {
            previous_status: self.status,
            timer: next,
            contributions,
        })
    }

    /// Closes the trailing pause and returns its break contribution, if positive.
    fn close_open_pause(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<Contribution>, TransitionError> {
        let Some(index) = self.pauses.iter().rposition(|p| p.end.is_none()) else {
            return Err(TransitionError::NoOpenPause {
                id: self.id.clone(),
            });
        };
        let pause = &mut self.pauses[index];
        pause.end = Some(now);

        let seconds = (now - pause.start).num_milliseconds().div_euclid(1000);
        Ok((seconds > 0).then(|| Contribution::pause_break(&self.id, index, seconds)))
    }

    /// Sum of all closed pauses.
    #[must_use]
    pub fn closed_pause_total(&self) -> Duration {
        self.pauses
            .iter()
            .filter_map(PauseInterval::length)
            .fold(Duration::zero(), |acc, d| acc + d)
    }

    /// The trailing open pause, if any.
    #[must_use]
    pub fn open_pause(&self) -> Option<&PauseInterval> {
        self.pauses.iter().rev().find(|p| p.end.is_none())
    }

    /// Whether the pause list agrees with the status: one open pause while
    /// paused, none otherwise.
    #[must_use]
    pub fn pauses_consistent(&self) -> bool {
        let open = self.pauses.iter().filter(|p| p.end.is_none()).count();
        match self.status {
            TimerStatus::Paused => open == 1 && self.pauses.last().is_some_and(|p| p.end.is_none()),
            TimerStatus::Running | TimerStatus::Completed => open == 0,
        }
    }

    /// Elapsed work time in whole seconds as of `now`.
    ///
    /// A paused timer's clock is frozen at the start of its open pause.
    #[must_use]
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        let until = match self.status {
            TimerStatus::Completed => return self.duration_seconds.unwrap_or(0),
            TimerStatus::Running => now,
            TimerStatus::Paused => self.open_pause().map_or(now, |p| p.start),
        };
        let worked = until - self.start_time - self.closed_pause_total();
        worked.num_milliseconds().div_euclid(1000).max(0)
    }

    /// Whether this timer is running or paused.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.status.is_live()
    }
}
