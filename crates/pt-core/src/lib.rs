//! Core domain logic for the productivity tracker.
//!
//! This crate contains the pure, storage-free parts of the pipeline:
//! - Timer: the running/paused/completed state machine and duration algorithm
//! - Ledger: daily summaries, contributions and the productivity score
//! - Period: rollover planning and period snapshots
//! - Retention: the raw-data horizon and sweep reports

pub mod calendar;
pub mod ledger;
pub mod period;
pub mod retention;
pub mod timer;
pub mod types;

pub use calendar::{DayBoundary, format_day};
pub use ledger::{
    Contribution, ContributionKind, DailySummary, TaskStatusChange, productivity_score,
};
pub use period::{
    DEFAULT_PERIOD_DAYS, MAX_PERIOD_DAYS, PeriodSnapshot, PeriodWindow, RolloverPolicy,
    UserSettings, due_periods, validate_period_length,
};
pub use retention::{
    DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS, RetentionPolicy, SweepCategory, SweepFailure,
    SweepReport,
};
pub use timer::{PauseInterval, Timer, TimerAction, TimerStatus, Transition, TransitionError};
pub use types::{TaskId, TaskStatus, TimerId, UserId, ValidationError};
