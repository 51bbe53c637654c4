//! Orchestration for the productivity tracker.
//!
//! [`Tracker`] serves the request path: timer transitions, task events and
//! summary reads, each forwarding its ledger contributions in the same call.
//! [`Scheduler`] drives the daily rollover and retention sweep. The
//! [`http`] module exposes both over a JSON API.

pub mod error;
pub mod http;
pub mod ledger;
pub mod retry;
pub mod rollover;
pub mod scheduler;
pub mod store;
pub mod sweeper;
pub mod tracker;

pub use error::{AggregationFailure, JobFailure, SchedulerUserFailure, TrackerError};
pub use retry::{RetryPolicy, RetrySender, RetryStats, RetryWorker, retry_channel};
pub use rollover::{RolloverConfig, RolloverOutcome, run_rollover};
pub use scheduler::{
    DailyJobs, DailyRunReport, Scheduler, SchedulerConfig, StoreJobs, UserDirectory, UserRun,
};
pub use store::Store;
pub use sweeper::{RetentionStore, run_sweep};
pub use tracker::{ActiveTimer, Tracker};
