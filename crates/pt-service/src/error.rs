//! Error types for the orchestration layer.

use std::time::Duration;

use chrono::NaiveDate;
use pt_core::{Contribution, UserId, ValidationError};
use pt_db::DbError;
use thiserror::Error;

/// Caller-visible failures of tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// An invariant rejected the write: a second live timer, or a move that
    /// lost a race with another writer.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No timer or row in the state the operation needs.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[source] DbError),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<DbError> for TrackerError {
    fn from(err: DbError) -> Self {
        if err.is_conflict() {
            Self::Conflict(err.to_string())
        } else {
            Self::Storage(err)
        }
    }
}

/// A ledger contribution that could not be applied after its primary event
/// committed. The event stands; the contribution is retried.
#[derive(Debug, Error)]
#[error("failed to aggregate {} for {user} on {date}: {source}", .contribution.key)]
pub struct AggregationFailure {
    pub user: UserId,
    pub date: NaiveDate,
    pub contribution: Contribution,
    #[source]
    pub source: DbError,
}

/// Why one user's daily jobs did not complete.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("rollover failed: {0}")]
    Rollover(#[source] TrackerError),

    #[error("sweep failed: {0}")]
    Sweep(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// One user's daily run failed; the run carried on with the next user.
#[derive(Debug, Error)]
#[error("daily jobs for {user} failed: {cause}")]
pub struct SchedulerUserFailure {
    pub user: UserId,
    #[source]
    pub cause: JobFailure,
}
