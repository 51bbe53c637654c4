//! Retention policy for raw event rows.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::calendar::DayBoundary;
use crate::types::ValidationError;

/// Age after which raw rows are pruned.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Longest accepted horizon, about a century.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// How long raw rows are kept. Rollups are never subject to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    horizon_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub const fn new(horizon_days: i64) -> Result<Self, ValidationError> {
        if horizon_days < 1 || horizon_days > MAX_RETENTION_DAYS {
            return Err(ValidationError::InvalidRetentionHorizon { days: horizon_days });
        }
        Ok(Self { horizon_days })
    }

    #[must_use]
    pub const fn horizon_days(&self) -> i64 {
        self.horizon_days
    }

    /// Rows created strictly before this instant are expired.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(self.horizon_days)
            .and_then(|horizon| now.checked_sub_signed(horizon))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Date-keyed rows dated strictly before this day are expired.
    #[must_use]
    pub fn cutoff_date(&self, now: DateTime<Utc>, days: &DayBoundary) -> NaiveDate {
        days.day_of(self.cutoff(now))
    }
}

/// A class of raw rows the sweeper prunes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepCategory {
    Timers,
    Transactions,
    CompletedTasks,
    /// Idempotency keys of contributions already folded into daily summaries.
    LedgerKeys,
}

impl SweepCategory {
    pub const ALL: [Self; 4] = [
        Self::Timers,
        Self::Transactions,
        Self::CompletedTasks,
        Self::LedgerKeys,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timers => "timers",
            Self::Transactions => "transactions",
            Self::CompletedTasks => "completed_tasks",
            Self::LedgerKeys => "ledger_keys",
        }
    }
}

impl fmt::Display for SweepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A category that could not be swept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub category: SweepCategory,
    pub message: String,
}

/// What one sweep of one user removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub timers_deleted: usize,
    pub transactions_deleted: usize,
    pub completed_tasks_deleted: usize,
    pub ledger_keys_deleted: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn record(&mut self, category: SweepCategory, deleted: usize) {
        match category {
            SweepCategory::Timers => self.timers_deleted = deleted,
            SweepCategory::Transactions => self.transactions_deleted = deleted,
            SweepCategory::CompletedTasks => self.completed_tasks_deleted = deleted,
            SweepCategory::LedgerKeys => self.ledger_keys_deleted = deleted,
        }
    }

    pub fn fail(&mut self, category: SweepCategory, message: impl Into<String>) {
        self.failures.push(SweepFailure {
            category,
            message: message.into(),
        });
    }

    #[must_use]
    pub const fn total_deleted(&self) -> usize {
        self.timers_deleted
            + self.transactions_deleted
            + self.completed_tasks_deleted
            + self.ledger_keys_deleted
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
