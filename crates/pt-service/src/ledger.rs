//! Forwarding contributions into the daily ledger.

use chrono::{DateTime, NaiveDate, Utc};
use pt_core::{Contribution, UserId};
use pt_db::Database;

use crate::error::AggregationFailure;

/// A contribution addressed to one summary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingContribution {
    pub user: UserId,
    pub date: NaiveDate,
    pub contribution: Contribution,
}

impl From<AggregationFailure> for PendingContribution {
    fn from(failure: AggregationFailure) -> Self {
        Self {
            user: failure.user,
            date: failure.date,
            contribution: failure.contribution,
        }
    }
}

/// Applies the increment, then recomputes the row's score.
///
/// The score is recomputed even when the key was already applied, so a retry
/// after a failed recompute still repairs the score.
pub fn record(
    db: &mut Database,
    pending: &PendingContribution,
    now: DateTime<Utc>,
) -> Result<(), AggregationFailure> {
    if !pending.contribution.is_effective() {
        return Ok(());
    }
    let fail = |source| AggregationFailure {
        user: pending.user.clone(),
        date: pending.date,
        contribution: pending.contribution.clone(),
        source,
    };

    let applied = db
        .apply_contribution(&pending.user, pending.date, &pending.contribution, now)
        .map_err(fail)?;
    let score = db
        .recompute_score(&pending.user, pending.date)
        .map_err(fail)?;
    tracing::debug!(
        user = %pending.user,
        date = %pending.date,
        key = %pending.contribution.key,
        applied,
        score = ?score,
        "recorded contribution"
    );
    Ok(())
}

/// Records every contribution, collecting the ones that failed.
pub fn record_all(
    db: &mut Database,
    user: &UserId,
    date: NaiveDate,
    contributions: Vec<Contribution>,
    now: DateTime<Utc>,
) -> Vec<AggregationFailure> {
    contributions
        .into_iter()
        .map(|contribution| PendingContribution {
            user: user.clone(),
            date,
            contribution,
        })
        .filter_map(|pending| record(db, &pending, now).err())
        .collect()
}
