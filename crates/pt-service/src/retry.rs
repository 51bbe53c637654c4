//! Asynchronous retry of failed ledger contributions.
//!
//! Failed contributions are queued on an unbounded channel and re-applied by
//! a single worker with linear backoff. Idempotency keys make a retry of an
//! increment that did commit harmless.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ledger::{PendingContribution, record};
use crate::store::Store;

/// How hard the worker tries before giving up on a contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(rename = "retry_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay before the `attempt`-th retry (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Enqueues contributions for the worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RetrySender {
    tx: mpsc::UnboundedSender<PendingContribution>,
}

impl RetrySender {
    /// Queues `pending`. Returns `false` if the worker has stopped.
    pub fn enqueue(&self, pending: PendingContribution) -> bool {
        self.tx.send(pending).is_ok()
    }
}

/// Outcome counts of a worker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub recovered: usize,
    pub dropped: usize,
}

/// Drains the retry queue until every [`RetrySender`] is dropped.
pub struct RetryWorker {
    store: Store,
    policy: RetryPolicy,
    rx: mpsc::UnboundedReceiver<PendingContribution>,
}

/// Creates a connected sender/worker pair.
pub fn retry_channel(store: Store, policy: RetryPolicy) -> (RetrySender, RetryWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RetrySender { tx }, RetryWorker { store, policy, rx })
}

impl RetryWorker {
    pub async fn run(mut self) -> RetryStats {
        let mut stats = RetryStats::default();
        while let Some(pending) = self.rx.recv().await {
            if self.retry(&pending).await {
                stats.recovered += 1;
            } else {
                stats.dropped += 1;
            }
        }
        tracing::debug!(
            recovered = stats.recovered,
            dropped = stats.dropped,
            "aggregation retry worker stopped"
        );
        stats
    }

    async fn retry(&self, pending: &PendingContribution) -> bool {
        for attempt in 1..=self.policy.max_retries {
            tokio::time::sleep(self.policy.delay(attempt)).await;

            let task = pending.clone();
            let result = self
                .store
                .run(move |db| Ok(record(db, &task, Utc::now())))
                .await;
            match result {
                Ok(Ok(())) => {
                    tracing::info!(
                        user = %pending.user,
                        key = %pending.contribution.key,
                        attempt,
                        "aggregation retry succeeded"
                    );
                    return true;
                }
                Ok(Err(failure)) => {
                    tracing::warn!(attempt, error = %failure, "aggregation retry failed");
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "aggregation retry could not reach storage"
                    );
                }
            }
        }
        tracing::error!(
            user = %pending.user,
            date = %pending.date,
            key = %pending.contribution.key,
            max_retries = self.policy.max_retries,
            "giving up on contribution"
        );
        false
    }
}
