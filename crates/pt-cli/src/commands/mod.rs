//! CLI subcommand implementations.

pub mod daily;
pub mod serve;
pub mod sync;
pub mod task;
pub mod timer;
pub mod today;
pub mod util;

use anyhow::{Context, Result};
use pt_service::{RetryStats, Store, Tracker, retry_channel};
use tokio::task::JoinHandle;

use crate::Config;

/// A tracker for one command, with its aggregation retry worker.
pub struct TrackerSession {
    pub tracker: Tracker,
    worker: JoinHandle<RetryStats>,
}

impl TrackerSession {
    /// Must be called inside the runtime.
    pub fn start(config: &Config) -> Result<Self> {
        let store = Store::new(&config.database_path);
        let (retry, worker) = retry_channel(store.clone(), config.aggregation);
        let tracker = Tracker::new(store, config.day_boundary()?).with_retry(retry);
        Ok(Self {
            tracker,
            worker: tokio::spawn(worker.run()),
        })
    }

    /// Drops the tracker and waits for queued retries to finish.
    pub async fn finish(self) -> Result<()> {
        let Self { tracker, worker } = self;
        drop(tracker);
        let stats = worker.await.context("retry worker failed")?;
        if stats.dropped > 0 {
            anyhow::bail!(
                "{} ledger contributions could not be recorded",
                stats.dropped
            );
        }
        Ok(())
    }
}
