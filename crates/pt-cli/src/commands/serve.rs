//! Long-running server: HTTP API, daily scheduler and aggregation retries.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use pt_service::{Scheduler, Store, StoreJobs, Tracker, http, retry_channel};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::Config;

pub async fn run(config: &Config, bind: SocketAddr) -> Result<()> {
    let store = Store::new(&config.database_path);
    let days = config.day_boundary()?;
    tracing::info!(database = %store.path().display(), %bind, "starting server");

    let (retry, worker) = retry_channel(store.clone(), config.aggregation);
    let worker = tokio::spawn(worker.run());
    let tracker = Tracker::new(store.clone(), days).with_retry(retry);

    let jobs = StoreJobs::new(store, config.rollover, config.retention_policy()?, days);
    let scheduler = Scheduler::from_store(jobs, config.scheduler);

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    let (shutdown, signal) = watch::channel(());
    let scheduler = tokio::spawn({
        let signal = signal.clone();
        async move { scheduler.run(wait_for(signal)).await }
    });
    let mut server = tokio::spawn(http::serve(listener, tracker, wait_for(signal)));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            tracing::info!("shutdown requested");
        }
        result = &mut server => {
            result.context("HTTP server task failed")?.context("HTTP server failed")?;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
    }

    // receivers may already be gone if a task exited early
    let _ = shutdown.send(());
    server
        .await
        .context("HTTP server task failed")?
        .context("HTTP server failed")?;
    scheduler.await.context("scheduler task failed")?;

    // the last retry sender went away with the server's router
    let stats = worker.await.context("retry worker failed")?;
    if stats.dropped > 0 {
        tracing::warn!(dropped = stats.dropped, "ledger contributions were dropped after retries");
    }
    Ok(())
}

async fn wait_for(mut signal: watch::Receiver<()>) {
    let _ = signal.changed().await;
}
