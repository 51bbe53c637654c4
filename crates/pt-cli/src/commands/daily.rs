//! One-off daily run: period rollover and retention sweep for every user.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pt_service::{DailyRunReport, Scheduler, StoreJobs, Store};

use crate::Config;

pub async fn run<W: Write>(writer: &mut W, config: &Config, at: DateTime<Utc>) -> Result<()> {
    let jobs = StoreJobs::new(
        Store::new(&config.database_path),
        config.rollover,
        config.retention_policy()?,
        config.day_boundary()?,
    );
    let report = Scheduler::from_store(jobs, config.scheduler)
        .run_once_at(at)
        .await
        .context("daily run failed")?;
    write_report(writer, &report)?;
    Ok(())
}

fn write_report<W: Write>(writer: &mut W, report: &DailyRunReport) -> Result<()> {
    writeln!(writer, "Daily run: {} users", report.users_seen())?;
    for run in &report.completed {
        writeln!(
            writer,
            "- {}: {} snapshots, {} rows swept",
            run.user,
            run.snapshots_created,
            run.sweep.total_deleted()
        )?;
    }
    for failure in &report.failures {
        writeln!(writer, "- {}: failed: {}", failure.user, failure.cause)?;
    }
    Ok(())
}
