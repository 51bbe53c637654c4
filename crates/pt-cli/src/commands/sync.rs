//! Timers changed since a point in time.

use std::io::Write;

use anyhow::Result;
use pt_core::UserId;
use pt_service::Tracker;

use crate::commands::util::parse_datetime;

pub async fn run<W: Write>(
    writer: &mut W,
    tracker: &Tracker,
    user: &UserId,
    since: &str,
) -> Result<()> {
    let since = parse_datetime(since)?;
    let timers = tracker.sync(user, since).await?;
    tracing::debug!(count = timers.len(), %since, "timers to sync");
    writeln!(writer, "{}", serde_json::to_string_pretty(&timers)?)?;
    Ok(())
}
