//! Today's productivity summary.

use std::io::Write;

use anyhow::Result;
use pt_core::{DailySummary, UserId, format_day};
use pt_service::Tracker;

use crate::commands::util::format_duration;

pub async fn run<W: Write>(
    writer: &mut W,
    tracker: &Tracker,
    user: &UserId,
    json: bool,
) -> Result<()> {
    let summary = tracker.today_summary(user).await?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        write_summary(writer, &summary)?;
    }
    Ok(())
}

fn write_summary<W: Write>(writer: &mut W, summary: &DailySummary) -> Result<()> {
    writeln!(writer, "{} on {}", summary.user, format_day(summary.date))?;
    writeln!(writer, "Work:            {}", format_duration(summary.total_work_seconds))?;
    writeln!(writer, "Breaks:          {}", format_duration(summary.total_break_seconds))?;
    writeln!(writer, "Tasks completed: {}", summary.completed_tasks_count)?;
    writeln!(writer, "Productivity:    {}/100", summary.productivity_score)?;
    Ok(())
}
