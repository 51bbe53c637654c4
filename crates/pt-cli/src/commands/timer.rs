//! Timer commands.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pt_core::{Timer, TimerStatus, UserId};
use pt_service::Tracker;

use crate::cli::TimerCommand;
use crate::commands::util::format_duration;

pub async fn run<W: Write>(
    writer: &mut W,
    tracker: &Tracker,
    user: &UserId,
    command: TimerCommand,
) -> Result<()> {
    match command {
        TimerCommand::Start { description, tags } => {
            let timer = tracker.start(user, description, tags).await?;
            writeln!(writer, "Started {}", label(&timer))?;
        }
        TimerCommand::Pause => {
            let timer = tracker.pause(user).await?;
            writeln!(
                writer,
                "Paused {} after {}",
                label(&timer),
                format_duration(timer.elapsed_seconds(Utc::now()))
            )?;
        }
        TimerCommand::Resume => {
            let timer = tracker.resume(user).await?;
            writeln!(writer, "Resumed {}", label(&timer))?;
        }
        TimerCommand::Stop => {
            let timer = tracker.stop(user).await?;
            write_stopped(writer, &timer)?;
        }
        TimerCommand::Show => match tracker.active_timer(user).await? {
            Some(active) => write_active(writer, &active.timer, Utc::now())?,
            None => writeln!(writer, "No active timer.")?,
        },
    }
    Ok(())
}

/// `description [tag, tag]`.
fn label(timer: &Timer) -> String {
    let mut label = timer
        .description
        .clone()
        .unwrap_or_else(|| "untitled timer".to_string());
    if !timer.tags.is_empty() {
        label.push_str(&format!(" [{}]", timer.tags.join(", ")));
    }
    label
}

fn write_stopped<W: Write>(writer: &mut W, timer: &Timer) -> Result<()> {
    let breaks = timer.closed_pause_total().num_seconds();
    writeln!(
        writer,
        "Stopped {}: {} worked, {} on break",
        label(timer),
        format_duration(timer.duration_seconds.unwrap_or(0)),
        format_duration(breaks)
    )?;
    Ok(())
}

fn write_active<W: Write>(writer: &mut W, timer: &Timer, now: DateTime<Utc>) -> Result<()> {
    let state = match timer.status {
        TimerStatus::Running => "Running",
        TimerStatus::Paused => "Paused",
        TimerStatus::Completed => "Completed",
    };
    writeln!(
        writer,
        "{state}: {} ({} worked, {} pauses)",
        label(timer),
        format_duration(timer.elapsed_seconds(now)),
        timer.pauses.len()
    )?;
    writeln!(
        writer,
        "Started: {}",
        timer.start_time.format("%Y-%m-%d %H:%M UTC")
    )?;
    Ok(())
}
