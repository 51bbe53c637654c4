//! Task status changes.

use std::io::Write;

use anyhow::{Context, Result};
use pt_core::{TaskId, TaskStatus, TaskStatusChange, UserId};
use pt_service::Tracker;

use crate::cli::TaskCommand;

pub async fn run<W: Write>(
    writer: &mut W,
    tracker: &Tracker,
    user: &UserId,
    command: TaskCommand,
) -> Result<()> {
    match command {
        TaskCommand::Set {
            task,
            status,
            title,
        } => {
            let task = TaskId::new(task).context("invalid task ID")?;
            let status: TaskStatus = status.parse()?;
            let change = tracker.save_task(user, &task, title, status).await?;
            write_change(writer, &change)?;
        }
    }
    Ok(())
}

fn write_change<W: Write>(writer: &mut W, change: &TaskStatusChange) -> Result<()> {
    let previous = change.previous.as_ref().map_or("new", TaskStatus::as_str);
    write!(writer, "Task {}: {previous} -> {}", change.task, change.new)?;
    if change.completes_task() {
        write!(writer, " (counted as completed)")?;
    }
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use insta::assert_snapshot;

    use super::*;

    fn change(previous: Option<TaskStatus>, new: TaskStatus) -> String {
        let change = TaskStatusChange {
            user: UserId::new("alice").unwrap(),
            task: TaskId::new("t-1").unwrap(),
            previous,
            new,
            occurred_at: Utc::now(),
        };
        let mut output = Vec::new();
        write_change(&mut output, &change).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn completion_is_called_out() {
        assert_snapshot!(
            change(Some(TaskStatus::InProgress), TaskStatus::Done),
            @"Task t-1: in_progress -> done (counted as completed)"
        );
        assert_snapshot!(
            change(Some(TaskStatus::Done), TaskStatus::Done),
            @"Task t-1: done -> done"
        );
        assert_snapshot!(change(None, TaskStatus::Todo), @"Task t-1: new -> todo");
    }
}
