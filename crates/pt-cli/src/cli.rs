//! Command-line argument definitions.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Productivity tracker.
///
/// Times work sessions, keeps a daily productivity ledger, and closes
/// fixed-length reporting periods.
#[derive(Debug, Parser)]
#[command(name = "pt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// User to act as (overrides the `user` config key).
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Control the work timer.
    #[command(subcommand)]
    Timer(TimerCommand),

    /// Show today's productivity summary.
    Today {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print timers changed since a point in time, as JSON.
    Sync {
        /// ISO 8601 timestamp or relative time (e.g. "2 hours ago").
        #[arg(long, default_value = "1 day ago")]
        since: String,
    },

    /// Manage tasks.
    #[command(subcommand)]
    Task(TaskCommand),

    /// Run period rollover and retention sweep for every user once.
    Daily {
        /// Run as of this time instead of now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Serve the HTTP API and run the daily scheduler.
    Serve {
        /// Listen address (overrides the `bind` config key).
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TimerCommand {
    /// Start a new timer.
    Start {
        /// What the session is for.
        description: Option<String>,

        /// Tag the session (repeatable).
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Pause the running timer.
    Pause,
    /// Resume the paused timer.
    Resume,
    /// Stop the live timer.
    Stop,
    /// Show the live timer.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Save a task with a new status.
    Set {
        /// Task ID.
        task: String,

        /// New status: todo, in_progress or done.
        status: String,

        /// Task title.
        #[arg(long)]
        title: Option<String>,
    },
}
