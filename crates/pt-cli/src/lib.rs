//! Productivity tracker CLI library.
//!
//! Command-line front end and server wiring for the `pt` binary.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, TaskCommand, TimerCommand};
pub use config::{Config, RetentionConfig};
