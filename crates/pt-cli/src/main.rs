use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use pt_cli::commands::{TrackerSession, daily, serve, sync, task, timer, today, util};
use pt_cli::{Cli, Commands, Config};
use pt_core::UserId;

/// Load config and ensure the database directory exists.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init so tests that already installed a subscriber don't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(command, cli.user.as_deref(), &config))
}

fn open_session(config: &Config, user: Option<&str>) -> Result<(TrackerSession, UserId)> {
    let user = util::resolve_user(user, config.user.as_deref())?;
    Ok((TrackerSession::start(config)?, user))
}

async fn dispatch(command: Commands, user: Option<&str>, config: &Config) -> Result<()> {
    let mut stdout = std::io::stdout();
    match command {
        Commands::Daily { at } => {
            let at = match at {
                Some(at) => util::parse_datetime(&at)?,
                None => Utc::now(),
            };
            daily::run(&mut stdout, config, at).await
        }
        Commands::Serve { bind } => serve::run(config, bind.unwrap_or(config.bind)).await,
        Commands::Timer(command) => {
            let (session, user) = open_session(config, user)?;
            let result = timer::run(&mut stdout, &session.tracker, &user, command).await;
            result.and(session.finish().await)
        }
        Commands::Today { json } => {
            let (session, user) = open_session(config, user)?;
            let result = today::run(&mut stdout, &session.tracker, &user, json).await;
            result.and(session.finish().await)
        }
        Commands::Sync { since } => {
            let (session, user) = open_session(config, user)?;
            let result = sync::run(&mut stdout, &session.tracker, &user, &since).await;
            result.and(session.finish().await)
        }
        Commands::Task(command) => {
            let (session, user) = open_session(config, user)?;
            let result = task::run(&mut stdout, &session.tracker, &user, command).await;
            result.and(session.finish().await)
        }
    }
}
