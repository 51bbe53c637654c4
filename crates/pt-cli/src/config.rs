//! Configuration loading and management.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pt_core::{
    DEFAULT_RETENTION_DAYS, DayBoundary, RetentionPolicy, ValidationError, validate_period_length,
};
use pt_service::{RetryPolicy, RolloverConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};

/// Retention settings as written in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub horizon_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// User acting from the command line when `--user` is not given.
    pub user: Option<String>,

    /// Address the HTTP API listens on.
    pub bind: SocketAddr,

    /// Offset of the logical day from UTC, in minutes.
    pub utc_offset_minutes: i32,

    pub rollover: RolloverConfig,
    pub retention: RetentionConfig,
    pub scheduler: SchedulerConfig,
    pub aggregation: RetryPolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("user", &self.user)
            .field("bind", &self.bind)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("rollover", &self.rollover)
            .field("retention", &self.retention)
            .field("scheduler", &self.scheduler)
            .field("aggregation", &self.aggregation)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("pt.db"),
            user: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 7878)),
            utc_offset_minutes: 0,
            rollover: RolloverConfig::default(),
            retention: RetentionConfig::default(),
            scheduler: SchedulerConfig::default(),
            aggregation: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, the user config file, `config_path`, then
    /// `PT_*` environment variables (`PT_ROLLOVER__POLICY=catch-up`).
    /// Out-of-range values are rejected here rather than when first used.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("PT_").split("__"));

        let config: Self = figment.extract()?;
        config
            .validate()
            .map_err(|err| figment::Error::from(err.to_string()))?;
        Ok(config)
    }

    /// Checks the day boundary, retention horizon and default period length.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.day_boundary()?;
        self.retention_policy()?;
        validate_period_length(self.rollover.default_period_days)?;
        Ok(())
    }

    pub fn day_boundary(&self) -> Result<DayBoundary, ValidationError> {
        DayBoundary::from_utc_offset_minutes(self.utc_offset_minutes)
    }

    pub const fn retention_policy(&self) -> Result<RetentionPolicy, ValidationError> {
        RetentionPolicy::new(self.retention.horizon_days)
    }
}

/// Returns the platform-specific config directory for pt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pt"))
}

/// Returns the platform-specific data directory for pt.
///
/// On Linux: `~/.local/share/pt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("pt"))
}
