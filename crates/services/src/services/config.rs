//! Runtime configuration: a TOML file with environment overrides on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_DATABASE_URL: &str = "HOMEKEEP_DATABASE_URL";
pub const ENV_SWEEP_HOUR_UTC: &str = "HOMEKEEP_SWEEP_HOUR_UTC";
pub const ENV_NOTIFICATIONS_ENABLED: &str = "HOMEKEEP_NOTIFICATIONS_ENABLED";
pub const ENV_NOTIFICATION_WEBHOOK_URL: &str = "HOMEKEEP_NOTIFICATION_WEBHOOK_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("sweep_hour_utc must be between 0 and 23, got {0}")]
    InvalidSweepHour(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// When set, task notifications are POSTed here; otherwise they are only logged.
    pub webhook_url: Option<String>,
    pub dashboard_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            dashboard_url: "http://localhost:3000/dashboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    /// UTC hour at which the daily sweeps run.
    pub sweep_hour_utc: u32,
    pub notifications: NotificationConfig,
    pub log_filter: Option<String>,
    /// File the values were read from, `None` for built-in defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://homekeep.db".to_string(),
            sweep_hour_utc: 0,
            notifications: NotificationConfig::default(),
            log_filter: None,
            source: None,
        }
    }
}

impl Config {
    /// `<config dir>/homekeep/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("homekeep").join("config.toml"))
    }

    /// Load from `path`, or from [`Config::default_path`] when it exists, then
    /// apply environment overrides and validate.
    ///
    /// An explicit `path` must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&raw)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay values found by `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(value) = lookup(ENV_SWEEP_HOUR_UTC) {
            self.sweep_hour_utc = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_SWEEP_HOUR_UTC,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_NOTIFICATIONS_ENABLED) {
            self.notifications.enabled = parse_bool(&value).ok_or(ConfigError::InvalidEnv {
                var: ENV_NOTIFICATIONS_ENABLED,
                value: value.clone(),
            })?;
        }
        if let Some(url) = lookup(ENV_NOTIFICATION_WEBHOOK_URL) {
            self.notifications.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_hour_utc > 23 {
            return Err(ConfigError::InvalidSweepHour(self.sweep_hour_utc));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
