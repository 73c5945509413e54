// SPDX-License-Identifier: MIT

//! Daemon configuration: a TOML file on disk, overridable by `AMELIA_*`
//! environment variables layered over a resolved state directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

/// Recognized configuration options, plus `data_dir` and `log_format`.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub max_concurrent: usize,
    pub shutdown_timeout: Duration,
    pub health_check_interval: Duration,
    pub retention_days: u64,
    pub retention_max_events: u64,
    pub log_format: LogFormat,
}

/// On-disk shape; every field optional so a partial (or absent) TOML
/// file still loads, with defaults and env overrides filling the rest.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    data_dir: Option<PathBuf>,
    max_concurrent: Option<usize>,
    shutdown_timeout: Option<u64>,
    health_check_interval: Option<u64>,
    retention_days: Option<u64>,
    retention_max_events: Option<u64>,
    log_format: Option<LogFormat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_concurrent: 5,
            shutdown_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(30),
            retention_days: 30,
            retention_max_events: 0,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load defaults, then a TOML file at `path` if present, then
    /// `AMELIA_*` environment overrides, in that precedence order.
    pub fn load(path: Option<&Path>) -> Result<Self, DaemonError> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)?;
                let raw: RawConfig = toml::from_str(&contents)
                    .map_err(|e| DaemonError::Config(format!("{}: {e}", path.display())))?;
                config.apply(raw);
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    fn apply(&mut self, raw: RawConfig) {
        if let Some(v) = raw.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = raw.max_concurrent {
            self.max_concurrent = v;
        }
        if let Some(v) = raw.shutdown_timeout {
            self.shutdown_timeout = Duration::from_secs(v);
        }
        if let Some(v) = raw.health_check_interval {
            self.health_check_interval = Duration::from_secs(v);
        }
        if let Some(v) = raw.retention_days {
            self.retention_days = v;
        }
        if let Some(v) = raw.retention_max_events {
            self.retention_max_events = v;
        }
        if let Some(v) = raw.log_format {
            self.log_format = v;
        }
    }

    fn apply_env(&mut self) -> Result<(), DaemonError> {
        if let Ok(v) = std::env::var("AMELIA_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_env("AMELIA_MAX_CONCURRENT")? {
            self.max_concurrent = v;
        }
        if let Some(v) = parse_env::<u64>("AMELIA_SHUTDOWN_TIMEOUT")? {
            self.shutdown_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_env::<u64>("AMELIA_HEALTH_CHECK_INTERVAL")? {
            self.health_check_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_env("AMELIA_RETENTION_DAYS")? {
            self.retention_days = v;
        }
        if let Some(v) = parse_env("AMELIA_RETENTION_MAX_EVENTS")? {
            self.retention_max_events = v;
        }
        if let Ok(v) = std::env::var("AMELIA_LOG_FORMAT") {
            self.log_format = match v.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => return Err(DaemonError::Config(format!("invalid AMELIA_LOG_FORMAT: {other}"))),
            };
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, DaemonError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|_| DaemonError::Config(format!("invalid {key}: {v}"))),
        Err(_) => Ok(None),
    }
}

/// `AMELIA_STATE_DIR` > `XDG_STATE_HOME/amelia` > `~/.local/state/amelia`.
fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AMELIA_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("amelia");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".local/state/amelia")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
