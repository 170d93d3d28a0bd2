//! Automation configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `MATCHDAY_*` environment variables. The result is validated before use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::{BackoffStrategy, RetryPolicy};
use crate::snapshots::SnapshotRetention;

/// Prefix for environment overrides, e.g. `MATCHDAY_CONCURRENCY=8`.
pub const ENV_PREFIX: &str = "MATCHDAY_";

pub const MAX_CONCURRENCY: usize = 64;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },

    #[error("concurrency must be between 1 and {MAX_CONCURRENCY}, got {0}")]
    InvalidConcurrency(usize),

    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("backoff_base_ms ({base}) exceeds backoff_max_ms ({max})")]
    BackoffRange { base: u64, max: u64 },
}

/// Runtime knobs for the queue, snapshots and the lifecycle adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// When false the lifecycle adapter only validates (manual-only mode).
    pub enabled: bool,
    /// Worker pool size.
    pub concurrency: usize,
    /// Failed attempts before a job is dead-lettered.
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Wall-clock budget per job execution.
    pub job_timeout_secs: u64,
    /// Execution records kept for the history view.
    pub history_limit: usize,
    /// Completed jobs older than this are pruned from the job store.
    pub finished_job_retention_secs: u64,
    pub snapshot_max_count: usize,
    pub snapshot_max_age_days: u32,
    /// Idle wake-up interval for background workers (picks up delayed retries).
    pub poll_interval_ms: u64,
    /// How often the background maintenance task prunes finished jobs.
    pub maintenance_interval_secs: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 5,
            max_retries: 3,
            backoff: BackoffStrategy::Exponential,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
            job_timeout_secs: 30,
            history_limit: 500,
            finished_job_retention_secs: 24 * 60 * 60,
            snapshot_max_count: 20,
            snapshot_max_age_days: 30,
            poll_interval_ms: 250,
            maintenance_interval_secs: 60,
        }
    }
}

impl AutomationConfig {
    /// Defaults, overlaid by `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MATCHDAY_*` overrides. Unknown keys are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let invalid = || ConfigError::InvalidEnv {
                key: key.clone(),
                value: value.clone(),
            };

            match name {
                "ENABLED" => self.enabled = parse_bool(&value).ok_or_else(invalid)?,
                "CONCURRENCY" => self.concurrency = value.parse().map_err(|_| invalid())?,
                "MAX_RETRIES" => self.max_retries = value.parse().map_err(|_| invalid())?,
                "BACKOFF" => {
                    self.backoff = match value.to_ascii_lowercase().as_str() {
                        "fixed" => BackoffStrategy::Fixed,
                        "linear" => BackoffStrategy::Linear,
                        "exponential" => BackoffStrategy::Exponential,
                        _ => return Err(invalid()),
                    }
                }
                "BACKOFF_BASE_MS" => self.backoff_base_ms = value.parse().map_err(|_| invalid())?,
                "BACKOFF_MAX_MS" => self.backoff_max_ms = value.parse().map_err(|_| invalid())?,
                "JOB_TIMEOUT_SECS" => self.job_timeout_secs = value.parse().map_err(|_| invalid())?,
                "HISTORY_LIMIT" => self.history_limit = value.parse().map_err(|_| invalid())?,
                "FINISHED_JOB_RETENTION_SECS" => {
                    self.finished_job_retention_secs = value.parse().map_err(|_| invalid())?
                }
                "SNAPSHOT_MAX_COUNT" => self.snapshot_max_count = value.parse().map_err(|_| invalid())?,
                "SNAPSHOT_MAX_AGE_DAYS" => {
                    self.snapshot_max_age_days = value.parse().map_err(|_| invalid())?
                }
                "POLL_INTERVAL_MS" => self.poll_interval_ms = value.parse().map_err(|_| invalid())?,
                "MAINTENANCE_INTERVAL_SECS" => {
                    self.maintenance_interval_secs = value.parse().map_err(|_| invalid())?
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::NonPositive {
                field: "job_timeout_secs",
            });
        }
        if self.history_limit == 0 {
            return Err(ConfigError::NonPositive {
                field: "history_limit",
            });
        }
        if self.snapshot_max_count == 0 {
            return Err(ConfigError::NonPositive {
                field: "snapshot_max_count",
            });
        }
        if self.snapshot_max_age_days == 0 {
            return Err(ConfigError::NonPositive {
                field: "snapshot_max_age_days",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::NonPositive {
                field: "poll_interval_ms",
            });
        }
        if self.maintenance_interval_secs == 0 {
            return Err(ConfigError::NonPositive {
                field: "maintenance_interval_secs",
            });
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::BackoffRange {
                base: self.backoff_base_ms,
                max: self.backoff_max_ms,
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            strategy: self.backoff,
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn finished_job_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.finished_job_retention_secs as i64)
    }

    pub fn snapshot_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.snapshot_max_age_days))
    }

    pub fn snapshot_retention(&self) -> SnapshotRetention {
        SnapshotRetention {
            max_count: self.snapshot_max_count,
            max_age: self.snapshot_max_age(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
