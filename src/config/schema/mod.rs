mod env_overrides;
mod loader;

use crate::core::runner::{DEFAULT_STEP_TIMEOUT_SECS, RunnerOptions};
use crate::error::ConfigError;
use crate::process::DEFAULT_MAX_OUTPUT_BYTES;
use crate::resources::DEFAULT_POSTGRES_USER;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where this config was read from. `None` when running on defaults.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
    pub runner: RunnerConfig,
    pub shell: ShellConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Steps in flight at once. `1` runs strictly in topological order.
    pub max_parallel: usize,
    /// Applied to steps without a `timeout_secs` of their own.
    pub default_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            default_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// OS account `psql` runs as.
    pub postgres_user: String,
    /// Per-stream capture limit for child process output.
    pub max_output_bytes: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            postgres_user: DEFAULT_POSTGRES_USER.into(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// "trace" | "debug" | "info" | "warn" | "error"
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.max_parallel == 0 {
            return Err(ConfigError::Validation(
                "runner.max_parallel must be at least 1".into(),
            ));
        }
        if self.runner.default_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "runner.default_timeout_secs must be at least 1".into(),
            ));
        }
        if self.shell.postgres_user.trim().is_empty() {
            return Err(ConfigError::Validation(
                "shell.postgres_user cannot be empty".into(),
            ));
        }
        if self.shell.max_output_bytes == 0 {
            return Err(ConfigError::Validation(
                "shell.max_output_bytes must be at least 1".into(),
            ));
        }
        if Level::from_str(&self.observability.log_level).is_err() {
            return Err(ConfigError::Validation(format!(
                "observability.log_level {:?} is not one of trace, debug, info, warn, error",
                self.observability.log_level
            )));
        }
        Ok(())
    }

    /// Configured log level, INFO when unparseable.
    pub fn log_level(&self) -> Level {
        Level::from_str(&self.observability.log_level).unwrap_or(Level::INFO)
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            max_parallel: self.runner.max_parallel,
            default_timeout: Duration::from_secs(self.runner.default_timeout_secs),
        }
    }
}
