//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "UNITRUN";

/// Overrides read from `UNITRUN_*` variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// Worker threads from UNITRUN_JOBS
    pub jobs: Option<usize>,
    /// Output capture from UNITRUN_CAPTURE
    pub capture: Option<bool>,
    /// Suite name from UNITRUN_SUITE
    pub suite: Option<String>,
    /// Color policy from UNITRUN_COLOR
    pub color: Option<String>,
    /// Config file from UNITRUN_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            jobs: get_env_parse("JOBS"),
            capture: get_env_bool("CAPTURE"),
            suite: get_env("SUITE"),
            color: get_env("COLOR"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.jobs.is_some()
            || self.capture.is_some()
            || self.suite.is_some()
            || self.color.is_some()
            || self.config_file.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}
