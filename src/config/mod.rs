//! Configuration module
//!
//! Handles loading and managing harness defaults. Command-line flags override
//! environment variables, which override the configuration file.

mod env;
mod file;
mod profile;

pub use env::{EnvConfig, ENV_PREFIX};
pub use file::ConfigFile;
pub(crate) use file::is_yaml_file;
pub use profile::SelectionProfile;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{EventKind, Mask};
use crate::report::ColorPolicy;

/// Largest accepted worker count
pub const MAX_JOBS: usize = 256;

/// Largest accepted JSON indentation
pub const MAX_JSON_INDENT: usize = 16;

/// Harness defaults
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Worker threads; 0 or 1 runs sequentially
    pub jobs: usize,

    /// Capture printed output of test bodies
    pub capture: bool,

    /// Suite name used by JUnit and TeamCity reports
    pub suite: String,

    /// Console color policy: auto, always or never
    pub color: String,

    /// Omit console separator lines
    pub brief: bool,

    /// JSON report indentation
    pub json_indent: Option<usize>,

    /// Event kinds shown on the console when no event flag is given
    pub events: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            capture: false,
            suite: "unitrun".to_string(),
            color: "auto".to_string(),
            brief: false,
            json_indent: None,
            events: vec!["failure".to_string(), "exception".to_string()],
        }
    }
}

impl HarnessConfig {
    /// Check bounds and names
    pub fn validate(&self) -> Result<()> {
        if self.jobs > MAX_JOBS {
            anyhow::bail!("jobs must be at most {}, got {}", MAX_JOBS, self.jobs);
        }
        if let Some(indent) = self.json_indent {
            if indent > MAX_JSON_INDENT {
                anyhow::bail!(
                    "json_indent must be at most {}, got {}",
                    MAX_JSON_INDENT,
                    indent
                );
            }
        }
        self.color_policy()?;
        self.event_mask()?;
        Ok(())
    }

    pub fn color_policy(&self) -> Result<ColorPolicy> {
        ColorPolicy::from_str(&self.color)
            .with_context(|| format!("Unknown color policy '{}'", self.color))
    }

    /// Default console mask from `events`
    pub fn event_mask(&self) -> Result<Mask> {
        let kinds = self
            .events
            .iter()
            .map(|name| {
                EventKind::from_str(name).with_context(|| format!("Unknown event kind '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Mask::from_kinds(&kinds))
    }

    /// Apply environment overrides
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(jobs) = env.jobs {
            self.jobs = jobs;
        }
        if let Some(capture) = env.capture {
            self.capture = capture;
        }
        if let Some(suite) = &env.suite {
            self.suite = suite.clone();
        }
        if let Some(color) = &env.color {
            self.color = color.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.jobs, 0);
        assert_eq!(config.suite, "unitrun");
        assert_eq!(config.event_mask().unwrap(), Mask::problems());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds() {
        let config = HarnessConfig {
            jobs: MAX_JOBS + 1,
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());

        let config = HarnessConfig {
            json_indent: Some(100),
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());

        let config = HarnessConfig {
            events: vec!["explosion".to_string()],
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvConfig {
            jobs: Some(8),
            color: Some("never".to_string()),
            ..EnvConfig::default()
        };
        let config = HarnessConfig::default().with_env(&env);
        assert_eq!(config.jobs, 8);
        assert_eq!(config.color_policy().unwrap(), ColorPolicy::Never);
        assert!(!config.capture);
    }
}
