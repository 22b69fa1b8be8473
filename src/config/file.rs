//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::profile::SelectionProfile;
use super::HarnessConfig;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./unitrun.yaml",
    "./unitrun.yml",
    "./.unitrun.yaml",
    "~/.config/unitrun/config.yaml",
];

const SUPPORTED_VERSIONS: &[&str] = &["1"];

/// Full configuration file structure
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Harness defaults
    #[serde(default)]
    pub harness: HarnessConfig,

    /// Named selections
    #[serde(default)]
    pub profiles: Vec<SelectionProfile>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            harness: HarnessConfig::default(),
            profiles: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }

        self.harness.validate()?;

        for (i, profile) in self.profiles.iter().enumerate() {
            if self.profiles[..i].iter().any(|p| p.name == profile.name) {
                anyhow::bail!("Duplicate profile '{}'", profile.name);
            }
            profile.validate()?;
        }

        Ok(())
    }

    /// Get profile by name
    pub fn profile(&self, name: &str) -> Option<&SelectionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
pub(crate) fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_default() {
        let config = ConfigFile::default();
        assert_eq!(config.version, "1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let mut config = ConfigFile::default();
        config.harness.jobs = 3;
        config.profiles.push(SelectionProfile::new("smoke").with_tests(["a", "b"]));

        let yaml = dir.path().join("config.yaml");
        std::fs::write(&yaml, serde_yaml::to_string(&config).unwrap()).unwrap();
        let json = dir.path().join("config.json");
        std::fs::write(&json, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        for path in [yaml, json] {
            assert_eq!(ConfigFile::load(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unitrun.yaml");
        std::fs::write(&path, "harness:\n  jobs: 4\n  events: [failure, timing]\n").unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.harness.jobs, 4);
        assert_eq!(config.harness.color, "auto");
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_validate_config() {
        let config = ConfigFile {
            version: "9".to_string(),
            ..ConfigFile::default()
        };
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.profiles.push(SelectionProfile::new("x"));
        config.profiles.push(SelectionProfile::new("x"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_harness() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"harness": {"jobs": 100000}}"#).unwrap();
        assert!(ConfigFile::load(&path).is_err());
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));
    }
}
