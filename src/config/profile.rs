//! Selection profiles
//!
//! Named, reusable selections stored in the configuration file and chosen with
//! `--profile`. Explicit command-line selection takes precedence.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Saved selection criteria
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionProfile {
    /// Profile name
    pub name: String,
    /// Description
    pub description: String,
    /// Explicit test names
    pub tests: Vec<String>,
    /// Name regex, matched from the start
    pub regex: Option<String>,
    /// Run everything except the selection
    pub exclude: bool,
    /// Parameter file or inline JSON
    pub params: Option<String>,
    /// Worker threads for this profile
    pub jobs: Option<usize>,
}

impl SelectionProfile {
    /// Create a new, empty profile
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_tests<I, S>(mut self, tests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tests = tests.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    pub fn excluding(mut self, exclude: bool) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Reject empty names and malformed regexes
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Profile name must not be empty");
        }
        if let Some(pattern) = &self.regex {
            if let Err(e) = regex::Regex::new(pattern) {
                anyhow::bail!("Invalid regex in profile '{}': {}", self.name, e);
            }
        }
        if let Some(jobs) = self.jobs {
            if jobs > super::MAX_JOBS {
                anyhow::bail!("Profile '{}' asks for {} jobs", self.name, jobs);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_builder() {
        let profile = SelectionProfile::new("network")
            .with_description("socket tests")
            .with_tests(["net/connect"])
            .with_regex("net/")
            .excluding(true)
            .with_params(r#"{"net/connect": [[80]]}"#);

        assert_eq!(profile.tests, ["net/connect"]);
        assert!(profile.exclude);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_profile_validation() {
        assert!(SelectionProfile::new("").validate().is_err());
        assert!(SelectionProfile::new("bad").with_regex("(").validate().is_err());

        let profile = SelectionProfile {
            jobs: Some(100_000),
            ..SelectionProfile::new("many")
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_profile_yaml_defaults() {
        let profile: SelectionProfile = serde_yaml::from_str("name: quick\ntests: [a]\n").unwrap();
        assert_eq!(profile.name, "quick");
        assert_eq!(profile.regex, None);
        assert!(!profile.exclude);
    }
}
