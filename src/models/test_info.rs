//! Test descriptors and parameter selections
//!
//! Describes what the test library exposes per test and how a caller selects
//! the argument pack a test runs with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Descriptor of one registered test
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub description: Option<String>,
}

impl TestInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            line: None,
            description: None,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// `file:line`, `file`, or nothing
    pub fn location(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{file}:{line}")),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }
}

/// Build metadata of the test library
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileInfo {
    #[serde(rename = "name")]
    pub compiler: String,
    pub date: String,
    pub time: String,
}

impl CompileInfo {
    pub fn new(
        compiler: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Self {
            compiler: compiler.into(),
            date: date.into(),
            time: time.into(),
        }
    }
}

/// Requested parameters for a test, before expansion
#[derive(Clone, Debug, PartialEq)]
pub enum ParamSpec {
    /// Literal argument tuple
    Args(Vec<Value>),
    /// Index of a pre-registered parameter pack
    Pack(usize),
    /// Every registered pack, in order
    All,
}

impl ParamSpec {
    /// Interpret a JSON value: array → tuple, integer → pack, `"*"` or null → all packs
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(args) => Some(ParamSpec::Args(args.clone())),
            Value::Number(n) => n.as_u64().map(|n| ParamSpec::Pack(n as usize)),
            Value::Null => Some(ParamSpec::All),
            Value::String(s) if s == "*" => Some(ParamSpec::All),
            _ => None,
        }
    }
}

/// Parameters of one execution unit, after expansion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameters {
    Pack(usize),
    Args(Vec<Value>),
}

impl Parameters {
    pub fn empty() -> Self {
        Parameters::Args(Vec::new())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameters::Pack(i) => write!(f, "pack {i}"),
            Parameters::Args(args) => {
                let parts: Vec<_> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// One execution unit: a test index with resolved parameters
#[derive(Clone, Debug, PartialEq)]
pub struct TestPair {
    pub index: usize,
    pub params: Parameters,
}

impl TestPair {
    pub fn new(index: usize, params: Parameters) -> Self {
        Self { index, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_location() {
        let info = TestInfo::new("add").with_location("math.rs", 12);
        assert_eq!(info.location().as_deref(), Some("math.rs:12"));
        assert_eq!(TestInfo::new("x").location(), None);
    }

    #[test]
    fn test_param_spec_from_json() {
        assert_eq!(
            ParamSpec::from_json(&json!([1, "a"])),
            Some(ParamSpec::Args(vec![json!(1), json!("a")]))
        );
        assert_eq!(ParamSpec::from_json(&json!(2)), Some(ParamSpec::Pack(2)));
        assert_eq!(ParamSpec::from_json(&json!("*")), Some(ParamSpec::All));
        assert_eq!(ParamSpec::from_json(&json!(null)), Some(ParamSpec::All));
        assert_eq!(ParamSpec::from_json(&json!(-1)), None);
        assert_eq!(ParamSpec::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_parameters_json() {
        assert_eq!(Parameters::Pack(3).to_json(), json!(3));
        assert_eq!(Parameters::empty().to_json(), json!([]));
        assert_eq!(Parameters::Args(vec![json!(1), json!(2)]).to_string(), "(1, 2)");
    }
}
