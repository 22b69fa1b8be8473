//! Parameter expansion
//!
//! Maps each selected index to its parameter selections and expands wildcards
//! into every registered pack.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::SelectionError;
use crate::config::is_yaml_file;
use crate::library::TestLibrary;
use crate::models::{ParamSpec, Parameters, TestPair};

/// Per-test parameter selections with an optional fallback
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamTable {
    by_name: HashMap<String, Vec<ParamSpec>>,
    default: Option<Vec<ParamSpec>>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test(mut self, name: impl Into<String>, specs: Vec<ParamSpec>) -> Self {
        self.by_name.insert(name.into(), specs);
        self
    }

    pub fn with_default(mut self, specs: Vec<ParamSpec>) -> Self {
        self.default = Some(specs);
        self
    }

    /// Specs for a test. Without an entry or a default, a test with packs runs every
    /// pack and a test without packs runs once with no arguments.
    pub fn specs_for(&self, name: &str, pack_count: usize) -> Vec<ParamSpec> {
        if let Some(specs) = self.by_name.get(name).or(self.default.as_ref()) {
            return specs.clone();
        }
        if pack_count > 0 {
            vec![ParamSpec::All]
        } else {
            vec![ParamSpec::Args(Vec::new())]
        }
    }

    /// Build from a JSON object of `name -> spec | [spec, ...]`; the key `default`
    /// sets the fallback.
    pub fn from_json(value: &Value) -> Result<Self, SelectionError> {
        let object = value.as_object().ok_or_else(|| SelectionError::Params {
            test: "*".to_string(),
            message: "expected an object mapping test names to parameters".to_string(),
        })?;

        let mut table = Self::new();
        for (name, entry) in object {
            let specs = parse_specs(name, entry)?;
            if name == "default" {
                table.default = Some(specs);
            } else {
                table.by_name.insert(name.clone(), specs);
            }
        }
        Ok(table)
    }

    /// Load from a JSON or YAML file path, or parse `source` as inline JSON
    pub fn load(source: &str) -> Result<Self> {
        let path = Path::new(source);
        let value: Value = if path.is_file() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read parameter file: {}", path.display()))?;
            if is_yaml_file(path) {
                serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse YAML parameters: {}", path.display()))?
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON parameters: {}", path.display()))?
            }
        } else {
            serde_json::from_str(source).context("Failed to parse inline JSON parameters")?
        };

        Ok(Self::from_json(&value)?)
    }
}

fn parse_specs(name: &str, entry: &Value) -> Result<Vec<ParamSpec>, SelectionError> {
    let parse = |v: &Value| {
        ParamSpec::from_json(v).ok_or_else(|| SelectionError::Params {
            test: name.to_string(),
            message: format!("cannot interpret {v} as a parameter selection"),
        })
    };

    match entry {
        Value::Array(items) => items.iter().map(parse).collect(),
        other => Ok(vec![parse(other)?]),
    }
}

/// Lazy sequence of execution pairs produced by [`expand`]
pub struct Expansion<'a, L: TestLibrary + ?Sized> {
    library: &'a L,
    table: &'a ParamTable,
    indices: std::vec::IntoIter<usize>,
    pending: std::collections::VecDeque<TestPair>,
    failed: bool,
}

impl<L: TestLibrary + ?Sized> Iterator for Expansion<'_, L> {
    type Item = Result<TestPair, SelectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(pair) = self.pending.pop_front() {
                return Some(Ok(pair));
            }
            let index = self.indices.next()?;
            if let Err(e) = self.expand_index(index) {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

impl<L: TestLibrary + ?Sized> Expansion<'_, L> {
    fn expand_index(&mut self, index: usize) -> Result<(), SelectionError> {
        let name = self.library.test_name(index);
        let count = self.library.parameter_count(index);

        for spec in self.table.specs_for(&name, count) {
            match spec {
                ParamSpec::Args(args) => {
                    self.pending.push_back(TestPair::new(index, Parameters::Args(args)));
                }
                ParamSpec::Pack(pack) if pack < count => {
                    self.pending.push_back(TestPair::new(index, Parameters::Pack(pack)));
                }
                ParamSpec::Pack(pack) => {
                    return Err(SelectionError::PackIndex {
                        test: name,
                        index: pack,
                        count,
                    });
                }
                ParamSpec::All => {
                    self.pending
                        .extend((0..count).map(|p| TestPair::new(index, Parameters::Pack(p))));
                }
            }
        }
        debug!("Expanded test {} ({}) to {} runs", index, name, self.pending.len());
        Ok(())
    }
}

/// Expand selected indices into execution pairs, in order.
///
/// The sequence stops after the first error.
pub fn expand<'a, L: TestLibrary + ?Sized>(
    library: &'a L,
    indices: Vec<usize>,
    table: &'a ParamTable,
) -> Expansion<'a, L> {
    Expansion {
        library,
        table,
        indices: indices.into_iter(),
        pending: Default::default(),
        failed: false,
    }
}
