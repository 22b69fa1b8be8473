//! Test run result models
//!
//! Defines what a single run hands back and what a suite aggregates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::event::Counts;

/// Result of one (test, parameters) execution as reported by the test library
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub value: Option<Value>,
    /// Seconds measured by the library
    pub elapsed: f64,
    pub counts: Counts,
    pub stdout: String,
    pub stderr: String,
}

impl TestRun {
    pub fn new(elapsed: f64, counts: Counts) -> Self {
        Self {
            elapsed,
            counts,
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }
}

/// Aggregated results of a whole suite
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteTotals {
    /// Pairs executed to completion, duplicates included
    pub tests: usize,
    /// Rows whose library call escaped with an error
    pub crashed: usize,
    /// Sum of library-measured seconds
    pub elapsed: f64,
    pub counts: Counts,
    pub stdout: String,
    pub stderr: String,
}

impl SuiteTotals {
    /// Fold one completed run into the totals
    pub fn record(&mut self, run: &TestRun) {
        self.tests += 1;
        self.elapsed += run.elapsed;
        self.counts += run.counts;
        self.stdout.push_str(&run.stdout);
        self.stderr.push_str(&run.stderr);
    }
}

impl fmt::Display for SuiteTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tests", self.tests)?;
        for (kind, count) in self.counts.iter() {
            write!(f, " | {kind}: {count}")?;
        }
        if self.crashed > 0 {
            write!(f, " | crashed: {}", self.crashed)?;
        }
        write!(f, " | {:.3}s", self.elapsed)
    }
}
