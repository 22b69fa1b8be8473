//! Test selection
//!
//! Turns user criteria into the ordered list of (test, parameters) pairs to run:
//! [`select`] resolves names, regexes and exclusion into indices, then [`expand`]
//! resolves each index into one or more parameter selections.

mod params;
mod selector;

pub use params::{expand, Expansion, ParamTable};
pub use selector::select;

use thiserror::Error;

/// Errors raised while selecting tests, before anything runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Unknown tests: {}", .0.join(", "))]
    NotFound(Vec<String>),

    #[error("Test '{test}' has {count} parameter packs, pack {index} does not exist")]
    PackIndex {
        test: String,
        index: usize,
        count: usize,
    },

    #[error("Invalid test regex '{pattern}': {message}")]
    Regex { pattern: String, message: String },

    #[error("Invalid parameter specification for '{test}': {message}")]
    Params { test: String, message: String },
}
