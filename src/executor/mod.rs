//! Test execution engine
//!
//! Routes events to per-test reports, runs single pairs, and drives whole suites
//! sequentially or on a worker pool.

mod multiplexer;
mod runner;
mod suite;

pub use multiplexer::{Multiplexer, Route};
pub use runner::{Outcome, RunError, TestRunner};
pub use suite::{Executor, SuiteDriver, SuiteError};
