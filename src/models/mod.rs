//! Data models for the test harness
//!
//! This module contains the data structures shared by selection, execution and reporting.

mod event;
mod test_info;
mod test_result;

pub use event::{Counts, Event, EventKind, LogEntry, Mask};
pub use test_info::{CompileInfo, ParamSpec, Parameters, TestInfo, TestPair};
pub use test_result::{SuiteTotals, TestRun};
