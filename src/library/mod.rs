//! Test library interface
//!
//! The harness never owns test bodies. It talks to a compiled test library through
//! [`TestLibrary`]: enumerate descriptors, then run one test at a time while the
//! library calls back into an [`EventHandler`] for every event the body raises.
//!
//! [`TestSuite`] is an in-process implementation for tests written as Rust closures.

mod suite;

pub use suite::{Abort, Context, TestBuilder, TestSuite};

use thiserror::Error;

use crate::models::{CompileInfo, Event, EventKind, Parameters, TestInfo, TestRun};

/// Errors escaping a test library entry point
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LibraryError {
    #[error("Test index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("Test '{test}' expects {expected} arguments but got {got}")]
    Arguments {
        test: String,
        expected: usize,
        got: usize,
    },

    #[error("Test '{test}' has no parameter pack {index}")]
    PackIndex { test: String, index: usize },

    #[error("Test '{test}' aborted: {message}")]
    Aborted { test: String, message: String },
}

/// Receiver of events raised while a test body runs.
///
/// `wants` reports whether a callback slot is filled for a kind. Libraries should
/// skip building log entries for kinds nobody wants.
pub trait EventHandler {
    fn wants(&self, kind: EventKind) -> bool;

    fn handle(&mut self, event: Event);
}

/// Handler with every slot empty
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl EventHandler for NullHandler {
    fn wants(&self, _kind: EventKind) -> bool {
        false
    }

    fn handle(&mut self, _event: Event) {}
}

/// One call into the library
#[derive(Clone, Copy, Debug)]
pub struct RunRequest<'a> {
    pub index: usize,
    pub params: &'a Parameters,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
}

impl<'a> RunRequest<'a> {
    pub fn new(index: usize, params: &'a Parameters) -> Self {
        Self {
            index,
            params,
            capture_stdout: false,
            capture_stderr: false,
        }
    }

    pub fn capture(mut self, stdout: bool, stderr: bool) -> Self {
        self.capture_stdout = stdout;
        self.capture_stderr = stderr;
        self
    }
}

/// A compiled collection of tests.
///
/// Indices passed to the accessors must be below [`TestLibrary::test_count`].
pub trait TestLibrary: Send + Sync {
    fn test_count(&self) -> usize;

    fn test_info(&self, index: usize) -> TestInfo;

    fn test_name(&self, index: usize) -> String {
        self.test_info(index).name
    }

    /// Number of pre-registered parameter packs
    fn parameter_count(&self, index: usize) -> usize;

    fn compile_info(&self) -> CompileInfo;

    /// Run one test body to completion, delivering events synchronously to `handler`.
    ///
    /// Test-level failures are events, never errors. An `Err` means the entry point
    /// itself was aborted.
    fn run_test(
        &self,
        request: RunRequest<'_>,
        handler: &mut dyn EventHandler,
    ) -> Result<TestRun, LibraryError>;
}
