//! Test execution runner
//!
//! Drives one (test, parameters) pair through the library with its per-test
//! reports open around the call.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::multiplexer::Multiplexer;
use crate::library::{LibraryError, RunRequest, TestLibrary};
use crate::models::{Mask, TestPair, TestRun};
use crate::report::{ReportError, TestReport};

/// Why a row did not complete
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Worker task failed: {0}")]
    Join(String),
}

/// Result of one row. A failing test is still `Completed`; `Crashed` means the
/// harness could not finish the row.
#[derive(Debug)]
pub enum Outcome {
    Completed(TestRun),
    Crashed(RunError),
}

/// Runs pairs against a shared library
pub struct TestRunner<L: ?Sized> {
    library: Arc<L>,
    capture_stdout: bool,
    capture_stderr: bool,
}

impl<L: ?Sized> Clone for TestRunner<L> {
    fn clone(&self) -> Self {
        Self {
            library: Arc::clone(&self.library),
            capture_stdout: self.capture_stdout,
            capture_stderr: self.capture_stderr,
        }
    }
}

impl<L: TestLibrary + ?Sized> TestRunner<L> {
    /// Create a new test runner
    pub fn new(library: Arc<L>) -> Self {
        Self {
            library,
            capture_stdout: false,
            capture_stderr: false,
        }
    }

    /// Ask the library to capture printed output into the run result
    pub fn with_capture(mut self, stdout: bool, stderr: bool) -> Self {
        self.capture_stdout = stdout;
        self.capture_stderr = stderr;
        self
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    /// Run `pair` with `reports[i]` subscribed to `masks[i]`.
    ///
    /// Every report that was opened is closed again, in reverse order, whatever
    /// happens in between.
    pub fn run<T: TestReport>(&self, pair: &TestPair, reports: &mut [T], masks: &[Mask]) -> Outcome {
        debug!("Running test {} with {}", pair.index, pair.params);

        let mut opened = 0;
        let result = self.enter_and_run(pair, reports, masks, &mut opened);

        let mut close_error = None;
        for report in reports[..opened].iter_mut().rev() {
            if let Err(e) = report.close() {
                warn!("Failed to close report for test {}: {}", pair.index, e);
                close_error.get_or_insert(e);
            }
        }

        match (result, close_error) {
            (Ok(run), None) => Outcome::Completed(run),
            (Ok(_), Some(e)) => Outcome::Crashed(e.into()),
            (Err(e), _) => Outcome::Crashed(e),
        }
    }

    fn enter_and_run<T: TestReport>(
        &self,
        pair: &TestPair,
        reports: &mut [T],
        masks: &[Mask],
        opened: &mut usize,
    ) -> Result<TestRun, RunError> {
        for report in reports.iter_mut() {
            report.open()?;
            *opened += 1;
        }

        let request = RunRequest::new(pair.index, &pair.params)
            .capture(self.capture_stdout, self.capture_stderr);
        let mut mux = Multiplexer::new(reports, masks);
        let run = self.library.run_test(request, &mut mux);
        let delivered = mux.finish();
        let run = run?;
        delivered?;

        for (report, mask) in reports.iter_mut().zip(masks) {
            report.finalize(&run, &run.counts.masked(mask))?;
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::TestSuite;
    use crate::models::{Counts, Event, EventKind, Parameters};
    use serde_json::json;

    #[derive(Default)]
    struct Trace {
        calls: Vec<String>,
        fail_open: bool,
    }

    impl TestReport for Trace {
        fn open(&mut self) -> Result<(), ReportError> {
            if self.fail_open {
                return Err(ReportError::NotOpen("trace"));
            }
            self.calls.push("open".into());
            Ok(())
        }

        fn handle(&mut self, event: &Event) -> Result<(), ReportError> {
            self.calls.push(event.kind.name().to_string());
            Ok(())
        }

        fn finalize(&mut self, _run: &TestRun, counts: &Counts) -> Result<(), ReportError> {
            self.calls.push(format!("finalize {:?}", counts.as_array()));
            Ok(())
        }

        fn close(&mut self) -> Result<(), ReportError> {
            self.calls.push("close".into());
            Ok(())
        }
    }

    fn library() -> Arc<TestSuite> {
        let mut suite = TestSuite::new();
        suite.test("mixed", |ctx, _| {
            ctx.require(true);
            ctx.require(false);
            Ok(Some(json!("done")))
        });
        suite.test("needs-args", |_, _| Ok(None)).arity(1);
        Arc::new(suite)
    }

    #[test]
    fn test_lifecycle_and_masked_counts() {
        let runner = TestRunner::new(library());
        let mut reports = vec![Trace::default(), Trace::default()];
        let masks = [Mask::all(), Mask::problems()];

        let outcome = runner.run(&TestPair::new(0, Parameters::empty()), &mut reports, &masks);
        let Outcome::Completed(run) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(run.value, Some(json!("done")));
        assert_eq!(run.counts.as_array(), [1, 1, 0, 0, 0]);

        assert_eq!(
            reports[0].calls,
            ["open", "Success", "Failure", "finalize [1, 1, 0, 0, 0]", "close"]
        );
        assert_eq!(
            reports[1].calls,
            ["open", "Failure", "finalize [1, 0, 0, 0, 0]", "close"]
        );
    }

    #[test]
    fn test_library_error_crashes_but_closes() {
        let runner = TestRunner::new(library());
        let mut reports = vec![Trace::default()];
        let outcome = runner.run(&TestPair::new(1, Parameters::empty()), &mut reports, &[Mask::all()]);

        assert!(matches!(
            outcome,
            Outcome::Crashed(RunError::Library(LibraryError::Arguments { .. }))
        ));
        assert_eq!(reports[0].calls, ["open", "close"]);
    }

    #[test]
    fn test_open_failure_closes_opened_only() {
        let runner = TestRunner::new(library());
        let mut reports = vec![
            Trace::default(),
            Trace {
                fail_open: true,
                ..Trace::default()
            },
        ];
        let outcome = runner.run(
            &TestPair::new(0, Parameters::empty()),
            &mut reports,
            &[Mask::all(), Mask::all()],
        );

        assert!(matches!(outcome, Outcome::Crashed(_)));
        assert_eq!(reports[0].calls, ["open", "close"]);
        assert!(reports[1].calls.is_empty());
    }
}
