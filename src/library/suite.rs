//! In-process test library
//!
//! Registers Rust closures as tests and runs them behind the [`TestLibrary`]
//! interface, raising events through a [`Context`].

use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use super::{EventHandler, LibraryError, RunRequest, TestLibrary};
use crate::models::{CompileInfo, Counts, Event, EventKind, LogEntry, Parameters, TestInfo, TestRun};

type TestBody = dyn Fn(&mut Context<'_>, &[Value]) -> anyhow::Result<Option<Value>> + Send + Sync;

/// Error a test body returns to abort the library call instead of raising an
/// `Exception` event
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Abort(pub String);

struct Registered {
    info: TestInfo,
    arity: Option<usize>,
    packs: Vec<Vec<Value>>,
    body: Box<TestBody>,
}

/// Collection of closure-backed tests
pub struct TestSuite {
    tests: Vec<Registered>,
    compile_info: CompileInfo,
}

impl TestSuite {
    pub fn new() -> Self {
        Self {
            tests: Vec::new(),
            compile_info: CompileInfo::new(
                concat!("rustc (", env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), ")"),
                "",
                "",
            ),
        }
    }

    pub fn with_compile_info(mut self, info: CompileInfo) -> Self {
        self.compile_info = info;
        self
    }

    /// Register a test and return a builder for its metadata
    pub fn test<F>(&mut self, name: impl Into<String>, body: F) -> TestBuilder<'_>
    where
        F: Fn(&mut Context<'_>, &[Value]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.tests.push(Registered {
            info: TestInfo::new(name),
            arity: None,
            packs: Vec::new(),
            body: Box::new(body),
        });
        let last = self.tests.len() - 1;
        TestBuilder {
            test: &mut self.tests[last],
        }
    }

    /// Find a test index by exact name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.tests.iter().position(|t| t.info.name == name)
    }

    fn get(&self, index: usize) -> Result<&Registered, LibraryError> {
        self.tests
            .get(index)
            .ok_or(LibraryError::IndexOutOfRange(index))
    }
}

impl Default for TestSuite {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one registered test
pub struct TestBuilder<'a> {
    test: &'a mut Registered,
}

impl TestBuilder<'_> {
    pub fn location(self, file: impl Into<String>, line: u32) -> Self {
        self.test.info.file = Some(file.into());
        self.test.info.line = Some(line);
        self
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.test.info.description = Some(description.into());
        self
    }

    /// Require exactly `n` arguments per call
    pub fn arity(self, n: usize) -> Self {
        self.test.arity = Some(n);
        self
    }

    /// Add a pre-registered parameter pack
    pub fn pack(self, args: Vec<Value>) -> Self {
        self.test.packs.push(args);
        self
    }
}

impl TestLibrary for TestSuite {
    fn test_count(&self) -> usize {
        self.tests.len()
    }

    fn test_info(&self, index: usize) -> TestInfo {
        self.tests[index].info.clone()
    }

    fn parameter_count(&self, index: usize) -> usize {
        self.tests[index].packs.len()
    }

    fn compile_info(&self) -> CompileInfo {
        self.compile_info.clone()
    }

    fn run_test(
        &self,
        request: RunRequest<'_>,
        handler: &mut dyn EventHandler,
    ) -> Result<TestRun, LibraryError> {
        let test = self.get(request.index)?;

        let args = match request.params {
            Parameters::Args(args) => args.clone(),
            Parameters::Pack(i) => test
                .packs
                .get(*i)
                .cloned()
                .ok_or_else(|| LibraryError::PackIndex {
                    test: test.info.name.clone(),
                    index: *i,
                })?,
        };

        if let Some(expected) = test.arity {
            if args.len() != expected {
                return Err(LibraryError::Arguments {
                    test: test.info.name.clone(),
                    expected,
                    got: args.len(),
                });
            }
        }

        let start = Instant::now();
        let mut ctx = Context::new(handler, request.capture_stdout, request.capture_stderr);
        let result = catch_unwind(AssertUnwindSafe(|| (test.body)(&mut ctx, &args)));

        let value = match result {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                if let Some(abort) = e.downcast_ref::<Abort>() {
                    return Err(LibraryError::Aborted {
                        test: test.info.name.clone(),
                        message: abort.0.clone(),
                    });
                }
                ctx.exception(format!("{e:#}"));
                None
            }
            Err(payload) => {
                ctx.exception(panic_message(payload.as_ref()));
                None
            }
        };

        Ok(TestRun {
            value,
            elapsed: start.elapsed().as_secs_f64(),
            counts: ctx.counts,
            stdout: ctx.stdout,
            stderr: ctx.stderr,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Handle a test body uses to raise events
pub struct Context<'h> {
    handler: &'h mut dyn EventHandler,
    scopes: Vec<String>,
    logs: Vec<LogEntry>,
    counts: Counts,
    capture_stdout: bool,
    capture_stderr: bool,
    stdout: String,
    stderr: String,
}

impl<'h> Context<'h> {
    fn new(handler: &'h mut dyn EventHandler, capture_stdout: bool, capture_stderr: bool) -> Self {
        Self {
            handler,
            scopes: Vec::new(),
            logs: Vec::new(),
            counts: Counts::default(),
            capture_stdout,
            capture_stderr,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Log a key/value pair attached to the next event
    pub fn info(&mut self, key: impl Into<String>, value: impl Serialize) -> &mut Self {
        self.logs.push((key.into(), to_value(&value)));
        self
    }

    /// Log a comment attached to the next event
    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.logs.push(("comment".to_string(), Value::String(text.into())));
        self
    }

    /// Attach a source location to the next event
    pub fn at(&mut self, file: &str, line: u32) -> &mut Self {
        self.logs.push(("file".to_string(), Value::from(file)));
        self.logs.push(("line".to_string(), Value::from(line)));
        self
    }

    /// Run `f` inside a named sub-scope
    pub fn section<R>(&mut self, name: impl Into<String>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scopes.push(name.into());
        let out = f(self);
        self.scopes.pop();
        out
    }

    /// Raise an event of `kind`, consuming the pending logs
    pub fn handle(&mut self, kind: EventKind) {
        if self.handler.wants(kind) {
            let event = Event {
                kind,
                scopes: self.scopes.clone(),
                logs: std::mem::take(&mut self.logs),
            };
            self.handler.handle(event);
        }
        self.counts.increment(kind);
        self.logs.clear();
    }

    /// Raise `Success` if `ok`, otherwise `Failure`
    pub fn require(&mut self, ok: bool) -> bool {
        self.handle(if ok { EventKind::Success } else { EventKind::Failure });
        ok
    }

    fn compare<T: Serialize + ?Sized>(&mut self, ok: bool, lhs: &T, op: &str, rhs: &T) -> bool {
        if !self.handler.wants(if ok { EventKind::Success } else { EventKind::Failure }) {
            self.logs.clear();
            return self.require(ok);
        }
        self.logs.push(("lhs".to_string(), to_value(lhs)));
        self.logs.push(("op".to_string(), Value::from(op)));
        self.logs.push(("rhs".to_string(), to_value(rhs)));
        self.require(ok)
    }

    pub fn equal<T: PartialEq + Serialize + ?Sized>(&mut self, lhs: &T, rhs: &T) -> bool {
        self.compare(lhs == rhs, lhs, "==", rhs)
    }

    pub fn not_equal<T: PartialEq + Serialize + ?Sized>(&mut self, lhs: &T, rhs: &T) -> bool {
        self.compare(lhs != rhs, lhs, "!=", rhs)
    }

    pub fn less<T: PartialOrd + Serialize + ?Sized>(&mut self, lhs: &T, rhs: &T) -> bool {
        self.compare(lhs < rhs, lhs, "<", rhs)
    }

    pub fn greater<T: PartialOrd + Serialize + ?Sized>(&mut self, lhs: &T, rhs: &T) -> bool {
        self.compare(lhs > rhs, lhs, ">", rhs)
    }

    pub fn less_eq<T: PartialOrd + Serialize + ?Sized>(&mut self, lhs: &T, rhs: &T) -> bool {
        self.compare(lhs <= rhs, lhs, "<=", rhs)
    }

    pub fn greater_eq<T: PartialOrd + Serialize + ?Sized>(&mut self, lhs: &T, rhs: &T) -> bool {
        self.compare(lhs >= rhs, lhs, ">=", rhs)
    }

    /// Approximate equality within an absolute tolerance
    pub fn within(&mut self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        let difference = (lhs - rhs).abs();
        let ok = difference <= tolerance;
        self.info("tolerance", tolerance).info("difference", difference);
        self.compare(ok, &lhs, "~~", &rhs)
    }

    /// Raise a `Timing` event carrying `seconds`
    pub fn timing(&mut self, seconds: f64) {
        self.info("value", seconds);
        self.handle(EventKind::Timing);
    }

    /// Time `f` and raise a `Timing` event with the elapsed seconds
    pub fn timed<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.timing(start.elapsed().as_secs_f64());
        out
    }

    /// Raise a `Skipped` event
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.comment(reason);
        self.handle(EventKind::Skipped);
    }

    /// Raise an `Exception` event with a message
    pub fn exception(&mut self, message: impl Into<String>) {
        self.info("what", message.into());
        self.handle(EventKind::Exception);
    }

    /// Write to the test's stdout, captured when requested
    pub fn print_out(&mut self, text: &str) {
        if self.capture_stdout {
            self.stdout.push_str(text);
        } else {
            print!("{text}");
        }
    }

    /// Write to the test's stderr, captured when requested
    pub fn print_err(&mut self, text: &str) {
        if self.capture_stderr {
            self.stderr.push_str(text);
        } else {
            eprint!("{text}");
        }
    }

    /// Count of events of `kind` raised so far
    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts.get(kind)
    }
}
