//! Report sinks
//!
//! A sink has a suite-level object ([`Report`]) that lives for the whole run and
//! hands out one per-test object ([`TestReport`]) for every execution pair. Both
//! levels are scopes: opened before use and closed on every exit path by the
//! executor. Each sink is registered with a [`Mask`] choosing the event kinds it
//! receives.
//!
//! Built-in sinks: console text, JUnit XML, TeamCity service messages and a JSON
//! document. [`Sink`] bundles them behind one type.

mod console;
mod json;
mod junit;
mod render;
mod teamcity;
mod writer;

pub use console::{ColorPolicy, Colorer, ConsoleReport, ConsoleTestReport};
pub use json::{JsonReport, JsonTestReport};
pub use junit::{JUnitReport, JUnitTestReport};
pub use render::{render_event, INDENT};
pub use teamcity::{TeamCityReport, TeamCityTestReport};
pub use writer::{Destination, MemoryBuffer, OpenMode, SharedWriter, TestOutput};

use thiserror::Error;

use crate::models::{Counts, Event, EventKind, Mask, Parameters, SuiteTotals, TestInfo, TestRun};

/// Report sink errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{sink} reports cannot receive {kind} events")]
    UnsupportedEvent { sink: &'static str, kind: EventKind },

    #[error("{0} report used before it was opened")]
    NotOpen(&'static str),
}

impl ReportError {
    pub fn io(target: impl ToString, source: std::io::Error) -> Self {
        ReportError::Io {
            target: target.to_string(),
            source,
        }
    }
}

/// What a suite sink knows about a test when creating its per-test report
#[derive(Clone, Debug)]
pub struct TestStart {
    pub index: usize,
    pub params: Parameters,
    pub info: TestInfo,
    /// Hold stream output until the aggregator flushes it
    pub buffered: bool,
}

/// Per-test half of a sink
pub trait TestReport: Send + 'static {
    /// Enter the test scope
    fn open(&mut self) -> Result<(), ReportError> {
        Ok(())
    }

    fn handle(&mut self, event: &Event) -> Result<(), ReportError>;

    /// Called once after the body ran; `counts` is restricted to the sink's mask
    fn finalize(&mut self, run: &TestRun, counts: &Counts) -> Result<(), ReportError>;

    /// Leave the test scope
    fn close(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Suite half of a sink
pub trait Report {
    type Test: TestReport;

    fn name(&self) -> &'static str;

    /// Reject masks this sink cannot honour, before anything is opened
    fn check_mask(&self, _mask: &Mask) -> Result<(), ReportError> {
        Ok(())
    }

    /// Enter the suite scope
    fn open(&mut self) -> Result<(), ReportError>;

    /// Create the per-test report. May run ahead of execution.
    fn start_test(&self, start: &TestStart) -> Result<Self::Test, ReportError>;

    /// Take back a finished per-test report, in submission order
    fn end_test(&mut self, test: Self::Test) -> Result<(), ReportError>;

    /// Called once after every test ran; `counts` is restricted to the sink's mask
    fn finalize(&mut self, totals: &SuiteTotals, counts: &Counts) -> Result<(), ReportError>;

    /// Leave the suite scope
    fn close(&mut self) -> Result<(), ReportError>;
}

/// A sink together with the event kinds it subscribes to
pub struct Subscription<R> {
    pub report: R,
    pub mask: Mask,
}

impl<R: Report> Subscription<R> {
    /// Pair a report with a mask, failing if the report cannot take those events
    pub fn new(report: R, mask: Mask) -> Result<Self, ReportError> {
        report.check_mask(&mask)?;
        Ok(Self { report, mask })
    }
}

/// The built-in sinks
pub enum Sink {
    Console(ConsoleReport),
    JUnit(JUnitReport),
    TeamCity(TeamCityReport),
    Json(JsonReport),
}

/// Per-test reports of the built-in sinks
pub enum SinkTest {
    Console(ConsoleTestReport),
    JUnit(JUnitTestReport),
    TeamCity(TeamCityTestReport),
    Json(JsonTestReport),
}

macro_rules! dispatch {
    ($value:expr, $bind:ident => $body:expr) => {
        match $value {
            SinkTest::Console($bind) => $body,
            SinkTest::JUnit($bind) => $body,
            SinkTest::TeamCity($bind) => $body,
            SinkTest::Json($bind) => $body,
        }
    };
}

impl TestReport for SinkTest {
    fn open(&mut self) -> Result<(), ReportError> {
        dispatch!(self, t => t.open())
    }

    fn handle(&mut self, event: &Event) -> Result<(), ReportError> {
        dispatch!(self, t => t.handle(event))
    }

    fn finalize(&mut self, run: &TestRun, counts: &Counts) -> Result<(), ReportError> {
        dispatch!(self, t => t.finalize(run, counts))
    }

    fn close(&mut self) -> Result<(), ReportError> {
        dispatch!(self, t => t.close())
    }
}

impl Report for Sink {
    type Test = SinkTest;

    fn name(&self) -> &'static str {
        match self {
            Sink::Console(r) => r.name(),
            Sink::JUnit(r) => r.name(),
            Sink::TeamCity(r) => r.name(),
            Sink::Json(r) => r.name(),
        }
    }

    fn check_mask(&self, mask: &Mask) -> Result<(), ReportError> {
        match self {
            Sink::Console(r) => r.check_mask(mask),
            Sink::JUnit(r) => r.check_mask(mask),
            Sink::TeamCity(r) => r.check_mask(mask),
            Sink::Json(r) => r.check_mask(mask),
        }
    }

    fn open(&mut self) -> Result<(), ReportError> {
        match self {
            Sink::Console(r) => r.open(),
            Sink::JUnit(r) => r.open(),
            Sink::TeamCity(r) => r.open(),
            Sink::Json(r) => r.open(),
        }
    }

    fn start_test(&self, start: &TestStart) -> Result<SinkTest, ReportError> {
        Ok(match self {
            Sink::Console(r) => SinkTest::Console(r.start_test(start)?),
            Sink::JUnit(r) => SinkTest::JUnit(r.start_test(start)?),
            Sink::TeamCity(r) => SinkTest::TeamCity(r.start_test(start)?),
            Sink::Json(r) => SinkTest::Json(r.start_test(start)?),
        })
    }

    fn end_test(&mut self, test: SinkTest) -> Result<(), ReportError> {
        match (self, test) {
            (Sink::Console(r), SinkTest::Console(t)) => r.end_test(t),
            (Sink::JUnit(r), SinkTest::JUnit(t)) => r.end_test(t),
            (Sink::TeamCity(r), SinkTest::TeamCity(t)) => r.end_test(t),
            (Sink::Json(r), SinkTest::Json(t)) => r.end_test(t),
            (sink, _) => unreachable!("per-test report handed to the wrong {} sink", sink.name()),
        }
    }

    fn finalize(&mut self, totals: &SuiteTotals, counts: &Counts) -> Result<(), ReportError> {
        match self {
            Sink::Console(r) => r.finalize(totals, counts),
            Sink::JUnit(r) => r.finalize(totals, counts),
            Sink::TeamCity(r) => r.finalize(totals, counts),
            Sink::Json(r) => r.finalize(totals, counts),
        }
    }

    fn close(&mut self) -> Result<(), ReportError> {
        match self {
            Sink::Console(r) => r.close(),
            Sink::JUnit(r) => r.close(),
            Sink::TeamCity(r) => r.close(),
            Sink::Json(r) => r.close(),
        }
    }
}

impl From<ConsoleReport> for Sink {
    fn from(r: ConsoleReport) -> Self {
        Sink::Console(r)
    }
}

impl From<JUnitReport> for Sink {
    fn from(r: JUnitReport) -> Self {
        Sink::JUnit(r)
    }
}

impl From<TeamCityReport> for Sink {
    fn from(r: TeamCityReport) -> Self {
        Sink::TeamCity(r)
    }
}

impl From<JsonReport> for Sink {
    fn from(r: JsonReport) -> Self {
        Sink::Json(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_checks_mask() {
        let teamcity = TeamCityReport::new(Destination::Memory(MemoryBuffer::new()), "suite");
        let err = Subscription::new(Sink::from(teamcity), Mask::all()).err().unwrap();
        assert!(matches!(err, ReportError::UnsupportedEvent { sink: "teamcity", .. }));

        let teamcity = TeamCityReport::new(Destination::Memory(MemoryBuffer::new()), "suite");
        assert!(Subscription::new(Sink::from(teamcity), Mask::problems()).is_ok());
    }

    #[test]
    fn test_sink_names() {
        let memory = || Destination::Memory(MemoryBuffer::new());
        let sinks: Vec<Sink> = vec![
            ConsoleReport::new(memory()).into(),
            JUnitReport::new(memory(), "suite").into(),
            JsonReport::new(memory()).into(),
        ];
        let names: Vec<_> = sinks.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["console", "junit", "json"]);
    }
}
