//! JSON report
//!
//! Accumulates one document for the whole suite and writes it once on close.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};
use tracing::debug;

use super::writer::Destination;
use super::{Report, ReportError, TestReport, TestStart};
use crate::models::{CompileInfo, Counts, Event, EventKind, LogEntry, SuiteTotals, TestRun};

#[derive(Debug, Clone, Serialize)]
struct EventRecord {
    event: usize,
    scopes: Vec<String>,
    logs: Vec<LogEntry>,
}

/// Serialized form of one test
#[derive(Debug, Clone, Serialize)]
struct TestRecord {
    name: String,
    index: usize,
    args: Value,
    events: Vec<EventRecord>,
    value: Option<Value>,
    time: f64,
    counts: Counts,
    out: String,
    err: String,
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "compile-info")]
    compile_info: &'a CompileInfo,
    events: Vec<&'static str>,
    tests: &'a [TestRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<Counts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    out: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<&'a str>,
}

/// JSON document sink
pub struct JsonReport {
    destination: Destination,
    indent: Option<usize>,
    compile_info: CompileInfo,
    tests: Vec<TestRecord>,
    totals: Option<(SuiteTotals, Counts)>,
}

impl JsonReport {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            indent: None,
            compile_info: CompileInfo::default(),
            tests: Vec::new(),
            totals: None,
        }
    }

    /// Pretty-print with this many spaces; compact when `None`
    pub fn with_indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_compile_info(mut self, info: CompileInfo) -> Self {
        self.compile_info = info;
        self
    }

    fn render(&self) -> Result<Vec<u8>, ReportError> {
        let document = Document {
            compile_info: &self.compile_info,
            events: EventKind::all().iter().map(|k| k.name()).collect(),
            tests: &self.tests,
            time: self.totals.as_ref().map(|(t, _)| t.elapsed),
            counts: self.totals.as_ref().map(|(_, c)| *c),
            out: self.totals.as_ref().map(|(t, _)| t.stdout.as_str()),
            err: self.totals.as_ref().map(|(t, _)| t.stderr.as_str()),
        };

        let mut bytes = Vec::new();
        match self.indent {
            Some(width) => {
                let indent = " ".repeat(width);
                let formatter = PrettyFormatter::with_indent(indent.as_bytes());
                let mut serializer = Serializer::with_formatter(&mut bytes, formatter);
                document.serialize(&mut serializer)?;
            }
            None => serde_json::to_writer(&mut bytes, &document)?,
        }
        Ok(bytes)
    }
}

impl Report for JsonReport {
    type Test = JsonTestReport;

    fn name(&self) -> &'static str {
        "json"
    }

    fn open(&mut self) -> Result<(), ReportError> {
        Ok(())
    }

    fn start_test(&self, start: &TestStart) -> Result<JsonTestReport, ReportError> {
        Ok(JsonTestReport {
            record: TestRecord {
                name: start.info.name.clone(),
                index: start.index,
                args: start.params.to_json(),
                events: Vec::new(),
                value: None,
                time: 0.0,
                counts: Counts::default(),
                out: String::new(),
                err: String::new(),
            },
        })
    }

    fn end_test(&mut self, test: JsonTestReport) -> Result<(), ReportError> {
        self.tests.push(test.record);
        Ok(())
    }

    fn finalize(&mut self, totals: &SuiteTotals, counts: &Counts) -> Result<(), ReportError> {
        self.totals = Some((totals.clone(), *counts));
        Ok(())
    }

    fn close(&mut self) -> Result<(), ReportError> {
        let bytes = self.render()?;
        self.destination
            .open()
            .and_then(|w| w.write_all(&bytes))
            .map_err(|e| ReportError::io(&self.destination, e))?;
        debug!("Wrote JSON report with {} tests to {}", self.tests.len(), self.destination);
        Ok(())
    }
}

/// JSON record of one test under construction
pub struct JsonTestReport {
    record: TestRecord,
}

impl TestReport for JsonTestReport {
    fn handle(&mut self, event: &Event) -> Result<(), ReportError> {
        self.record.events.push(EventRecord {
            event: event.kind.index(),
            scopes: event.scopes.clone(),
            logs: event.logs.clone(),
        });
        Ok(())
    }

    fn finalize(&mut self, run: &TestRun, counts: &Counts) -> Result<(), ReportError> {
        self.record.value = run.value.clone();
        self.record.time = run.elapsed;
        self.record.counts = *counts;
        self.record.out = run.stdout.clone();
        self.record.err = run.stderr.clone();
        Ok(())
    }
}
