//! TeamCity service-message report
//!
//! Emits `##teamcity[...]` lines. Only failures, exceptions and skips can be
//! represented, so any other subscription is rejected up front.

use chrono::Local;
use std::fmt::Write as _;

use super::render::{render_event, INDENT};
use super::writer::{Destination, SharedWriter, TestOutput};
use super::{Report, ReportError, TestReport, TestStart};
use crate::models::{CompileInfo, Counts, Event, EventKind, Mask, SuiteTotals, TestRun};

/// Event kinds a TeamCity report can carry
pub const TEAMCITY_KINDS: [EventKind; 3] =
    [EventKind::Failure, EventKind::Exception, EventKind::Skipped];

/// Escape a value for a service message attribute
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => out.push_str("||"),
            '\'' => out.push_str("|'"),
            '\n' => out.push_str("|n"),
            '\r' => out.push_str("|r"),
            '[' => out.push_str("|["),
            ']' => out.push_str("|]"),
            '\u{0085}' => out.push_str("|x"),
            '\u{2028}' => out.push_str("|l"),
            '\u{2029}' => out.push_str("|p"),
            c if !c.is_ascii() => {
                // Outside the BMP a character becomes two UTF-16 units
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units).iter() {
                    let _ = write!(out, "|0x{:04x}", unit);
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// One `##teamcity[...]` line with a timestamp
pub fn service_message(kind: &str, attrs: &[(&str, &str)]) -> String {
    let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
    let mut line = format!("##teamcity[{kind} timestamp='{}'", escape(&timestamp));
    for (key, value) in attrs {
        let _ = write!(line, " {key}='{}'", escape(value));
    }
    line.push_str("]\n");
    line
}

/// TeamCity sink
pub struct TeamCityReport {
    destination: Destination,
    suite_name: String,
    writer: Option<SharedWriter>,
    compile_info: Option<CompileInfo>,
}

impl TeamCityReport {
    pub fn new(destination: Destination, suite_name: impl Into<String>) -> Self {
        Self {
            destination,
            suite_name: suite_name.into(),
            writer: None,
            compile_info: None,
        }
    }

    pub fn with_compile_info(mut self, info: CompileInfo) -> Self {
        self.compile_info = Some(info);
        self
    }

    fn writer(&self) -> Result<&SharedWriter, ReportError> {
        self.writer.as_ref().ok_or(ReportError::NotOpen("teamcity"))
    }

    fn write(&self, text: &str) -> Result<(), ReportError> {
        self.writer()?
            .write_str(text)
            .map_err(|e| ReportError::io(&self.destination, e))
    }
}

impl Report for TeamCityReport {
    type Test = TeamCityTestReport;

    fn name(&self) -> &'static str {
        "teamcity"
    }

    fn check_mask(&self, mask: &Mask) -> Result<(), ReportError> {
        match mask.kinds().find(|kind| !TEAMCITY_KINDS.contains(kind)) {
            Some(kind) => Err(ReportError::UnsupportedEvent {
                sink: "teamcity",
                kind,
            }),
            None => Ok(()),
        }
    }

    fn open(&mut self) -> Result<(), ReportError> {
        let writer = self
            .destination
            .open()
            .map_err(|e| ReportError::io(&self.destination, e))?;
        self.writer = Some(writer);

        let mut text = String::new();
        if let Some(info) = &self.compile_info {
            text.push_str(&service_message(
                "compile-info",
                &[
                    ("name", info.compiler.as_str()),
                    ("date", info.date.as_str()),
                    ("time", info.time.as_str()),
                ],
            ));
        }
        text.push_str(&service_message("testSuiteStarted", &[("name", self.suite_name.as_str())]));
        self.write(&text)
    }

    fn start_test(&self, start: &TestStart) -> Result<TeamCityTestReport, ReportError> {
        Ok(TeamCityTestReport {
            name: start.info.name.clone(),
            output: TestOutput::new(self.writer()?, start.buffered),
            target: self.destination.to_string(),
        })
    }

    fn end_test(&mut self, test: TeamCityTestReport) -> Result<(), ReportError> {
        let writer = self.writer()?;
        test.output
            .flush_to(writer)
            .map_err(|e| ReportError::io(&self.destination, e))
    }

    fn finalize(&mut self, _totals: &SuiteTotals, _counts: &Counts) -> Result<(), ReportError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ReportError> {
        let text = service_message("testSuiteFinished", &[("name", self.suite_name.as_str())]);
        self.write(&text)
    }
}

/// TeamCity messages for one test
pub struct TeamCityTestReport {
    name: String,
    output: TestOutput,
    target: String,
}

impl TeamCityTestReport {
    fn write(&mut self, text: &str) -> Result<(), ReportError> {
        self.output
            .write_str(text)
            .map_err(|e| ReportError::io(&self.target, e))
    }
}

impl TestReport for TeamCityTestReport {
    fn open(&mut self) -> Result<(), ReportError> {
        let text = service_message("testStarted", &[("name", self.name.as_str())]);
        self.write(&text)
    }

    fn handle(&mut self, event: &Event) -> Result<(), ReportError> {
        let message_kind = match event.kind {
            EventKind::Failure | EventKind::Exception => "testFailed",
            EventKind::Skipped => "testIgnored",
            kind => {
                return Err(ReportError::UnsupportedEvent {
                    sink: "teamcity",
                    kind,
                })
            }
        };
        let message = render_event(event.kind.name(), event, INDENT);
        let text = service_message(message_kind, &[("name", self.name.as_str()), ("message", message.as_str())]);
        self.write(&text)
    }

    fn finalize(&mut self, run: &TestRun, counts: &Counts) -> Result<(), ReportError> {
        let failures = counts.get(EventKind::Failure).to_string();
        let exceptions = counts.get(EventKind::Exception).to_string();
        let duration = ((run.elapsed * 1000.0).round() as u64).to_string();

        let mut text = service_message(
            "counts",
            &[("errors", failures.as_str()), ("exceptions", exceptions.as_str())],
        );
        text.push_str(&service_message("testStdOut", &[("name", self.name.as_str()), ("out", run.stdout.as_str())]));
        text.push_str(&service_message("testStdErr", &[("name", self.name.as_str()), ("out", run.stderr.as_str())]));
        text.push_str(&service_message(
            "testFinished",
            &[("name", self.name.as_str()), ("duration", duration.as_str())],
        ));
        self.write(&text)
    }
}
