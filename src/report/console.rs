//! Console report
//!
//! Human-readable text: compiler banner, one block per test with every
//! subscribed event, per-test counts and captured streams, and a suite footer.

use std::fmt::Write as _;

use super::render::{render_event, INDENT};
use super::writer::{Destination, SharedWriter, TestOutput};
use super::{Report, ReportError, TestReport, TestStart};
use crate::models::{CompileInfo, Counts, Event, EventKind, SuiteTotals, TestRun};

const BLUE_BOLD: &str = "\x1b[1;34m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const GREY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

/// When to emit ANSI colors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorPolicy {
    /// Only when writing to a terminal
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(ColorPolicy::Auto),
            "always" | "yes" => Some(ColorPolicy::Always),
            "never" | "no" => Some(ColorPolicy::Never),
            _ => None,
        }
    }

    fn enabled(self, is_terminal: bool) -> bool {
        match self {
            ColorPolicy::Auto => is_terminal,
            ColorPolicy::Always => true,
            ColorPolicy::Never => false,
        }
    }
}

/// Text styling for console output
#[derive(Clone, Debug)]
pub struct Colorer {
    colors: bool,
    footer: String,
    stream_footer: String,
}

impl Colorer {
    pub fn new(colors: bool, brief: bool) -> Self {
        Self {
            colors,
            footer: if brief { String::new() } else { format!("{}\n", "_".repeat(80)) },
            stream_footer: if brief { String::new() } else { format!("{}\n", "_".repeat(22)) },
        }
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn event_color(kind: EventKind) -> &'static str {
        match kind {
            EventKind::Failure | EventKind::Exception => RED,
            EventKind::Success => GREEN,
            EventKind::Timing => YELLOW,
            EventKind::Skipped => GREY,
        }
    }

    /// Kind name, colored
    pub fn event(&self, kind: EventKind) -> String {
        self.paint(kind.name(), Self::event_color(kind))
    }

    /// Kind name followed by `suffix` and padded to `width` visible characters
    fn event_padded(&self, kind: EventKind, suffix: &str, width: usize) -> String {
        let visible = kind.name().len() + suffix.len();
        let pad = " ".repeat(width.saturating_sub(visible));
        format!("{}{suffix}{pad}", self.event(kind))
    }

    pub fn test_name(&self, index: usize) -> String {
        self.paint(&format!("Test {index} "), BLUE_BOLD)
    }

    /// Separator line, empty in brief mode
    pub fn footer(&self) -> &str {
        &self.footer
    }

    fn gap(&self) -> &'static str {
        if self.footer.is_empty() {
            ""
        } else {
            "\n"
        }
    }
}

/// Console sink
pub struct ConsoleReport {
    destination: Destination,
    writer: Option<SharedWriter>,
    color: ColorPolicy,
    brief: bool,
    timing: bool,
    colorer: Colorer,
    compile_info: Option<CompileInfo>,
}

impl ConsoleReport {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            writer: None,
            color: ColorPolicy::Auto,
            brief: false,
            timing: false,
            colorer: Colorer::new(false, false),
            compile_info: None,
        }
    }

    pub fn with_color(mut self, color: ColorPolicy) -> Self {
        self.color = color;
        self
    }

    /// Omit separator lines
    pub fn brief(mut self, brief: bool) -> Self {
        self.brief = brief;
        self
    }

    /// Print per-test and total durations
    pub fn with_timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_compile_info(mut self, info: CompileInfo) -> Self {
        self.compile_info = Some(info);
        self
    }

    fn writer(&self) -> Result<&SharedWriter, ReportError> {
        self.writer.as_ref().ok_or(ReportError::NotOpen("console"))
    }

    fn write(&self, text: &str) -> Result<(), ReportError> {
        self.writer()?
            .write_str(text)
            .map_err(|e| ReportError::io(&self.destination, e))
    }
}

impl Report for ConsoleReport {
    type Test = ConsoleTestReport;

    fn name(&self) -> &'static str {
        "console"
    }

    fn open(&mut self) -> Result<(), ReportError> {
        let writer = self
            .destination
            .open()
            .map_err(|e| ReportError::io(&self.destination, e))?;
        self.colorer = Colorer::new(self.color.enabled(writer.is_terminal()), self.brief);
        self.writer = Some(writer);

        if let Some(info) = &self.compile_info {
            let mut banner = String::new();
            if !info.compiler.is_empty() {
                let _ = writeln!(banner, "Compiler: {}", info.compiler);
            }
            if !info.date.is_empty() && !info.time.is_empty() {
                let _ = writeln!(banner, "Compile time: {}, {}", info.time, info.date);
            }
            self.write(&banner)?;
        }
        Ok(())
    }

    fn start_test(&self, start: &TestStart) -> Result<ConsoleTestReport, ReportError> {
        let writer = self.writer()?;
        let mut header = format!("'{}'", start.info.name);
        if let Some(location) = start.info.location() {
            let _ = write!(header, " ({location})");
            if let Some(description) = &start.info.description {
                let _ = write!(header, " '{description}'");
            }
        }

        Ok(ConsoleTestReport {
            index: start.index,
            header,
            colorer: self.colorer.clone(),
            timing: self.timing,
            output: TestOutput::new(writer, start.buffered),
            target: self.destination.to_string(),
        })
    }

    fn end_test(&mut self, test: ConsoleTestReport) -> Result<(), ReportError> {
        let writer = self.writer()?;
        test.output
            .flush_to(writer)
            .map_err(|e| ReportError::io(&self.destination, e))
    }

    fn finalize(&mut self, totals: &SuiteTotals, counts: &Counts) -> Result<(), ReportError> {
        let c = &self.colorer;
        let n = totals.tests;
        let mut s = format!(
            "{}Total results for {} test{}:\n",
            c.footer(),
            n,
            if n == 1 { "" } else { "s" }
        );

        let width = EventKind::all().iter().map(|k| k.name().len()).max().unwrap_or(0) + 1;
        for (kind, count) in counts.iter() {
            let _ = writeln!(s, "{INDENT}{} {count}", c.event_padded(kind, ":", width));
        }
        if totals.crashed > 0 {
            let _ = writeln!(s, "{INDENT}{} {}", c.paint("Crashed:", RED), totals.crashed);
        }

        if self.timing {
            let _ = write!(s, "{}", c.gap());
            let _ = writeln!(s, "{}: {:.7e}", c.paint("Total duration", YELLOW), totals.elapsed);
        }
        self.write(&s)
    }

    fn close(&mut self) -> Result<(), ReportError> {
        let footer = self.colorer.footer().to_string();
        self.write(&footer)
    }
}

/// Console output for one test
pub struct ConsoleTestReport {
    index: usize,
    header: String,
    colorer: Colorer,
    timing: bool,
    output: TestOutput,
    target: String,
}

impl ConsoleTestReport {
    fn write(&mut self, text: &str) -> Result<(), ReportError> {
        self.output
            .write_str(text)
            .map_err(|e| ReportError::io(&self.target, e))
    }
}

impl TestReport for ConsoleTestReport {
    fn open(&mut self) -> Result<(), ReportError> {
        let text = format!(
            "{}{}{}\n",
            self.colorer.footer(),
            self.colorer.test_name(self.index),
            self.header
        );
        self.write(&text)
    }

    fn handle(&mut self, event: &Event) -> Result<(), ReportError> {
        let label = self.colorer.event(event.kind);
        let text = format!("\n{}", render_event(&label, event, INDENT));
        self.write(&text)
    }

    fn finalize(&mut self, run: &TestRun, counts: &Counts) -> Result<(), ReportError> {
        let c = self.colorer.clone();
        let mut s = String::new();

        for (text, label) in [(&run.stdout, "Contents of stdout"), (&run.stderr, "Contents of stderr")] {
            if !text.is_empty() {
                let _ = write!(
                    s,
                    "{}:\n{}{}{}\n",
                    c.paint(label, MAGENTA),
                    c.stream_footer,
                    text,
                    c.stream_footer
                );
            }
        }

        if let Some(value) = &run.value {
            let _ = writeln!(s, "{}Return value: {}", c.gap(), value);
        }

        if counts.any() {
            let parts: Vec<_> = counts
                .iter()
                .filter(|(_, n)| *n > 0)
                .map(|(kind, n)| format!("{}: {n}", c.event(kind)))
                .collect();
            let _ = writeln!(s, "{}Results: {{{}}}", c.gap(), parts.join(", "));
        }

        if self.timing {
            let _ = writeln!(s, "{}: {:.7e}", c.paint("Test duration", YELLOW), run.elapsed);
        }
        self.write(&s)
    }
}
