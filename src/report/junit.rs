//! JUnit XML report
//!
//! Produces one `testsuite` with a `testcase` per run. When appending to an
//! existing document, a previous suite with the same name is replaced and suite
//! ids are renumbered from zero.

use chrono::Local;
use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::fmt::Display;
use tracing::{debug, warn};

use super::render::{render_event, INDENT};
use super::writer::{Destination, OpenMode};
use super::{Report, ReportError, TestReport, TestStart};
use crate::models::{CompileInfo, Counts, Event, EventKind, SuiteTotals, TestRun};
use crate::utils::timer::Timer;

fn xml_err(e: impl Display) -> ReportError {
    ReportError::Xml(e.to_string())
}

/// Minimal element tree used to read and rewrite JUnit documents
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its position if it already exists
    pub fn set_attr(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl ToString) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, ReportError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), ReportError> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ReportError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

/// Parse a whole document. Whitespace-only text is dropped.
pub(crate) fn parse_document(text: &str) -> Result<XmlElement, ReportError> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            XmlEvent::Start(start) => stack.push(element_from(&start)?),
            XmlEvent::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            XmlEvent::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ReportError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            XmlEvent::Text(text) => {
                let text = text.unescape().map_err(xml_err)?;
                if let Some(parent) = stack.last_mut() {
                    let stream = parent.name == "system-out" || parent.name == "system-err";
                    if stream || !text.trim().is_empty() {
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
            }
            XmlEvent::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    parent.children.push(XmlNode::Text(text));
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ReportError::Xml("unclosed element".to_string()));
    }
    root.ok_or_else(|| ReportError::Xml("empty document".to_string()))
}

/// Escape an attribute value, keeping line breaks and tabs as character references
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in escape(value).chars() {
        match c {
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), ReportError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attrs {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Owned(escape_attr(value).into_bytes()),
        });
    }

    if element.children.is_empty() {
        writer.write_event(XmlEvent::Empty(start)).map_err(xml_err)?;
        return Ok(());
    }

    writer.write_event(XmlEvent::Start(start)).map_err(xml_err)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer
                .write_event(XmlEvent::Text(BytesText::new(t)))
                .map_err(xml_err)?,
        }
    }
    writer
        .write_event(XmlEvent::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_err)?;
    Ok(())
}

/// Serialize a document with an XML declaration
pub(crate) fn write_document(root: &XmlElement) -> Result<Vec<u8>, ReportError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    write_element(&mut writer, root)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

/// Insert `suite` into `existing`, replacing any suite of the same name and
/// renumbering suite ids densely
pub(crate) fn merge_suite(existing: Option<XmlElement>, suite: XmlElement) -> XmlElement {
    let mut root = match existing {
        Some(root) if root.name == "testsuites" => root,
        Some(root) if root.name == "testsuite" => {
            let mut wrapper = XmlElement::new("testsuites");
            wrapper.push(root);
            wrapper
        }
        Some(other) => {
            warn!("Replacing XML document with unexpected root <{}>", other.name);
            XmlElement::new("testsuites")
        }
        None => XmlElement::new("testsuites"),
    };

    let name = suite.attr("name").map(str::to_string);
    root.children.retain(|child| match child {
        XmlNode::Element(e) => !(e.name == "testsuite" && e.attr("name") == name.as_deref()),
        XmlNode::Text(_) => true,
    });
    root.push(suite);

    for (id, element) in root
        .elements_mut()
        .filter(|e| e.name == "testsuite")
        .enumerate()
    {
        element.set_attr("id", id);
    }
    root
}

const HOSTNAME_FILES: &[&str] = &["/etc/hostname", "/proc/sys/kernel/hostname"];

fn hostname() -> String {
    let from_env = ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|name| std::env::var(name).ok());
    let from_files = HOSTNAME_FILES
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok());
    from_env
        .chain(from_files)
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// JUnit XML sink
pub struct JUnitReport {
    destination: Destination,
    suite_name: String,
    compile_info: Option<CompileInfo>,
    cases: Vec<XmlElement>,
    failures: u64,
    errors: u64,
    stdout: String,
    stderr: String,
    timestamp: String,
    timer: Option<Timer>,
}

impl JUnitReport {
    pub fn new(destination: Destination, suite_name: impl Into<String>) -> Self {
        Self {
            destination,
            suite_name: suite_name.into(),
            compile_info: None,
            cases: Vec::new(),
            failures: 0,
            errors: 0,
            stdout: String::new(),
            stderr: String::new(),
            timestamp: String::new(),
            timer: None,
        }
    }

    pub fn with_compile_info(mut self, info: CompileInfo) -> Self {
        self.compile_info = Some(info);
        self
    }

    fn suite_element(&self) -> XmlElement {
        let elapsed = self.timer.as_ref().map(Timer::elapsed_secs).unwrap_or(0.0);
        let mut suite = XmlElement::new("testsuite")
            .with_attr("id", 0)
            .with_attr("name", &self.suite_name)
            .with_attr("package", "")
            .with_attr("hostname", hostname())
            .with_attr("timestamp", &self.timestamp)
            .with_attr("tests", self.cases.len())
            .with_attr("failures", self.failures)
            .with_attr("errors", self.errors)
            .with_attr("time", format!("{elapsed:.6}"));

        let mut properties = XmlElement::new("properties");
        if let Some(info) = &self.compile_info {
            for (key, value) in [
                ("compiler", &info.compiler),
                ("compile-date", &info.date),
                ("compile-time", &info.time),
            ] {
                properties.push(
                    XmlElement::new("property")
                        .with_attr("name", key)
                        .with_attr("value", value),
                );
            }
        }
        suite.push(properties);

        for case in &self.cases {
            suite.push(case.clone());
        }

        let mut out = XmlElement::new("system-out");
        if !self.stdout.is_empty() {
            out = out.with_text(&self.stdout);
        }
        let mut err = XmlElement::new("system-err");
        if !self.stderr.is_empty() {
            err = err.with_text(&self.stderr);
        }
        suite.push(out);
        suite.push(err);
        suite
    }

    fn existing_document(&self) -> Option<XmlElement> {
        let Destination::File {
            path,
            mode: OpenMode::Append,
        } = &self.destination
        else {
            return None;
        };
        let text = std::fs::read_to_string(path).ok()?;
        if text.trim().is_empty() {
            return None;
        }
        match parse_document(&text) {
            Ok(root) => Some(root),
            Err(e) => {
                warn!("Overwriting unreadable JUnit file {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Report for JUnitReport {
    type Test = JUnitTestReport;

    fn name(&self) -> &'static str {
        "junit"
    }

    fn open(&mut self) -> Result<(), ReportError> {
        self.timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        self.timer = Some(Timer::start(format!("junit suite {}", self.suite_name)));
        Ok(())
    }

    fn start_test(&self, start: &TestStart) -> Result<JUnitTestReport, ReportError> {
        Ok(JUnitTestReport {
            name: start.info.name.clone(),
            timer: None,
            elapsed: 0.0,
            problem: None,
            message: String::new(),
        })
    }

    fn end_test(&mut self, test: JUnitTestReport) -> Result<(), ReportError> {
        self.cases.push(test.into_element());
        Ok(())
    }

    fn finalize(&mut self, totals: &SuiteTotals, counts: &Counts) -> Result<(), ReportError> {
        self.failures = counts.get(EventKind::Failure);
        self.errors = counts.get(EventKind::Exception);
        self.stdout = totals.stdout.clone();
        self.stderr = totals.stderr.clone();
        Ok(())
    }

    fn close(&mut self) -> Result<(), ReportError> {
        let suite = self.suite_element();
        let root = merge_suite(self.existing_document(), suite);
        let bytes = write_document(&root)?;

        // A merged document is rewritten whole, never appended
        let destination = match &self.destination {
            Destination::File { path, .. } => Destination::File {
                path: path.clone(),
                mode: OpenMode::Truncate,
            },
            other => other.clone(),
        };
        destination
            .open()
            .and_then(|w| w.write_all(&bytes))
            .map_err(|e| ReportError::io(&self.destination, e))?;

        debug!(
            "Wrote JUnit suite '{}' with {} cases to {}",
            self.suite_name,
            self.cases.len(),
            self.destination
        );
        Ok(())
    }
}

/// JUnit test case under construction
pub struct JUnitTestReport {
    name: String,
    timer: Option<Timer>,
    elapsed: f64,
    problem: Option<EventKind>,
    message: String,
}

impl JUnitTestReport {
    fn into_element(self) -> XmlElement {
        let mut case = XmlElement::new("testcase")
            .with_attr("name", &self.name)
            .with_attr("classname", &self.name)
            .with_attr("time", format!("{:.6}", self.elapsed));

        if let Some(kind) = self.problem {
            let tag = if kind == EventKind::Exception { "error" } else { "failure" };
            case.push(
                XmlElement::new(tag)
                    .with_attr("message", &self.message)
                    .with_attr("type", kind.name()),
            );
        }
        case
    }
}

impl TestReport for JUnitTestReport {
    fn open(&mut self) -> Result<(), ReportError> {
        self.timer = Some(Timer::start(format!("junit case {}", self.name)));
        Ok(())
    }

    fn handle(&mut self, event: &Event) -> Result<(), ReportError> {
        self.message
            .push_str(&render_event(event.kind.name(), event, INDENT));
        if self.problem.is_none() && matches!(event.kind, EventKind::Failure | EventKind::Exception) {
            self.problem = Some(event.kind);
        }
        Ok(())
    }

    fn finalize(&mut self, _run: &TestRun, _counts: &Counts) -> Result<(), ReportError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ReportError> {
        self.elapsed = self.timer.as_ref().map(Timer::elapsed_secs).unwrap_or(0.0);
        Ok(())
    }
}
