//! Canonical event rendering
//!
//! Every text sink renders an event the same way: a header naming the kind,
//! scope and source location, then every `comment`, then every complete
//! `lhs`/`op`/`rhs` comparison, then the remaining log entries in order.

use serde_json::Value;
use std::fmt::Write;

use crate::models::{Event, LogEntry};

/// Default indentation of detail lines
pub const INDENT: &str = "    ";

/// Quoted, dotted scope path
pub fn format_scopes(scopes: &[String]) -> String {
    format!("'{}'", scopes.join("."))
}

/// Value as written in a detail line: strings quoted, everything else as JSON
pub fn repr(value: &Value) -> String {
    value.to_string()
}

/// Value as written in a comparison or location: strings bare
pub fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn take(logs: &mut Vec<LogEntry>, key: &str) -> Option<Value> {
    let pos = logs.iter().position(|(k, _)| k == key)?;
    Some(logs.remove(pos).1)
}

fn has(logs: &[LogEntry], key: &str) -> bool {
    logs.iter().any(|(k, _)| k == key)
}

/// Render `event` under the given kind label
pub fn render_event(label: &str, event: &Event, indent: &str) -> String {
    let mut logs = event.logs.clone();
    let line = take(&mut logs, "line");
    let file = take(&mut logs, "file");
    let scopes = format_scopes(&event.scopes);
    let mut out = String::new();

    match (file, line) {
        (Some(file), Some(line)) => {
            let _ = writeln!(out, "{label}: {scopes} ({}:{})", plain(&file), plain(&line));
        }
        (Some(file), None) => {
            let _ = writeln!(out, "{label}: {scopes} ({})", plain(&file));
        }
        _ => {
            let _ = writeln!(out, "{label}: {scopes}");
        }
    }

    while let Some(comment) = take(&mut logs, "comment") {
        let _ = writeln!(out, "{indent}comment: {}", repr(&comment));
    }

    while ["lhs", "op", "rhs"].iter().all(|k| has(&logs, k)) {
        let lhs = take(&mut logs, "lhs").unwrap_or(Value::Null);
        let op = take(&mut logs, "op").unwrap_or(Value::Null);
        let rhs = take(&mut logs, "rhs").unwrap_or(Value::Null);
        let _ = writeln!(
            out,
            "{indent}required: {} {} {}",
            plain(&lhs),
            plain(&op),
            plain(&rhs)
        );
    }

    for (key, value) in &logs {
        if key.is_empty() {
            let _ = writeln!(out, "{indent}{}", repr(value));
        } else {
            let _ = writeln!(out, "{indent}{key}: {}", repr(value));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;
    use serde_json::json;

    fn mixed_event() -> Event {
        Event::new(EventKind::Failure)
            .with_scopes(vec!["math".into(), "add".into()])
            .with_log("value", json!(false))
            .with_log("comment", json!("first"))
            .with_log("lhs", json!(1))
            .with_log("line", json!(42))
            .with_log("op", json!("=="))
            .with_log("", json!("free form"))
            .with_log("comment", json!("second"))
            .with_log("rhs", json!("two"))
            .with_log("file", json!("math.rs"))
    }

    #[test]
    fn test_render_order() {
        let text = render_event("Failure", &mixed_event(), INDENT);
        assert_eq!(
            text,
            "Failure: 'math.add' (math.rs:42)\n\
             \x20   comment: \"first\"\n\
             \x20   comment: \"second\"\n\
             \x20   required: 1 == two\n\
             \x20   value: false\n\
             \x20   \"free form\"\n"
        );
    }

    #[test]
    fn test_render_is_repeatable() {
        let event = mixed_event();
        assert_eq!(
            render_event("Failure", &event, INDENT),
            render_event("Failure", &event, INDENT)
        );
    }

    #[test]
    fn test_render_without_location() {
        let event = Event::new(EventKind::Skipped).with_log("file", json!("a.rs"));
        assert_eq!(render_event("Skipped", &event, "  "), "Skipped: '' (a.rs)\n");
        let event = Event::new(EventKind::Success);
        assert_eq!(render_event("Success", &event, "  "), "Success: ''\n");
    }

    #[test]
    fn test_incomplete_comparison_falls_through() {
        let event = Event::new(EventKind::Failure)
            .with_log("lhs", json!(1))
            .with_log("op", json!("<"));
        assert_eq!(
            render_event("Failure", &event, "  "),
            "Failure: ''\n  lhs: 1\n  op: \"<\"\n"
        );
    }
}
