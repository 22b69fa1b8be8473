//! Event taxonomy emitted by test bodies
//!
//! Defines event kinds, the events themselves, per-kind counters and the
//! subscription masks sinks use to pick the kinds they observe.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Kind of an event raised while a test body runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Failure,
    Success,
    Exception,
    Timing,
    Skipped,
}

impl EventKind {
    /// Number of event kinds
    pub const COUNT: usize = 5;

    /// Get all kinds in slot order
    pub fn all() -> [EventKind; Self::COUNT] {
        [
            EventKind::Failure,
            EventKind::Success,
            EventKind::Exception,
            EventKind::Timing,
            EventKind::Skipped,
        ]
    }

    /// Slot index (0-4) used by counts, masks and callback tables
    pub fn index(self) -> usize {
        match self {
            EventKind::Failure => 0,
            EventKind::Success => 1,
            EventKind::Exception => 2,
            EventKind::Timing => 3,
            EventKind::Skipped => 4,
        }
    }

    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Failure => "Failure",
            EventKind::Success => "Success",
            EventKind::Exception => "Exception",
            EventKind::Timing => "Timing",
            EventKind::Skipped => "Skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "failure" | "failures" => Some(EventKind::Failure),
            "success" | "successes" => Some(EventKind::Success),
            "exception" | "exceptions" => Some(EventKind::Exception),
            "timing" | "timings" => Some(EventKind::Timing),
            "skipped" | "skip" => Some(EventKind::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A logged key/value pair. Keys need not be unique; an empty key is free-form info.
pub type LogEntry = (String, Value);

/// A single event raised by a test body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub scopes: Vec<String>,
    pub logs: Vec<LogEntry>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            scopes: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Append a log entry
    pub fn with_log(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.logs.push((key.into(), value.into()));
        self
    }
}

/// Per-kind occurrence counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counts([u64; EventKind::COUNT]);

impl Counts {
    pub fn new(values: [u64; EventKind::COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, kind: EventKind) -> u64 {
        self.0[kind.index()]
    }

    pub fn increment(&mut self, kind: EventKind) {
        self.0[kind.index()] += 1;
    }

    /// Zero every slot the mask does not select
    pub fn masked(&self, mask: &Mask) -> Counts {
        let mut out = *self;
        for kind in EventKind::all() {
            if !mask.contains(kind) {
                out.0[kind.index()] = 0;
            }
        }
        out
    }

    /// Whether any slot is non-zero
    pub fn any(&self) -> bool {
        self.0.iter().any(|&c| c > 0)
    }

    /// Iterate `(kind, count)` in slot order
    pub fn iter(&self) -> impl Iterator<Item = (EventKind, u64)> + '_ {
        EventKind::all().into_iter().map(move |k| (k, self.get(k)))
    }

    pub fn as_array(&self) -> [u64; EventKind::COUNT] {
        self.0
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a += b;
        }
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(mut self, rhs: Counts) -> Counts {
        self += rhs;
        self
    }
}

/// Set of event kinds a sink subscribes to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mask([bool; EventKind::COUNT]);

impl Mask {
    pub fn new(flags: [bool; EventKind::COUNT]) -> Self {
        Self(flags)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self([true; EventKind::COUNT])
    }

    pub fn from_kinds(kinds: &[EventKind]) -> Self {
        let mut mask = Self::none();
        for &kind in kinds {
            mask.0[kind.index()] = true;
        }
        mask
    }

    /// Failures and exceptions only, the default for JUnit and TeamCity
    pub fn problems() -> Self {
        Self::from_kinds(&[EventKind::Failure, EventKind::Exception])
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0[kind.index()]
    }

    pub fn with(mut self, kind: EventKind) -> Self {
        self.0[kind.index()] = true;
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        EventKind::all().into_iter().filter(move |k| self.contains(*k))
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.kinds().map(|k| k.name()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices() {
        assert_eq!(EventKind::Failure.index(), 0);
        assert_eq!(EventKind::Skipped.index(), 4);
        assert_eq!(EventKind::all()[2], EventKind::Exception);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(EventKind::from_str("TIMING"), Some(EventKind::Timing));
        assert_eq!(EventKind::from_str("skip"), Some(EventKind::Skipped));
        assert_eq!(EventKind::from_str("unknown"), None);
    }

    #[test]
    fn test_counts_sum() {
        let mut a = Counts::default();
        a.increment(EventKind::Failure);
        a.increment(EventKind::Success);
        let b = Counts::new([1, 0, 2, 0, 1]);

        let total = a + b;
        assert_eq!(total.as_array(), [2, 1, 2, 0, 1]);
        assert!(total.any());
        assert!(!Counts::default().any());
    }

    #[test]
    fn test_counts_masked() {
        let counts = Counts::new([3, 4, 5, 6, 7]);
        assert_eq!(counts.masked(&Mask::problems()).as_array(), [3, 0, 5, 0, 0]);
        assert_eq!(counts.masked(&Mask::all()), counts);
    }

    #[test]
    fn test_mask() {
        let mask = Mask::none().with(EventKind::Timing);
        assert!(mask.contains(EventKind::Timing));
        assert!(!mask.contains(EventKind::Failure));
        assert_eq!(Mask::none().kinds().count(), 0);
        assert_eq!(Mask::problems().to_string(), "{Failure, Exception}");
    }

    #[test]
    fn test_counts_serialize_as_array() {
        let json = serde_json::to_string(&Counts::new([1, 2, 3, 4, 5])).unwrap();
        assert_eq!(json, "[1,2,3,4,5]");
    }
}
