//! Event fan-out
//!
//! Routes each event raised by a test body to the per-test reports whose masks
//! include its kind. Routes are computed once per test.

use crate::library::EventHandler;
use crate::models::{Event, EventKind, Mask};
use crate::report::{ReportError, TestReport};

/// Which reports receive one event kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Nobody subscribed; the library may skip building the event
    Empty,
    Single(usize),
    Fan(Vec<usize>),
}

impl Route {
    fn build(masks: &[Mask], kind: EventKind) -> Self {
        let targets: Vec<usize> = masks
            .iter()
            .enumerate()
            .filter(|(_, mask)| mask.contains(kind))
            .map(|(i, _)| i)
            .collect();
        match targets.as_slice() {
            [] => Route::Empty,
            [only] => Route::Single(*only),
            _ => Route::Fan(targets),
        }
    }
}

/// [`EventHandler`] delivering to a slice of per-test reports in registration order
pub struct Multiplexer<'a, T> {
    reports: &'a mut [T],
    routes: [Route; EventKind::COUNT],
    error: Option<ReportError>,
}

impl<'a, T: TestReport> Multiplexer<'a, T> {
    /// `masks[i]` is the subscription of `reports[i]`
    pub fn new(reports: &'a mut [T], masks: &[Mask]) -> Self {
        debug_assert_eq!(reports.len(), masks.len());
        Self {
            reports,
            routes: EventKind::all().map(|kind| Route::build(masks, kind)),
            error: None,
        }
    }

    pub fn route(&self, kind: EventKind) -> &Route {
        &self.routes[kind.index()]
    }

    /// First report error seen while delivering, if any
    pub fn finish(self) -> Result<(), ReportError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<T: TestReport> EventHandler for Multiplexer<'_, T> {
    fn wants(&self, kind: EventKind) -> bool {
        self.route(kind) != &Route::Empty
    }

    fn handle(&mut self, event: Event) {
        // Once a report has failed the run is lost; stop delivering
        if self.error.is_some() {
            return;
        }
        let result = match &self.routes[event.kind.index()] {
            Route::Empty => Ok(()),
            Route::Single(i) => self.reports[*i].handle(&event),
            Route::Fan(targets) => targets
                .iter()
                .try_for_each(|&i| self.reports[i].handle(&event)),
        };
        if let Err(e) = result {
            self.error = Some(e);
        }
    }
}
