//! Loads the aggregate report and keeps the last good copy around.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::AnalysisApi;
use crate::flight::{Completion, InFlight, Ticket};
use crate::report::{self, Section};
use crate::types::Report;
use crate::utils::NumberFormatOptions;

#[derive(Debug, Default)]
pub struct OverallState {
    pub report: Option<Report>,
    pub error: Option<String>,
    flight: InFlight,
}

#[derive(Debug)]
pub enum OverallEvent {
    Loaded(Report),
    Failed(String),
}

impl OverallState {
    pub fn is_loading(&self) -> bool {
        self.flight.is_busy()
    }

    /// Start a fetch. Nothing happens while one is running, or when a report
    /// is already loaded and the caller did not force a reload.
    pub fn begin_fetch(&mut self, force: bool) -> Option<Ticket> {
        if self.report.is_some() && !force {
            return None;
        }
        let ticket = self.flight.try_begin()?;
        self.error = None;
        Some(ticket)
    }

    /// Apply a finished fetch. Failures keep the previous report.
    pub fn apply(&mut self, ticket: &Ticket, event: OverallEvent) -> bool {
        if !self.flight.finish(ticket) {
            return false;
        }
        match event {
            OverallEvent::Loaded(report) => self.report = Some(report),
            OverallEvent::Failed(message) => self.error = Some(message),
        }
        true
    }

    pub fn sections(&self, options: &NumberFormatOptions) -> Vec<Section> {
        self.report
            .as_ref()
            .map(|r| report::build(r, options))
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct OverallController {
    api: Arc<dyn AnalysisApi>,
    state: Arc<Mutex<OverallState>>,
}

impl OverallController {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(OverallState::default())),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, OverallState> {
        self.state.lock()
    }

    /// Returns `None` when the call was a no-op.
    pub async fn fetch(&self, force: bool) -> Option<Completion> {
        let ticket = self.state.lock().begin_fetch(force)?;
        debug!(force, generation = ticket.generation(), "fetching overall report");

        let result = tokio::select! {
            _ = ticket.token().cancelled() => None,
            result = self.api.fetch_overall() => Some(result),
        };

        let event = match result {
            Some(Ok(report)) => OverallEvent::Loaded(report),
            Some(Err(err)) => {
                warn!("Failed to load overall report: {err}");
                OverallEvent::Failed(err.to_string())
            }
            None => {
                debug!("overall fetch cancelled");
                self.state.lock().flight.finish(&ticket);
                return Some(Completion::of(&ticket, false));
            }
        };

        let applied = self.state.lock().apply(&ticket, event);
        if !applied {
            debug!(generation = ticket.generation(), "dropping stale overall report");
        }
        Some(Completion::of(&ticket, applied))
    }

    /// Abandon the running fetch, if any. Its result will not be applied.
    pub fn dispose(&self) {
        self.state.lock().flight.cancel();
    }
}
