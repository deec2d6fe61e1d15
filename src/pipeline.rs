//! Sequential ingestion run: scrape, create the search index, ingest.
//!
//! Each stage is awaited before the next one starts. The first failure ends
//! the run in [`Stage::Error`]; nothing is retried. A successful run waits a
//! short settling delay and then asks the caller to show the results view.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{AnalysisApi, ApiError};
use crate::flight::{InFlight, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Scrape,
    CreateIndex,
    Ingest,
    Done,
    Error,
}

/// Progress is the position in this list over its last index, so 0, 25, 50,
/// 75 and 100 percent. `Error` is not in the list and reports 0.
const PROGRESS_ORDER: [Stage; 5] = [
    Stage::Idle,
    Stage::Scrape,
    Stage::CreateIndex,
    Stage::Ingest,
    Stage::Done,
];

/// The remote steps of a run, in order.
pub const STEPS: [Stage; 3] = [Stage::Scrape, Stage::CreateIndex, Stage::Ingest];

impl Stage {
    fn position(self) -> Option<usize> {
        PROGRESS_ORDER.iter().position(|s| *s == self)
    }

    pub fn progress_percent(self) -> u8 {
        self.position()
            .map(|i| (i * 100 / (PROGRESS_ORDER.len() - 1)) as u8)
            .unwrap_or(0)
    }

    pub fn step_label(self) -> &'static str {
        match self {
            Stage::Scrape => "Scrape",
            Stage::CreateIndex => "Index",
            Stage::Ingest => "Ingest",
            Stage::Idle => "Idle",
            Stage::Done => "Done",
            Stage::Error => "Error",
        }
    }

    /// Text on the run button while a run is going.
    pub fn busy_text(self) -> &'static str {
        match self {
            Stage::Scrape => "Scraping...",
            Stage::CreateIndex => "Creating Index...",
            Stage::Ingest => "Ingesting Content...",
            Stage::Done => "Done",
            Stage::Idle | Stage::Error => "Working...",
        }
    }

    pub fn status_text(self) -> Option<&'static str> {
        match self {
            Stage::Scrape => Some("Scraping URLs"),
            Stage::CreateIndex => Some("Creating Index"),
            Stage::Ingest => Some("Ingesting Content"),
            Stage::Done => Some("Complete"),
            Stage::Error => Some("Error"),
            Stage::Idle => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMarker {
    Done,
    Active,
    Failed,
    Pending(usize),
}

impl StepMarker {
    pub fn symbol(self) -> String {
        match self {
            StepMarker::Done => "✓".to_string(),
            StepMarker::Failed => "!".to_string(),
            StepMarker::Active => "•".to_string(),
            StepMarker::Pending(n) => n.to_string(),
        }
    }
}

/// Side effect requested once a run has completed and settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigate {
    Results,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StageStarted(Stage),
    StageFailed { stage: Stage, message: String },
    Completed,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { stage: Stage, message: String },
    Cancelled,
}

#[derive(Debug, Default)]
pub struct PipelineState {
    stage: Stage,
    failed_at: Option<Stage>,
    error: Option<String>,
    flight: InFlight,
}

impl PipelineState {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_busy()
    }

    /// Whether the progress block has anything to show.
    pub fn has_progress(&self) -> bool {
        self.is_running() || matches!(self.stage, Stage::Done | Stage::Error)
    }

    pub fn progress_percent(&self) -> u8 {
        self.stage.progress_percent()
    }

    /// Right-hand side of the status line.
    pub fn progress_text(&self) -> String {
        match self.stage {
            Stage::Done => "Redirecting...".to_string(),
            stage => format!("{}%", stage.progress_percent()),
        }
    }

    pub fn button_text(&self) -> &'static str {
        if self.is_running() {
            self.stage.busy_text()
        } else {
            "Start Analysis"
        }
    }

    pub fn step_marker(&self, step: Stage) -> StepMarker {
        if self.stage == Stage::Error && self.failed_at == Some(step) {
            return StepMarker::Failed;
        }
        let reached = match self.stage {
            Stage::Error => self.failed_at.unwrap_or(Stage::Idle),
            stage => stage,
        };
        if reached == step && self.stage != Stage::Error {
            return StepMarker::Active;
        }
        if reached.position() > step.position() {
            StepMarker::Done
        } else {
            let number = STEPS.iter().position(|s| *s == step).unwrap_or(0) + 1;
            StepMarker::Pending(number)
        }
    }

    pub fn apply(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StageStarted(stage) => self.stage = stage,
            PipelineEvent::StageFailed { stage, message } => {
                self.stage = Stage::Error;
                self.failed_at = Some(stage);
                self.error = Some(message);
            }
            PipelineEvent::Completed => self.stage = Stage::Done,
            PipelineEvent::Reset => {
                self.stage = Stage::Idle;
                self.failed_at = None;
                self.error = None;
            }
        }
    }

    fn begin(&mut self) -> Option<Ticket> {
        let ticket = self.flight.try_begin()?;
        self.apply(PipelineEvent::Reset);
        Some(ticket)
    }

    /// Apply an event on behalf of a run, unless the run was abandoned.
    fn apply_for(&mut self, ticket: &Ticket, event: PipelineEvent) -> bool {
        if !self.flight.is_current(ticket) {
            return false;
        }
        self.apply(event);
        true
    }

    /// Clear a finished run. Ignored while one is going.
    pub fn reset(&mut self) {
        if !self.is_running() {
            self.apply(PipelineEvent::Reset);
        }
    }
}

#[derive(Clone)]
pub struct PipelineRunner {
    api: Arc<dyn AnalysisApi>,
    state: Arc<Mutex<PipelineState>>,
    settle_delay: Duration,
}

impl PipelineRunner {
    pub fn new(api: Arc<dyn AnalysisApi>, settle_delay: Duration) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(PipelineState::default())),
            settle_delay,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock()
    }

    async fn call(&self, stage: Stage) -> Result<(), ApiError> {
        match stage {
            Stage::Scrape => self.api.scrape().await,
            Stage::CreateIndex => self.api.create_index().await,
            _ => self.api.ingest_latest().await,
        }
    }

    /// Run every stage in order. `observer` sees each stage as it is entered,
    /// `navigate` fires exactly once after a completed run has settled.
    /// Returns `None` when a run is already going.
    pub async fn run<O, N>(&self, mut observer: O, navigate: N) -> Option<RunOutcome>
    where
        O: FnMut(Stage) + Send,
        N: FnOnce(Navigate) + Send,
    {
        let ticket = self.state.lock().begin()?;
        info!(generation = ticket.generation(), "pipeline run started");

        let outcome = self.run_stages(&ticket, &mut observer).await;
        if outcome == RunOutcome::Completed {
            tokio::select! {
                _ = ticket.token().cancelled() => {
                    self.state.lock().flight.finish(&ticket);
                    return Some(RunOutcome::Cancelled);
                }
                _ = tokio::time::sleep(self.settle_delay) => {}
            }
            debug!("pipeline settled, navigating to results");
            navigate(Navigate::Results);
        }

        self.state.lock().flight.finish(&ticket);
        Some(outcome)
    }

    async fn run_stages<O>(&self, ticket: &Ticket, observer: &mut O) -> RunOutcome
    where
        O: FnMut(Stage) + Send,
    {
        for stage in STEPS {
            if !self.enter(ticket, PipelineEvent::StageStarted(stage), observer) {
                return RunOutcome::Cancelled;
            }
            debug!(?stage, "pipeline stage started");

            let result = tokio::select! {
                _ = ticket.token().cancelled() => return RunOutcome::Cancelled,
                result = self.call(stage) => result,
            };

            if let Err(err) = result {
                warn!("Pipeline stage {} failed: {err}", stage.step_label());
                let message = err.to_string();
                self.enter(
                    ticket,
                    PipelineEvent::StageFailed {
                        stage,
                        message: message.clone(),
                    },
                    observer,
                );
                return RunOutcome::Failed { stage, message };
            }
        }

        if !self.enter(ticket, PipelineEvent::Completed, observer) {
            return RunOutcome::Cancelled;
        }
        info!("pipeline run complete");
        RunOutcome::Completed
    }

    fn enter<O>(&self, ticket: &Ticket, event: PipelineEvent, observer: &mut O) -> bool
    where
        O: FnMut(Stage),
    {
        let stage = {
            let mut state = self.state.lock();
            if !state.apply_for(ticket, event) {
                return false;
            }
            state.stage()
        };
        observer(stage);
        true
    }

    /// Abandon the running pipeline. Stages already requested are not undone.
    pub fn dispose(&self) {
        self.state.lock().flight.cancel();
    }
}

#[cfg(test)]
mod tests;
