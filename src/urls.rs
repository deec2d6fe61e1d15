//! URL list editing and submission ahead of a pipeline run.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::AnalysisApi;
use crate::flight::{Completion, InFlight, Ticket};

pub const RECOMMENDED_URLS: &[&str] = &[
    "https://techcommunity.microsoft.com/",
    "https://adoption.microsoft.com/en-us/microsoft-global-community-initiative/",
    "https://feedbackportal.microsoft.com/feedback/forum/f9bcd76b-51a7-ed11-aad0-000d3a1f4287",
    "https://feedbackportal.microsoft.com/feedback/forum/35b8eb89-b9c6-ee11-9079-00224827362a",
    "https://feedbackportal.microsoft.com/feedback/forum/2e2b445a-bc38-ef11-a316-000d3a13b945",
    "https://techcommunity.microsoft.com/category/azure-ai-foundry",
    "https://techcommunity.microsoft.com/category/azuredatabases",
    "https://techcommunity.microsoft.com/category/educationsector",
    "https://techcommunity.microsoft.com/category/microsoft365copilot",
    "https://techcommunity.microsoft.com/category/microsoftcopilotforfinance",
    "https://techcommunity.microsoft.com/category/microsoft-copilot-service",
    "https://techcommunity.microsoft.com/category/microsoft-learn-for-educators",
];

/// Whitespace separated URLs, de-duplicated, first occurrence wins.
pub fn parse_urls(input: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for url in input.split_whitespace() {
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Chip label for a URL: scheme and trailing slash dropped.
pub fn short_url(url: &str) -> &str {
    let url = url.strip_prefix("https://").unwrap_or(url);
    url.strip_suffix('/').unwrap_or(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Idle,
    Submitted(String),
    Failed(String),
}

#[derive(Debug)]
pub struct UrlState {
    pub input: String,
    pub status: SubmitStatus,
    ready: bool,
    flight: InFlight,
}

impl Default for UrlState {
    fn default() -> Self {
        Self {
            input: String::new(),
            status: SubmitStatus::Idle,
            ready: false,
            flight: InFlight::default(),
        }
    }
}

impl UrlState {
    pub fn is_submitting(&self) -> bool {
        self.flight.is_busy()
    }

    /// The list was accepted by the backend and has not been edited since.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn url_count(&self) -> usize {
        parse_urls(&self.input).len()
    }

    pub fn can_submit(&self) -> bool {
        !self.ready && !self.is_submitting() && self.url_count() > 0
    }

    pub fn can_clear(&self) -> bool {
        !self.is_submitting() && (self.ready || !self.input.is_empty())
    }

    /// Footer text under the URL list.
    pub fn summary(&self) -> String {
        if self.ready {
            return "Submission complete".to_string();
        }
        match self.url_count() {
            0 => "No URLs yet".to_string(),
            1 => "1 URL ready".to_string(),
            n => format!("{n} URLs ready"),
        }
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
        self.ready = false;
    }

    pub fn push(&mut self, c: char) {
        self.input.push(c);
        self.ready = false;
    }

    pub fn backspace(&mut self) {
        self.input.pop();
        self.ready = false;
    }

    pub fn append(&mut self, url: &str) {
        if parse_urls(&self.input).iter().any(|u| u == url) {
            return;
        }
        if !self.input.is_empty() && !self.input.ends_with('\n') {
            self.input.push('\n');
        }
        self.input.push_str(url);
        self.input.push('\n');
        self.ready = false;
    }

    pub fn append_recommended(&mut self) {
        for url in RECOMMENDED_URLS {
            self.append(url);
        }
    }

    /// Reset the list and submission status. The caller also resets the
    /// pipeline stage.
    pub fn clear(&mut self) {
        self.input.clear();
        self.status = SubmitStatus::Idle;
        self.ready = false;
    }

    pub fn begin_submit(&mut self) -> Option<(Ticket, Vec<String>)> {
        let urls = parse_urls(&self.input);
        if urls.is_empty() {
            return None;
        }
        let ticket = self.flight.try_begin()?;
        self.status = SubmitStatus::Idle;
        Some((ticket, urls))
    }

    pub fn apply(&mut self, ticket: &Ticket, result: Result<usize, String>) -> bool {
        if !self.flight.finish(ticket) {
            return false;
        }
        match result {
            Ok(count) => {
                self.status = SubmitStatus::Submitted(format!("Submitted {count} URL(s)."));
                self.ready = true;
            }
            Err(message) => {
                self.status = SubmitStatus::Failed(message);
                self.ready = false;
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct UrlController {
    api: Arc<dyn AnalysisApi>,
    state: Arc<Mutex<UrlState>>,
}

impl UrlController {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(UrlState::default())),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, UrlState> {
        self.state.lock()
    }

    pub async fn submit(&self) -> Option<Completion> {
        let (ticket, urls) = self.state.lock().begin_submit()?;
        debug!(count = urls.len(), "submitting urls");

        let result = match self.api.submit_urls(&urls).await {
            Ok(()) => Ok(urls.len()),
            Err(err) => {
                warn!("URL submit failed: {err}");
                Err(err.to_string())
            }
        };
        let applied = self.state.lock().apply(&ticket, result);
        Some(Completion::of(&ticket, applied))
    }
}
