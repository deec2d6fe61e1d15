//! In-memory [`AnalysisApi`] used by controller and TUI tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::client::{AnalysisApi, ApiError};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, MessageRole, Report};

#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<&'static str>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    submitted: Mutex<Vec<Vec<String>>>,
    failing: Mutex<Vec<&'static str>>,
    report: Mutex<Report>,
    replies: Mutex<VecDeque<ChatResponse>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_report(report: Report) -> Arc<Self> {
        let api = Self::default();
        *api.report.lock() = report;
        Arc::new(api)
    }

    /// Make every later call named `call` answer with HTTP 500.
    pub fn fail(&self, call: &'static str) {
        self.failing.lock().push(call);
    }

    pub fn recover(&self, call: &'static str) {
        self.failing.lock().retain(|c| *c != call);
    }

    pub fn set_report(&self, report: Report) {
        *self.report.lock() = report;
    }

    pub fn queue_reply(&self, reply: ChatResponse) {
        self.replies.lock().push_back(reply);
    }

    /// Park later calls until the returned handle is notified, one call per
    /// `notify_one`.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().clone()
    }

    pub fn submitted(&self) -> Vec<Vec<String>> {
        self.submitted.lock().clone()
    }

    async fn enter(&self, call: &'static str) -> Result<(), ApiError> {
        self.calls.lock().push(call);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().contains(&call) {
            return Err(ApiError::Status {
                status: 500,
                message: "Server error".to_string(),
            });
        }
        Ok(())
    }
}

pub fn message(role: MessageRole, text: &str) -> ChatMessage {
    ChatMessage {
        id: None,
        role,
        text: text.to_string(),
        created_at: None,
        sources: None,
    }
}

/// Yield to spawned tasks until the fake has seen `count` calls.
pub async fn settle(api: &FakeApi, count: usize) {
    for _ in 0..1000 {
        if api.calls().len() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {count} calls, saw {:?}", api.calls());
}

#[async_trait]
impl AnalysisApi for FakeApi {
    async fn fetch_overall(&self) -> Result<Report, ApiError> {
        self.enter("overall").await?;
        Ok(self.report.lock().clone())
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        self.chat_requests.lock().push(request.clone());
        self.enter("chat").await?;
        let queued = self.replies.lock().pop_front();
        Ok(queued.unwrap_or_else(|| ChatResponse {
            thread_id: Some("thread-1".to_string()),
            messages: vec![
                message(MessageRole::User, &request.message),
                message(MessageRole::Assistant, "Noted."),
            ],
        }))
    }

    async fn submit_urls(&self, urls: &[String]) -> Result<(), ApiError> {
        self.submitted.lock().push(urls.to_vec());
        self.enter("urls").await
    }

    async fn scrape(&self) -> Result<(), ApiError> {
        self.enter("scrape").await
    }

    async fn create_index(&self) -> Result<(), ApiError> {
        self.enter("create-index").await
    }

    async fn ingest_latest(&self) -> Result<(), ApiError> {
        self.enter("ingest-latest").await
    }
}
