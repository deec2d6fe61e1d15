//! Conversation with the analysis agent.
//!
//! The server owns the transcript: every successful send replaces the local
//! message list with the one returned, and the user's own message only shows
//! up once the server echoes it.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::AnalysisApi;
use crate::flight::{Completion, InFlight, Ticket};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, MessageRole};

pub const EMPTY_PROMPT: &str = "Ask something to begin.";
pub const SUGGESTIONS: [&str; 3] = [
    "What's driving negative sentiment?",
    "Summarize top themes.",
    "Give improvement steps.",
];
pub const ENDED_BANNER: &str = "Conversation ended. Start a new one to continue.";
pub const COMPOSER_PLACEHOLDER: &str = "Type your response...";
pub const ENDED_PLACEHOLDER: &str = "Conversation ended. Start a new conversation to continue...";

pub fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Assistant => "Agent",
        MessageRole::User => "You",
    }
}

#[derive(Debug, Default)]
pub struct ChatState {
    pub thread_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub ended: bool,
    pub input: String,
    pub last_error: Option<String>,
    flight: InFlight,
    revision: u64,
}

#[derive(Debug)]
pub enum ChatEvent {
    Delivered(ChatResponse),
    Failed(String),
}

impl ChatState {
    pub fn is_sending(&self) -> bool {
        self.flight.is_busy()
    }

    /// Bumped whenever the message list changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn thread_label(&self) -> String {
        match &self.thread_id {
            Some(id) => format!("Thread: {id}"),
            None => "No active thread".to_string(),
        }
    }

    pub fn shows_empty_prompt(&self) -> bool {
        self.messages.is_empty() && !self.is_sending() && self.last_error.is_none() && !self.ended
    }

    pub fn shows_thinking(&self) -> bool {
        self.is_sending() && !self.ended
    }

    pub fn composer_enabled(&self) -> bool {
        !self.is_sending() && !self.ended
    }

    /// New and End are offered only while nothing is in flight; End also
    /// needs a live conversation.
    pub fn can_start_new(&self) -> bool {
        !self.is_sending()
    }

    pub fn can_end(&self) -> bool {
        !self.is_sending() && !self.ended
    }

    /// Start a send of `text`. Blank text and a send already in flight are
    /// no-ops that leave the state untouched.
    pub fn begin_send(&mut self, text: &str) -> Option<(Ticket, ChatRequest)> {
        let message = text.trim();
        if message.is_empty() {
            return None;
        }
        let ticket = self.flight.try_begin()?;
        self.last_error = None;
        let request = ChatRequest {
            message: message.to_string(),
            thread_id: self.thread_id.clone(),
        };
        Some((ticket, request))
    }

    /// Apply a finished send. Always clears the sending flag for the ticket's
    /// own operation; the payload is dropped when the conversation was reset
    /// after the send started.
    pub fn apply(&mut self, ticket: &Ticket, event: ChatEvent) -> bool {
        if !self.flight.finish(ticket) {
            return false;
        }
        match event {
            ChatEvent::Delivered(response) => {
                let adopted = response
                    .thread_id
                    .filter(|id| !id.is_empty() && self.thread_id.as_ref() != Some(id));
                if let Some(id) = adopted {
                    info!(thread = %id, "chat thread assigned");
                    self.thread_id = Some(id);
                }
                self.messages = response.messages;
                self.revision += 1;
                self.input.clear();
            }
            ChatEvent::Failed(message) => self.last_error = Some(message),
        }
        true
    }

    pub fn start_new(&mut self) {
        self.flight.reset();
        self.thread_id = None;
        self.messages.clear();
        self.revision += 1;
        self.ended = false;
        self.input.clear();
    }

    pub fn end(&mut self) {
        self.ended = true;
        self.input.clear();
    }
}

#[derive(Clone)]
pub struct ChatController {
    api: Arc<dyn AnalysisApi>,
    state: Arc<Mutex<ChatState>>,
}

impl ChatController {
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(ChatState::default())),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock()
    }

    /// Returns `None` when nothing was sent.
    pub async fn send(&self, text: &str) -> Option<Completion> {
        let (ticket, request) = self.state.lock().begin_send(text)?;
        debug!(
            generation = ticket.generation(),
            thread = ?request.thread_id,
            "sending chat message"
        );

        let result = tokio::select! {
            _ = ticket.token().cancelled() => None,
            result = self.api.send_chat(&request) => Some(result),
        };

        let event = match result {
            Some(Ok(response)) => ChatEvent::Delivered(response),
            Some(Err(err)) => {
                warn!("Chat request failed: {err}");
                ChatEvent::Failed(err.to_string())
            }
            None => {
                debug!("chat send cancelled");
                self.state.lock().flight.finish(&ticket);
                return Some(Completion::of(&ticket, false));
            }
        };

        let applied = self.state.lock().apply(&ticket, event);
        if !applied {
            debug!(generation = ticket.generation(), "dropping stale chat reply");
        }
        Some(Completion::of(&ticket, applied))
    }

    /// Send even when the conversation has ended, starting a fresh one first.
    pub async fn safe_send(&self, text: &str) -> Option<Completion> {
        let ended = self.state.lock().ended;
        if ended {
            self.start_new();
        }
        self.send(text).await
    }

    /// Composer submit: sends the current input, refused while ended.
    pub async fn submit_composer(&self) -> Option<Completion> {
        let text = {
            let state = self.state.lock();
            if state.ended {
                return None;
            }
            state.input.clone()
        };
        self.safe_send(&text).await
    }

    pub fn start_new(&self) {
        debug!("starting new conversation");
        self.state.lock().start_new();
    }

    pub fn end(&self) {
        debug!("ending conversation");
        self.state.lock().end();
    }

    pub fn dispose(&self) {
        self.state.lock().flight.cancel();
    }
}
