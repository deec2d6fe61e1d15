use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregate sentiment report as returned by `GET /overall`.
///
/// The payload has no fixed schema. Keys keep the order the server sent them
/// in, which drives the order of the generic sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(pub Map<String, Value>);

impl Report {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

}

impl From<Map<String, Value>> for Report {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Assistant,
    #[serde(other)]
    User,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageSource {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl MessageSource {
    pub fn display(&self) -> &str {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.label.as_deref().filter(|l| !l.is_empty()))
            .unwrap_or("source")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: MessageRole,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<MessageSource>>,
}

impl ChatMessage {
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        self.created_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    }

    /// Sources worth listing under the message. Only agent replies carry them.
    pub fn visible_sources(&self) -> &[MessageSource] {
        match &self.sources {
            Some(sources) if self.is_assistant() => sources,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Body of `POST /urls`. The backend requires the capitalized field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlSubmission {
    #[serde(rename = "Urls")]
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
