use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use thiserror::Error;

use crate::config::Config;
use crate::reqwest_simd_json::{ReqwestSimdJsonExt, ResponseSimdJsonExt};
use crate::types::{ChatRequest, ChatResponse, ErrorResponse, Report, UrlSubmission};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {status} ({message})")]
    Status { status: u16, message: String },
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("Invalid request body: {0}")]
    Encode(#[from] simd_json::Error),
}

/// Remote collaborators of the analysis session.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// `GET /overall`
    async fn fetch_overall(&self) -> Result<Report, ApiError>;

    /// `POST /chat`, creating a thread when `request.thread_id` is `None`.
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError>;

    /// `POST /urls`
    async fn submit_urls(&self, urls: &[String]) -> Result<(), ApiError>;

    /// `GET /urls/scrape`
    async fn scrape(&self) -> Result<(), ApiError>;

    /// `POST /search/create-index`
    async fn create_index(&self) -> Result<(), ApiError>;

    /// `POST /search/ingest-latest`
    async fn ingest_latest(&self) -> Result<(), ApiError>;
}

pub struct HttpApi {
    client: reqwest::Client,
    api_url: String,
    pipeline_url: String,
}

impl HttpApi {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent("vocscope");
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.server.api_url.trim_end_matches('/').to_string(),
            pipeline_url: config.server.pipeline_url.trim_end_matches('/').to_string(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn pipeline(&self, path: &str) -> String {
        format!("{}{}", self.pipeline_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: describe_status(status, &body),
        })
    }

    /// Stage endpoints have no body contract; only the status matters.
    async fn trigger(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let started = std::time::Instant::now();
        self.execute(request).await?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "stage call ok");
        Ok(())
    }
}

#[async_trait]
impl AnalysisApi for HttpApi {
    async fn fetch_overall(&self) -> Result<Report, ApiError> {
        let request = self
            .client
            .get(self.api("/overall"))
            .header(reqwest::header::ACCEPT, "application/json");
        let response = self.execute(request).await?;
        response.simd_json::<Report>().await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        let request = self.client.post(self.api("/chat")).simd_json(request)?;
        let response = self.execute(request).await?;
        response.simd_json::<ChatResponse>().await
    }

    async fn submit_urls(&self, urls: &[String]) -> Result<(), ApiError> {
        let body = UrlSubmission {
            urls: urls.to_vec(),
        };
        let request = self.client.post(self.api("/urls")).simd_json(&body)?;
        self.execute(request).await?;
        Ok(())
    }

    async fn scrape(&self) -> Result<(), ApiError> {
        self.trigger(self.client.get(self.pipeline("/urls/scrape")))
            .await
    }

    async fn create_index(&self) -> Result<(), ApiError> {
        self.trigger(self.client.post(self.pipeline("/search/create-index")))
            .await
    }

    async fn ingest_latest(&self) -> Result<(), ApiError> {
        self.trigger(self.client.post(self.pipeline("/search/ingest-latest")))
            .await
    }
}

fn parse_json_error(error_body: &str) -> Option<String> {
    // The API reports errors as {"error": "message"}
    if !error_body.trim().starts_with('{') {
        return None;
    }
    serde_json::from_str::<ErrorResponse>(error_body)
        .ok()
        .map(|e| e.error)
        .filter(|e| !e.is_empty())
}

/// Short human-readable reason for a non-success response.
fn describe_status(status: StatusCode, body: &str) -> String {
    if let Some(message) = parse_json_error(body) {
        return message;
    }

    match status.as_u16() {
        400 => "Bad request".to_string(),
        401 => "Unauthorized".to_string(),
        403 => "Forbidden".to_string(),
        404 => "Not found".to_string(),
        408 => "Request timeout".to_string(),
        409 => "Conflict".to_string(),
        429 => "Rate limited".to_string(),
        500 => "Server error".to_string(),
        502 => "Bad gateway".to_string(),
        503 => "Service unavailable".to_string(),
        504 => "Gateway timeout".to_string(),
        _ => {
            let trimmed = body.trim();
            if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('<') {
                trimmed.to_string()
            } else {
                status
                    .canonical_reason()
                    .unwrap_or("Unexpected status")
                    .to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests;
