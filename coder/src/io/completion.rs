//! Completion service abstraction and the Ollama backend.
//!
//! The [`CompletionService`] trait decouples the cycle controller from the
//! model backend. Tests use scripted services that return predetermined
//! responses without any network access.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::config::CompletionConfig;

/// Role a completion is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Generator,
    Verifier,
    Reviewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Generator => "generator",
            Role::Verifier => "verifier",
            Role::Reviewer => "reviewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a single completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub role: Role,
    /// Optional system context sent alongside the prompt.
    pub system: Option<String>,
    pub prompt: String,
}

/// Failure to obtain a completion. Always fatal to the current run.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service unreachable: {0}")]
    Transport(String),
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode completion response: {0}")]
    Decode(String),
}

/// Abstraction over model backends.
///
/// Implementations must be safe to share between concurrent runs.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Completion service backed by Ollama's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    #[instrument(skip_all, fields(role = request.role.as_str(), model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
        };

        debug!(prompt_bytes = request.prompt.len(), "sending completion request");
        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(err = %err, "completion request failed");
                CompletionError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "completion service rejected request");
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Decode(err.to_string()))?;
        debug!(response_bytes = parsed.response.len(), "completion received");
        Ok(parsed.response)
    }
}
