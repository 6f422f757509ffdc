//! Completion client boundary
//!
//! The engine only needs `complete(instruction, transcript) -> text`. Retry and timeout
//! policy live in the client, never in the conversation loop.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{MootError, Result};
use crate::message::Message;

/// Failure of a single model call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited")]
    RateLimit,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("model returned no content")]
    EmptyResponse,
}

impl CompletionError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Network(_) | CompletionError::RateLimit)
    }
}

/// Language-model completion function
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce the next reply for `instruction` given the conversation so far
    async fn complete(
        &self,
        instruction: &str,
        transcript: &[Message],
    ) -> std::result::Result<String, CompletionError>;
}

/// Client for any OpenAI-compatible chat completions endpoint
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiCompatibleClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| MootError::Setup(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
        })
    }

    /// Build from configuration, reading the key from the configured variable
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            MootError::Setup(format!(
                "{} not found in environment; set it or add it to .env",
                config.api_key_env
            ))
        })?;

        let mut client = Self::new(
            config.base_url.clone(),
            api_key,
            config.model.clone(),
            config.timeout_secs.map(Duration::from_secs),
        )?;
        client.temperature = config.temperature;
        Ok(client)
    }

    fn build_messages(instruction: &str, transcript: &[Message]) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage {
            role: "system".to_string(),
            content: Some(instruction.to_string()),
        })
        .chain(transcript.iter().map(|m| ChatMessage {
            role: "user".to_string(),
            content: Some(format!("{}: {}", m.source, m.content)),
        }))
        .collect()
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        instruction: &str,
        transcript: &[Message],
    ) -> std::result::Result<String, CompletionError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: Self::build_messages(instruction, transcript),
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        debug!(model = %self.model, messages = request.messages.len(), "Requesting completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 401 || status == 403 {
                CompletionError::Authentication(error_text)
            } else if status == 429 {
                CompletionError::RateLimit
            } else {
                CompletionError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Provider(format!("Failed to parse response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}
