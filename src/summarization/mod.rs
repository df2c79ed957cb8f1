//! Remote text-completion backend used to generate summaries.
//!
//! The processing layer only needs a prompt-in/text-out primitive, expressed by
//! [`SummarizationClient`]. The Groq adapter talks to the OpenAI-compatible chat completions
//! endpoint directly over HTTP so tests can point it at a mock server.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are a professional document summarizer.";
const TEMPERATURE: f32 = 0.2;

/// Errors surfaced while calling the summarization backend.
#[derive(Debug, Error)]
pub enum SummarizationClientError {
    /// Backend could not be reached.
    #[error("Summarization backend unavailable: {0}")]
    ProviderUnavailable(String),
    /// Backend did not answer within the configured timeout.
    #[error("Summarization request timed out after {0:?}")]
    Timeout(Duration),
    /// Backend returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Backend response could not be parsed or carried no text.
    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),
}

/// Prompt-in/text-out contract implemented by summarization backends.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Complete `prompt` and return the generated text, trimmed.
    async fn complete(&self, prompt: &str) -> Result<String, SummarizationClientError>;
}

/// Groq chat completions client.
pub struct GroqSummarizationClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GroqSummarizationClient {
    /// Construct a client for the given endpoint and model.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SummarizationClientError> {
        let http = Client::builder()
            .user_agent("drive-digest/summary")
            .timeout(timeout)
            .build()
            .map_err(|error| SummarizationClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }

    /// Construct a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, SummarizationClientError> {
        Self::new(
            config.groq_base_url.clone(),
            config.groq_api_key.clone(),
            config.groq_model.clone(),
            config.request_timeout(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SummarizationClient for GroqSummarizationClient {
    async fn complete(&self, prompt: &str) -> Result<String, SummarizationClientError> {
        let payload = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    SummarizationClientError::Timeout(self.timeout)
                } else {
                    SummarizationClientError::ProviderUnavailable(format!(
                        "failed to reach {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SummarizationClientError::ProviderUnavailable(format!(
                "endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationClientError::GenerationFailed(format!(
                "backend returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                SummarizationClientError::Timeout(self.timeout)
            } else {
                SummarizationClientError::InvalidResponse(format!(
                    "failed to decode completion: {error}"
                ))
            }
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(SummarizationClientError::InvalidResponse(
                "backend returned an empty completion".into(),
            ));
        }

        Ok(content)
    }
}
