//! OpenAI chat completions client.
//!
//! Also works with OpenAI-compatible servers through `api_url`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, Text2SqlError};
use crate::llm::retry::{
    is_retryable_status, request_error, with_retries, AttemptError, RetryPolicy,
};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const PROVIDER: &str = "OpenAI";

/// OpenAI client configuration. `Debug` hides the API key.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub api_url: String,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
            api_url: CHAT_COMPLETIONS_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// Client for the chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Text2SqlError::llm(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn chat_request<'a>(&'a self, messages: &'a [Message]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
        }
    }

    async fn send_once(
        &self,
        request: &ChatRequest<'_>,
    ) -> std::result::Result<String, AttemptError> {
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, &e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| request_error(PROVIDER, &e))?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let reply: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            AttemptError::fatal(Text2SqlError::llm(format!("Failed to parse OpenAI response: {e}")))
        })?;
        reply
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| AttemptError::fatal(Text2SqlError::llm("OpenAI returned no choices")))
    }
}

fn api_error(status: StatusCode, body: &str) -> AttemptError {
    let error = match status {
        StatusCode::UNAUTHORIZED => {
            Text2SqlError::llm("Authentication failed. Check your OPENAI_API_KEY.")
        }
        StatusCode::TOO_MANY_REQUESTS => Text2SqlError::llm("Rate limited by OpenAI."),
        _ => match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                Text2SqlError::llm(format!("OpenAI API error: {}", envelope.error.message))
            }
            Err(_) => Text2SqlError::llm(format!("OpenAI API error ({status}): {body}")),
        },
    };
    AttemptError {
        error,
        retryable: is_retryable_status(status),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = self.chat_request(messages);
        with_retries(PROVIDER, self.config.retry, || self.send_once(&request)).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
