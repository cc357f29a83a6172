//! Amazon Bedrock LLM client implementation.
//!
//! Calls the Converse API with SigV4-signed requests. System messages go in
//! the request's `system` field; the rest become the conversation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::athena::sigv4::{uri_encode, AwsCredentials, Signer, SigningRequest};
use crate::error::{Result, Text2SqlError};
use crate::llm::retry::{
    is_retryable_status, request_error, with_retries, AttemptError, RetryPolicy,
};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// SigV4 signing name of the Bedrock runtime.
const SIGNING_SERVICE: &str = "bedrock";

const PROVIDER: &str = "Bedrock";

/// Bedrock client configuration.
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    pub credentials: AwsCredentials,
    pub region: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Endpoint override, defaults to the regional runtime endpoint.
    pub endpoint: Option<String>,
}

impl BedrockConfig {
    pub fn new(
        credentials: AwsCredentials,
        region: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            model: model.into(),
            max_tokens: 2048,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            endpoint: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Amazon Bedrock LLM client.
#[derive(Debug, Clone)]
pub struct BedrockClient {
    client: Client,
    signer: Signer,
    endpoint: String,
    host: String,
    model: String,
    max_tokens: u32,
}

impl BedrockClient {
    pub fn new(config: BedrockConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", config.region));
        let host = url::Url::parse(&endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| Text2SqlError::config(format!("Invalid Bedrock endpoint: {endpoint}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Text2SqlError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            signer: Signer::new(config.credentials, config.region, SIGNING_SERVICE),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            host,
            model: config.model,
            max_tokens: config.max_tokens,
        })
    }

    /// Request path for the configured model; the model id is percent-encoded.
    fn converse_path(&self) -> String {
        format!("/model/{}/converse", uri_encode(&self.model))
    }

    fn build_request(&self, messages: &[Message]) -> ConverseRequest {
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| TextBlock {
                text: m.content.clone(),
            })
            .collect();
        let messages = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ConverseMessage {
                role: m.role.as_str().to_string(),
                content: vec![TextBlock {
                    text: m.content.clone(),
                }],
            })
            .collect();

        ConverseRequest {
            messages,
            system,
            inference_config: InferenceConfig {
                max_tokens: self.max_tokens,
                temperature: 0.0,
            },
        }
    }
}

/// Joins the text blocks of a Converse reply.
fn response_text(response: ConverseResponse) -> Result<String> {
    let text: String = response
        .output
        .message
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return Err(Text2SqlError::llm("Empty response from Bedrock"));
    }
    Ok(text)
}

fn parse_error(status: reqwest::StatusCode, body: &str) -> AttemptError {
    let detail = serde_json::from_str::<BedrockError>(body).map(|e| e.message);
    let error = match (status, detail) {
        (reqwest::StatusCode::FORBIDDEN, detail) => Text2SqlError::llm(format!(
            "Access denied by Bedrock. Check credentials and model access. {}",
            detail.unwrap_or_default()
        )),
        (_, Ok(message)) => Text2SqlError::llm(format!("Bedrock API error: {message}")),
        (_, Err(_)) => Text2SqlError::llm(format!("Bedrock API error ({status}): {body}")),
    };
    AttemptError {
        error,
        retryable: is_retryable_status(status),
    }
}

impl BedrockClient {
    /// Signs and sends one Converse call. Signing happens per attempt so
    /// retries carry a fresh timestamp.
    async fn send_once(
        &self,
        path: &str,
        payload: &[u8],
    ) -> std::result::Result<String, AttemptError> {
        let signed = self.signer.sign(
            &SigningRequest {
                method: "POST",
                host: &self.host,
                path,
                headers: vec![("content-type", "application/json")],
                payload,
            },
            chrono::Utc::now(),
        );

        let mut request = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .header("content-type", "application/json");
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, &e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| request_error(PROVIDER, &e))?;
        if !status.is_success() {
            return Err(parse_error(status, &body));
        }

        let response: ConverseResponse = serde_json::from_str(&body).map_err(|e| {
            AttemptError::fatal(Text2SqlError::llm(format!("Failed to parse response: {e}")))
        })?;
        response_text(response).map_err(AttemptError::fatal)
    }
}

#[async_trait]
impl LlmClient for BedrockClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let payload = serde_json::to_vec(&self.build_request(messages))
            .map_err(|e| Text2SqlError::llm(format!("Failed to encode request: {e}")))?;
        let path = self.converse_path();

        debug!(model = %self.model, "Bedrock converse request");
        with_retries(PROVIDER, RetryPolicy::default(), || {
            self.send_once(&path, &payload)
        })
        .await
    }
}

// Converse API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest {
    messages: Vec<ConverseMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<TextBlock>,
    inference_config: InferenceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConverseMessage {
    role: String,
    content: Vec<TextBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextBlock {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: OutputMessage,
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    content: Vec<OutputBlock>,
}

/// Non-text blocks (tool use, images) carry no `text`.
#[derive(Debug, Deserialize)]
struct OutputBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BedrockError {
    #[serde(alias = "Message")]
    message: String,
}
