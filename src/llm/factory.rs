//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use crate::athena::sigv4::AwsCredentials;
use crate::config::LlmConfig;
use crate::error::{Result, Text2SqlError};
use crate::llm::{
    BedrockClient, BedrockConfig, LlmClient, LlmProvider, MockLlmClient, OpenAiClient,
    OpenAiConfig,
};

/// Creates an LLM client from configuration.
///
/// Bedrock signs with the given AWS credentials and uses `llm.region`,
/// falling back to `default_region`. OpenAI reads `OPENAI_API_KEY`.
pub fn create_client(
    config: &LlmConfig,
    default_region: &str,
    credentials: Option<AwsCredentials>,
) -> Result<Box<dyn LlmClient>> {
    let provider: LlmProvider = config.provider().parse()?;
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());

    match provider {
        LlmProvider::Bedrock => {
            let credentials = credentials.ok_or_else(|| {
                Text2SqlError::config(
                    "Bedrock needs AWS credentials. Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.",
                )
            })?;
            let region = config.region.as_deref().unwrap_or(default_region);
            let config = BedrockConfig::new(credentials, region, model)
                .with_max_tokens(config.max_tokens);
            Ok(Box::new(BedrockClient::new(config)?))
        }
        LlmProvider::OpenAi => {
            let key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    Text2SqlError::config("No API key configured. Set OPENAI_API_KEY.")
                })?;
            let config = OpenAiConfig::new(key, model).with_max_tokens(config.max_tokens);
            Ok(Box::new(OpenAiClient::new(config)?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
