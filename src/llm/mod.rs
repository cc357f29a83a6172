//! LLM integration for text2sql.
//!
//! Provides the client trait and implementations for the supported providers.

pub mod bedrock;
pub mod factory;
pub mod mock;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod types;

pub use bedrock::{BedrockClient, BedrockConfig};
pub use factory::create_client;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use parser::{parse_llm_response, ParsedResponse};
pub use types::{Message, Role};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::{Result, Text2SqlError};

/// Trait for LLM clients that can generate completions.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a completion for the given messages.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Where completions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Amazon Bedrock Converse API, signed with the Athena credentials.
    #[default]
    Bedrock,
    OpenAi,
    /// Canned replies; needs no credentials.
    Mock,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 3] = [Self::Bedrock, Self::OpenAi, Self::Mock];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bedrock => "bedrock",
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Bedrock => bedrock::DEFAULT_MODEL,
            Self::OpenAi => openai::DEFAULT_MODEL,
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = Text2SqlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(LlmProvider::as_str).collect();
                Text2SqlError::config(format!(
                    "Unknown LLM provider '{s}'. Expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
