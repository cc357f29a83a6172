//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns, plus an
//! optional queue of scripted replies.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, Text2SqlError};
use crate::llm::types::{last_user_content, Message};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses.
///
/// Scripted replies are consumed first, in order. After that, the last user
/// message is matched against custom patterns and then the built-in ones.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    scripted: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    latency: Option<Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the last user message contains `pattern`, reply with `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses.push((pattern.into(), response.into()));
        self
    }

    /// Delays every reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a reply returned by the next unanswered call.
    pub fn then_reply(self, response: impl Into<String>) -> Self {
        self.push_scripted(Ok(response.into()));
        self
    }

    /// Queues an error returned by the next unanswered call.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push_scripted(Err(Text2SqlError::llm(message)));
        self
    }

    fn push_scripted(&self, reply: Result<String>) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(reply);
        }
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every message list this client received, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input_lower.contains("summarize") || input_lower.contains("results:") {
            return "The query returned the requested data.".to_string();
        }

        if input_lower.contains("count") || input_lower.contains("how many") {
            return "```sql\nSELECT COUNT(*) AS total FROM orders\n```".to_string();
        }

        if input_lower.contains("revenue") || input_lower.contains("sales by") {
            return "```sql\nSELECT region, SUM(amount) AS revenue FROM orders GROUP BY region ORDER BY revenue DESC\n```".to_string();
        }

        if input_lower.contains("tables") {
            return "```sql\nSHOW TABLES\n```".to_string();
        }

        if input_lower.contains("delete") || input_lower.contains("remove") {
            return "```sql\nDELETE FROM orders WHERE status = 'cancelled'\n```".to_string();
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(reply) => reply,
            None => Ok(self.mock_response(last_user_content(messages))),
        }
    }
}
