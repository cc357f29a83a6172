//! Question answering pipeline.
//!
//! A question goes through four stages, in order: context retrieval, SQL
//! generation, execution (with a bounded repair loop when the engine rejects
//! the query), and summarization.

pub mod context;

pub use context::{
    catalog_query, load_knowledge, tables_from_catalog, KnowledgeDoc, QueryContext, TableSchema,
};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::athena::QueryResult;
use crate::config::PipelineConfig;
use crate::error::{Result, Text2SqlError};
use crate::llm::{parse_llm_response, prompt, LlmClient, Message};
use crate::query::QueryExecutor;
use crate::safety::{ensure_allowed, ClassificationResult};

/// SQL produced by the LLM, already checked for safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub sql: String,
    /// Text the LLM wrote around the query.
    pub explanation: String,
    pub classification: ClassificationResult,
}

/// A query the engine rejected, fed back to the LLM for a corrected version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairHint {
    pub failed_sql: String,
    pub reason: String,
}

/// The final product of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub question: String,
    /// The query that produced `result`.
    pub sql: String,
    pub result: QueryResult,
    pub summary: String,
    /// Queries executed, counting the successful one.
    pub attempts: u32,
}

/// Turns questions into answers using an LLM and a query executor.
#[derive(Clone)]
pub struct Text2SqlPipeline {
    executor: QueryExecutor,
    llm: Arc<dyn LlmClient>,
    settings: PipelineConfig,
}

impl Text2SqlPipeline {
    pub fn new(
        executor: QueryExecutor,
        llm: Arc<dyn LlmClient>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            executor,
            llm,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }

    /// Answers `question`.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.ask_with_cancel(question, &CancellationToken::new()).await
    }

    /// Answers `question`, giving up when `cancel` fires.
    pub async fn ask_with_cancel(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Text2SqlError::config("Question is empty"));
        }
        let started = Instant::now();

        let context = self.retrieve_context(cancel).await?;

        let mut attempts = 1;
        let mut generated = self.generate_sql(question, &context, None, cancel).await?;
        let result = loop {
            match self.execute_sql(&generated, cancel).await {
                Ok(result) => break result,
                Err(Text2SqlError::QueryFailed(reason))
                    if attempts <= self.settings.max_repair_attempts =>
                {
                    warn!(attempt = attempts, %reason, "Generated query failed, asking for a fix");
                    let hint = RepairHint {
                        failed_sql: generated.sql.clone(),
                        reason,
                    };
                    generated = self
                        .generate_sql(question, &context, Some(&hint), cancel)
                        .await?;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let summary = self
            .summarize(question, &generated.sql, &result, cancel)
            .await?;

        info!(
            attempts,
            rows = result.row_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Question answered"
        );

        Ok(Answer {
            question: question.to_string(),
            sql: generated.sql,
            result,
            summary,
            attempts,
        })
    }

    /// Gathers knowledge files and, if enabled, the table catalog.
    ///
    /// A failed catalog lookup is logged and skipped; cancellation is not.
    pub async fn retrieve_context(&self, cancel: &CancellationToken) -> Result<QueryContext> {
        let mut context = QueryContext::new(self.executor.target().database.clone());
        context.knowledge = load_knowledge(&self.settings.knowledge_files).await?;

        if self.settings.include_catalog {
            let sql = catalog_query(&context.database);
            match self.executor.execute_sql_with_cancel(&sql, cancel).await {
                Ok(result) => context.tables = tables_from_catalog(&result),
                Err(Text2SqlError::Cancelled) => return Err(Text2SqlError::Cancelled),
                Err(e) => warn!("Catalog lookup failed, continuing without it: {e}"),
            }
        }

        debug!(
            tables = context.tables.len(),
            documents = context.knowledge.len(),
            "Context retrieved"
        );
        Ok(context)
    }

    /// Asks the LLM for SQL and checks it for safety.
    ///
    /// With a `repair` hint, the LLM sees its failed query and the engine's
    /// error. A reply without SQL is an `Llm` error carrying the reply text.
    pub async fn generate_sql(
        &self,
        question: &str,
        context: &QueryContext,
        repair: Option<&RepairHint>,
        cancel: &CancellationToken,
    ) -> Result<GeneratedSql> {
        let messages = match repair {
            Some(hint) => {
                prompt::build_repair_messages(context, question, &hint.failed_sql, &hint.reason)
            }
            None => prompt::build_sql_messages(context, question),
        };

        let reply = self.complete(&messages, cancel).await?;
        let parsed = parse_llm_response(&reply);
        let sql = parsed
            .sql
            .ok_or_else(|| Text2SqlError::llm(format!("No SQL in response: {}", parsed.text)))?;

        let classification = ensure_allowed(&sql, self.settings.allow_mutations)?;
        debug!(%sql, level = %classification.level, "SQL generated");

        Ok(GeneratedSql {
            sql,
            explanation: parsed.text,
            classification,
        })
    }

    /// Runs generated SQL.
    pub async fn execute_sql(
        &self,
        generated: &GeneratedSql,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        self.executor.execute_sql_with_cancel(&generated.sql, cancel).await
    }

    /// Asks the LLM to explain `result` in prose.
    pub async fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let messages =
            prompt::build_summary_messages(question, sql, result, self.settings.summary_rows);
        let summary = self.complete(&messages, cancel).await?;
        Ok(summary.trim().to_string())
    }

    /// One LLM round trip, abandoned as soon as `cancel` fires.
    async fn complete(&self, messages: &[Message], cancel: &CancellationToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Text2SqlError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("LLM request cancelled");
                Err(Text2SqlError::Cancelled)
            }
            reply = self.llm.complete(messages) => reply,
        }
    }
}
