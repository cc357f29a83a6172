//! Prompt construction for LLM requests.
//!
//! Each pipeline stage sends a fixed system prompt plus a single user
//! message; nothing is carried between invocations.

use crate::athena::QueryResult;
use crate::llm::types::Message;
use crate::pipeline::QueryContext;

/// System prompt template for SQL generation.
const SQL_SYSTEM_PROMPT: &str = r#"You write SQL for Amazon Athena (Trino/Presto dialect). Generate one query that answers the user's question.

CONTEXT:
{context}

INSTRUCTIONS:
- Use only tables and columns listed in the context
- Write a single read-only SELECT statement
- Refer to tables by name only; the database is already selected
- Limit results to 100 rows unless the question asks otherwise
- If the question cannot be answered with this data, say why instead of writing SQL

OUTPUT FORMAT:
Return the SQL query wrapped in ```sql code blocks."#;

const SUMMARY_SYSTEM_PROMPT: &str = "You explain query results to business users. \
Answer the question in a few sentences using only the rows provided. \
Mention if the results were truncated. Do not show SQL.";

/// Builds the system prompt with the context injected.
pub fn build_sql_system_prompt(context: &QueryContext) -> String {
    SQL_SYSTEM_PROMPT.replace("{context}", context.format_for_llm().trim_end())
}

/// Messages asking for SQL that answers `question`.
pub fn build_sql_messages(context: &QueryContext, question: &str) -> Vec<Message> {
    vec![
        Message::system(build_sql_system_prompt(context)),
        Message::user(question),
    ]
}

/// Messages asking for a corrected query after `failed_sql` was rejected
/// by the engine with `reason`.
pub fn build_repair_messages(
    context: &QueryContext,
    question: &str,
    failed_sql: &str,
    reason: &str,
) -> Vec<Message> {
    vec![
        Message::system(build_sql_system_prompt(context)),
        Message::user(question),
        Message::assistant(format!("```sql\n{failed_sql}\n```")),
        Message::user(format!(
            "That query failed with this error:\n{reason}\n\nWrite a corrected query for the same question."
        )),
    ]
}

/// Messages asking for a prose answer from `result`, showing at most
/// `max_rows` rows.
pub fn build_summary_messages(
    question: &str,
    sql: &str,
    result: &QueryResult,
    max_rows: usize,
) -> Vec<Message> {
    let mut table = result.column_names().join(" | ");
    for row in result.rows.iter().take(max_rows) {
        table.push('\n');
        table.push_str(&row.join(" | "));
    }

    let mut notes = Vec::new();
    if result.rows.len() > max_rows {
        notes.push(format!(
            "Only the first {max_rows} of {} rows are shown.",
            result.rows.len()
        ));
    }
    if let Some(warning) = result.truncation_warning() {
        notes.push(warning);
    }

    let mut user = format!(
        "Question: {question}\n\nSQL:\n{sql}\n\nResults:\n{table}\n"
    );
    if !notes.is_empty() {
        user.push('\n');
        user.push_str(&notes.join("\n"));
        user.push('\n');
    }
    user.push_str("\nSummarize the answer.");

    vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(user)]
}
