//! Result formatting for CLI output.

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::json;

use crate::athena::QueryResult;
use crate::pipeline::Answer;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Formats a query result.
pub fn format_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_table(result),
        OutputFormat::Json => to_pretty_json(&result_json(result)),
    }
}

/// Formats an answer: summary, SQL, and the rows behind it.
pub fn format_answer(answer: &Answer, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut output = String::new();
            output.push_str(&answer.summary);
            output.push_str("\n\nSQL:\n");
            output.push_str(&answer.sql);
            if answer.attempts > 1 {
                output.push_str(&format!("\n(after {} attempts)", answer.attempts));
            }
            output.push_str("\n\n");
            output.push_str(&format_table(&answer.result));
            output
        }
        OutputFormat::Json => to_pretty_json(&json!({
            "question": answer.question,
            "sql": answer.sql,
            "summary": answer.summary,
            "attempts": answer.attempts,
            "result": result_json(&answer.result),
        })),
    }
}

fn format_table(result: &QueryResult) -> String {
    if result.columns.is_empty() && result.is_empty() {
        return "No results found\n".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(result.columns.iter().map(|c| Cell::new(&c.name)));
    for row in &result.rows {
        table.add_row(row);
    }

    let mut output = table.to_string();
    output.push('\n');
    output.push_str(&format!(
        "{} row{} in {} ms\n",
        result.row_count,
        if result.row_count == 1 { "" } else { "s" },
        result.execution_time.as_millis()
    ));
    if let Some(warning) = result.truncation_warning() {
        output.push_str(&warning);
        output.push('\n');
    }
    output
}

/// Rows as objects keyed by column name.
fn result_json(result: &QueryResult) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = result
        .rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = result
                .columns
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.name.clone(), json!(cell)))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();

    json!({
        "columns": result.columns,
        "rows": rows,
        "row_count": result.row_count,
        "execution_time_ms": result.execution_time.as_millis() as u64,
        "was_truncated": result.was_truncated,
    })
}

fn to_pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"Could not serialize output: {e}\"}}"))
}
