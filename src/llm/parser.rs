//! Response parsing for LLM outputs.
//!
//! Extracts SQL from LLM replies that may wrap it in markdown code blocks.

/// Result of parsing an LLM response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Explanatory text around the SQL.
    pub text: String,
    /// Extracted SQL query, if found.
    pub sql: Option<String>,
}

impl ParsedResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sql: None,
        }
    }

    pub fn with_sql(text: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sql: Some(sql.into()),
        }
    }
}

/// Parses an LLM response, pulling out the first SQL code block.
///
/// A ```sql block wins over an unlabeled ``` block. A reply with no fences
/// that starts with SELECT or WITH is taken as bare SQL. The trailing
/// semicolon is dropped, since Athena runs a single statement.
pub fn parse_llm_response(response: &str) -> ParsedResponse {
    let block = find_block(response, Some("sql")).or_else(|| find_block(response, None));

    if let Some(block) = block {
        let sql = clean_sql(&response[block.content.clone()]);
        let text = format!(
            "{}\n{}",
            response[..block.span.start].trim_end(),
            response[block.span.end..].trim_start()
        );
        if sql.is_empty() {
            return ParsedResponse::text_only(text.trim());
        }
        return ParsedResponse::with_sql(text.trim(), sql);
    }

    let trimmed = response.trim();
    if looks_like_sql(trimmed) {
        return ParsedResponse::with_sql("", clean_sql(trimmed));
    }

    ParsedResponse::text_only(trimmed)
}

struct CodeBlock {
    /// Whole block, fences included.
    span: std::ops::Range<usize>,
    /// Content between the fences.
    content: std::ops::Range<usize>,
}

/// Finds the first fenced block whose info string matches `lang`
/// (`None` matches only blocks without an info string).
fn find_block(text: &str, lang: Option<&str>) -> Option<CodeBlock> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find("```") {
        let start = search_from + offset;
        let info_start = start + 3;
        let Some(newline) = text[info_start..].find('\n') else {
            break;
        };
        let line_end = info_start + newline;
        let info_line = &text[info_start..line_end];
        if let Some(close) = info_line.find("```") {
            // Inline span such as ```sql SELECT 1```, not a block.
            search_from = info_start + close + 3;
            continue;
        }
        let info = info_line.trim();
        let content_start = line_end + 1;
        let Some(close) = text[content_start..].find("```") else {
            break;
        };
        let content_end = content_start + close;
        let end = content_end + 3;

        let matches = match lang {
            Some(lang) => info.eq_ignore_ascii_case(lang),
            None => info.is_empty(),
        };
        if matches {
            return Some(CodeBlock {
                span: start..end,
                content: content_start..content_end,
            });
        }
        search_from = end;
    }
    None
}

fn looks_like_sql(text: &str) -> bool {
    let upper: String = text.chars().take(7).collect::<String>().to_ascii_uppercase();
    upper.starts_with("SELECT ") || upper.starts_with("WITH ")
}

fn clean_sql(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim_end().to_string()
}
