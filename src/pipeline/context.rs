//! Context gathered before SQL generation.
//!
//! Knowledge files describe the data in prose; the catalog lists tables and
//! columns as the query engine reports them.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::athena::{ColumnInfo, QueryResult};
use crate::error::{Result, Text2SqlError};

/// A knowledge file's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDoc {
    pub source: PathBuf,
    pub content: String,
}

/// A table and its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Everything the LLM is told about the data before writing SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    pub database: String,
    pub knowledge: Vec<KnowledgeDoc>,
    pub tables: Vec<TableSchema>,
}

impl QueryContext {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.knowledge.is_empty() && self.tables.is_empty()
    }

    /// Formats the context as plain text for a prompt.
    pub fn format_for_llm(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Database: {}", self.database);

        if !self.tables.is_empty() {
            out.push_str("\nTables:\n");
            for table in &self.tables {
                let columns: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .collect();
                let _ = writeln!(out, "- {}({})", table.name, columns.join(", "));
            }
        }

        for doc in &self.knowledge {
            let _ = write!(
                out,
                "\nNotes from {}:\n{}\n",
                doc.source.display(),
                doc.content.trim()
            );
        }

        out
    }
}

/// Reads every knowledge file. A missing or unreadable file is an error.
pub async fn load_knowledge(paths: &[PathBuf]) -> Result<Vec<KnowledgeDoc>> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        docs.push(read_knowledge(path).await?);
    }
    Ok(docs)
}

async fn read_knowledge(path: &Path) -> Result<KnowledgeDoc> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Text2SqlError::config(format!(
            "Failed to read knowledge file {}: {e}",
            path.display()
        ))
    })?;
    Ok(KnowledgeDoc {
        source: path.to_path_buf(),
        content,
    })
}

/// SQL listing the columns of every table in `database`.
///
/// Athena's result API echoes the header as the first row, which shaping
/// drops, so this must be a plain SELECT rather than a SHOW statement.
pub fn catalog_query(database: &str) -> String {
    format!(
        "SELECT table_name, column_name, data_type FROM information_schema.columns \
         WHERE table_schema = '{}' ORDER BY table_name, ordinal_position",
        database.replace('\'', "''")
    )
}

/// Groups `(table_name, column_name, data_type)` rows into tables, keeping
/// first-seen table order. Rows with fewer than three cells are skipped.
pub fn tables_from_catalog(result: &QueryResult) -> Vec<TableSchema> {
    let mut tables: Vec<TableSchema> = Vec::new();
    for row in &result.rows {
        let [table, column, data_type, ..] = row.as_slice() else {
            continue;
        };
        let column = ColumnInfo::new(column.as_str(), data_type.as_str());
        match tables.iter_mut().find(|t| &t.name == table) {
            Some(existing) => existing.columns.push(column),
            None => tables.push(TableSchema {
                name: table.clone(),
                columns: vec![column],
            }),
        }
    }
    tables
}
