//! Query safety classification.
//!
//! Parses SQL and classifies it as read-only, mutating, or destructive, so
//! generated SQL that would change data is refused before it reaches Athena.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use std::fmt;

use crate::error::{Result, Text2SqlError};

/// Safety level classification for SQL queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SafetyLevel {
    /// Reads only (SELECT, EXPLAIN, SHOW, DESCRIBE).
    Safe,
    /// Adds or changes data without removing any (INSERT, UPDATE, MERGE,
    /// CTAS, UNLOAD, MSCK REPAIR).
    Mutating,
    /// Loses data or changes schema (DELETE, DROP, ALTER, other CREATE).
    Destructive,
}

impl SafetyLevel {
    /// Returns true if the statement only reads data.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Mutating => write!(f, "Mutating"),
            Self::Destructive => write!(f, "Destructive"),
        }
    }
}

/// The kind of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Explain,
    Describe,
    Show,
    Insert,
    Update,
    Merge,
    /// `CREATE TABLE ... AS SELECT`, which writes a new table to S3.
    CreateTableAs,
    /// `UNLOAD (query) TO 's3://...'`.
    Unload,
    /// `MSCK REPAIR TABLE`, which registers partitions.
    RepairTable,
    Create,
    Alter,
    Delete,
    Drop,
    /// Several statements; holds the most dangerous one.
    Multiple(Box<StatementType>),
    Unknown,
}

impl StatementType {
    fn keyword(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Explain => "EXPLAIN",
            Self::Describe => "DESCRIBE",
            Self::Show => "SHOW",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Merge => "MERGE",
            Self::CreateTableAs => "CREATE TABLE AS",
            Self::Unload => "UNLOAD",
            Self::RepairTable => "MSCK REPAIR TABLE",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Delete => "DELETE",
            Self::Drop => "DROP",
            Self::Multiple(_) => "Multiple",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multiple(inner) => write!(f, "Multiple ({inner})"),
            other => f.write_str(other.keyword()),
        }
    }
}

/// Result of classifying a SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub level: SafetyLevel,
    pub statement_type: StatementType,
    /// Shown alongside a refusal.
    pub warning: Option<String>,
}

impl ClassificationResult {
    pub fn new(level: SafetyLevel, statement_type: StatementType) -> Self {
        Self {
            level,
            statement_type,
            warning: None,
        }
    }

    pub fn with_warning(
        level: SafetyLevel,
        statement_type: StatementType,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            level,
            statement_type,
            warning: Some(warning.into()),
        }
    }
}

/// Classifies `sql` and refuses anything that is not read-only unless
/// `allow_mutations` is set.
pub fn ensure_allowed(sql: &str, allow_mutations: bool) -> Result<ClassificationResult> {
    let classification = classify_sql(sql);
    if classification.level.is_read_only() || allow_mutations {
        return Ok(classification);
    }

    let mut message = format!(
        "{} statement classified as {}",
        classification.statement_type, classification.level
    );
    if let Some(warning) = &classification.warning {
        message.push_str(". ");
        message.push_str(warning);
    }
    Err(Text2SqlError::unsafe_query(message))
}
