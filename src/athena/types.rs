//! Query service types.
//!
//! Requests, handles and statuses exchanged with the query service, plus the
//! raw and shaped forms of a result set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A query to submit. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// SQL text to run.
    pub query_text: String,

    /// Database the query runs against.
    pub database: String,

    /// Data catalog holding the database (service default when `None`).
    pub catalog: Option<String>,

    /// Durable sink for result files (e.g. `s3://bucket/prefix/`).
    pub output_location: String,

    /// Workgroup to run in (service default when `None`).
    pub workgroup: Option<String>,
}

impl QueryRequest {
    /// Creates a request with no catalog or workgroup override.
    pub fn new(
        query_text: impl Into<String>,
        database: impl Into<String>,
        output_location: impl Into<String>,
    ) -> Self {
        Self {
            query_text: query_text.into(),
            database: database.into(),
            catalog: None,
            output_location: output_location.into(),
            workgroup: None,
        }
    }

    /// Sets the data catalog.
    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Sets the workgroup.
    pub fn with_workgroup(mut self, workgroup: impl Into<String>) -> Self {
        self.workgroup = Some(workgroup.into());
        self
    }
}

/// Opaque identifier the service returns on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryHandle(String);

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution state reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryStatus {
    /// Returns true once no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns the status as the service spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a service state string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of a query's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: QueryStatus,

    /// Human-readable reason attached to the last state change, if any.
    pub state_change_reason: Option<String>,
}

impl StatusReport {
    pub fn new(status: QueryStatus) -> Self {
        Self {
            status,
            state_change_reason: None,
        }
    }

    pub fn with_reason(status: QueryStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            state_change_reason: Some(reason.into()),
        }
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column type as reported by the service (cells are never coerced).
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A raw row as returned by the results API. `None` marks a missing value.
pub type RawRow = Vec<Option<String>>;

/// One page from the results API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultPage {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<RawRow>,

    /// Continuation token for the next page, if any.
    pub next_token: Option<String>,
}

/// All fetched pages of a result set, header row still included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<RawRow>,

    /// True when fetching stopped before the service ran out of pages.
    pub was_truncated: bool,
}

impl RawResultSet {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<RawRow>) -> Self {
        Self {
            columns,
            rows,
            was_truncated: false,
        }
    }
}

/// A row of string cells.
pub type Row = Vec<String>;

/// Shaped, header-stripped result of a succeeded query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data; each row has exactly `columns.len()` cells.
    pub rows: Vec<Row>,

    /// Wall time from submission to the last result page.
    #[serde(with = "duration_millis")]
    pub execution_time: Duration,

    /// Number of rows in the result (may be truncated).
    pub row_count: usize,

    /// Whether the result was cut off at the configured row limit.
    #[serde(default)]
    pub was_truncated: bool,
}

impl QueryResult {
    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
            row_count,
            was_truncated: false,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a truncation warning message if the result was truncated.
    pub fn truncation_warning(&self) -> Option<String> {
        self.was_truncated.then(|| {
            format!(
                "Result truncated: showing the first {} rows",
                self.row_count
            )
        })
    }
}

/// Why a query that ran did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    /// FAILED or CANCELLED.
    pub status: QueryStatus,

    /// Service-provided reason, verbatim.
    pub reason: String,
}

/// All-or-nothing outcome of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Success(QueryResult),
    Failure(QueryFailure),
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts a failure into `Text2SqlError::QueryFailed`.
    pub fn into_result(self) -> crate::error::Result<QueryResult> {
        match self {
            Self::Success(result) => Ok(result),
            Self::Failure(failure) => {
                Err(crate::error::Text2SqlError::query_failed(failure.reason))
            }
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
