//! In-memory query services for testing.
//!
//! `MockQueryService` plays back scripted status sequences and result pages,
//! and counts every call so tests can assert on the polling protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    ColumnInfo, QueryHandle, QueryRequest, QueryService, QueryStatus, RawResultPage, RawRow,
    StatusReport,
};
use crate::error::{Result, Text2SqlError};

const PAGE_TOKEN_PREFIX: &str = "mock-page-";

/// One scripted answer to a status call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedCall {
    Status(StatusReport),
    PollError(String),
}

/// How the mock service treats one submitted query.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    submit_error: Option<String>,
    script: Vec<ScriptedCall>,
    pages: Vec<RawResultPage>,
    results_error: Option<String>,
}

impl Scenario {
    pub fn new() -> Self {
        Self::default()
    }

    /// A query that succeeds on the first poll and returns `page`.
    pub fn succeeding(page: RawResultPage) -> Self {
        Self::new().status(QueryStatus::Succeeded).page(page)
    }

    /// A query that succeeds with varchar columns. The header row is
    /// prepended the way the real service echoes it.
    pub fn table(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self::succeeding(header_page(columns, rows))
    }

    /// A query that reaches FAILED with the given reason.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::new().status_with_reason(QueryStatus::Failed, reason)
    }

    /// Prepends `polls` RUNNING reports to the script.
    pub fn running_for(mut self, polls: usize) -> Self {
        let mut script: Vec<ScriptedCall> = std::iter::repeat(ScriptedCall::Status(
            StatusReport::new(QueryStatus::Running),
        ))
        .take(polls)
        .collect();
        script.append(&mut self.script);
        self.script = script;
        self
    }

    /// Appends a status report.
    pub fn status(mut self, status: QueryStatus) -> Self {
        self.script
            .push(ScriptedCall::Status(StatusReport::new(status)));
        self
    }

    /// Appends a status report carrying a state-change reason.
    pub fn status_with_reason(mut self, status: QueryStatus, reason: impl Into<String>) -> Self {
        self.script
            .push(ScriptedCall::Status(StatusReport::with_reason(status, reason)));
        self
    }

    /// Appends a failing status call.
    pub fn poll_error(mut self, message: impl Into<String>) -> Self {
        self.script.push(ScriptedCall::PollError(message.into()));
        self
    }

    /// Appends a result page.
    pub fn page(mut self, page: RawResultPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Makes submission fail.
    pub fn rejecting_submission(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }

    /// Makes every result fetch fail.
    pub fn failing_results(mut self, message: impl Into<String>) -> Self {
        self.results_error = Some(message.into());
        self
    }
}

/// Builds a result page whose first row repeats the column names.
pub fn header_page(columns: &[&str], rows: &[&[&str]]) -> RawResultPage {
    let mut raw: Vec<RawRow> = Vec::with_capacity(rows.len() + 1);
    raw.push(columns.iter().map(|c| Some(c.to_string())).collect());
    raw.extend(
        rows.iter()
            .map(|row| row.iter().map(|cell| Some(cell.to_string())).collect()),
    );
    RawResultPage {
        columns: columns
            .iter()
            .map(|c| ColumnInfo::new(*c, "varchar"))
            .collect(),
        rows: raw,
        next_token: None,
    }
}

#[derive(Debug)]
struct Execution {
    scenario: Scenario,
    query_text: String,
    cursor: usize,
    stopped: bool,
}

/// A scripted query service.
///
/// Queries are matched against registered patterns (case-insensitive
/// substring); unmatched queries use the default scenario. When a status
/// script runs out, the last scripted status repeats (RUNNING if none).
#[derive(Debug)]
pub struct MockQueryService {
    default_scenario: Scenario,
    rules: Vec<(String, Scenario)>,
    executions: Mutex<HashMap<String, Execution>>,
    submitted: Mutex<Vec<QueryRequest>>,
    next_id: AtomicUsize,
    status_calls: AtomicUsize,
    result_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl MockQueryService {
    /// Creates a mock whose queries succeed at once with a single
    /// `result` column echoing the SQL.
    pub fn new() -> Self {
        Self::with_scenario(Scenario::new().status(QueryStatus::Succeeded))
    }

    /// Creates a mock that plays `scenario` for every query.
    pub fn with_scenario(scenario: Scenario) -> Self {
        Self {
            default_scenario: scenario,
            rules: Vec::new(),
            executions: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// Plays `scenario` for queries containing `pattern`.
    pub fn on_query(mut self, pattern: impl Into<String>, scenario: Scenario) -> Self {
        self.rules.push((pattern.into().to_lowercase(), scenario));
        self
    }

    /// Number of status calls received.
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Number of result page fetches received.
    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    /// Number of stop requests received.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Requests accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<QueryRequest> {
        self.submitted
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn scenario_for(&self, query_text: &str) -> &Scenario {
        let lower = query_text.to_lowercase();
        self.rules
            .iter()
            .find(|(pattern, _)| lower.contains(pattern.as_str()))
            .map(|(_, scenario)| scenario)
            .unwrap_or(&self.default_scenario)
    }

    fn lock_executions(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Execution>>> {
        self.executions
            .lock()
            .map_err(|_| Text2SqlError::internal("mock query service lock poisoned"))
    }
}

impl Default for MockQueryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn start_query(&self, request: &QueryRequest) -> Result<QueryHandle> {
        let scenario = self.scenario_for(&request.query_text).clone();
        if let Some(message) = &scenario.submit_error {
            return Err(Text2SqlError::submission(message.clone()));
        }

        let id = format!("mock-query-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.lock_executions()?.insert(
            id.clone(),
            Execution {
                scenario,
                query_text: request.query_text.clone(),
                cursor: 0,
                stopped: false,
            },
        );
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(request.clone());
        }
        Ok(QueryHandle::new(id))
    }

    async fn query_status(&self, handle: &QueryHandle) -> Result<StatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut executions = self.lock_executions()?;
        let execution = executions
            .get_mut(handle.as_str())
            .ok_or_else(|| Text2SqlError::polling(format!("Unknown query {handle}")))?;

        if execution.stopped {
            return Ok(StatusReport::with_reason(
                QueryStatus::Cancelled,
                "Query was cancelled by user",
            ));
        }

        let script = &execution.scenario.script;
        if let Some(call) = script.get(execution.cursor) {
            execution.cursor += 1;
            return match call {
                ScriptedCall::Status(report) => Ok(report.clone()),
                ScriptedCall::PollError(message) => Err(Text2SqlError::polling(message.clone())),
            };
        }

        let last = script.iter().rev().find_map(|call| match call {
            ScriptedCall::Status(report) => Some(report.clone()),
            ScriptedCall::PollError(_) => None,
        });
        Ok(last.unwrap_or_else(|| StatusReport::new(QueryStatus::Running)))
    }

    async fn query_results(
        &self,
        handle: &QueryHandle,
        next_token: Option<&str>,
    ) -> Result<RawResultPage> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        let executions = self.lock_executions()?;
        let execution = executions
            .get(handle.as_str())
            .ok_or_else(|| Text2SqlError::polling(format!("Unknown query {handle}")))?;
        let scenario = &execution.scenario;

        if let Some(message) = &scenario.results_error {
            return Err(Text2SqlError::polling(message.clone()));
        }

        if scenario.pages.is_empty() {
            let sql = execution.query_text.as_str();
            let echo = format!("Mock result for: {sql}");
            return Ok(header_page(&["result"], &[&[echo.as_str()]]));
        }

        let index = match next_token {
            None => 0,
            Some(token) => token
                .strip_prefix(PAGE_TOKEN_PREFIX)
                .and_then(|i| i.parse::<usize>().ok())
                .ok_or_else(|| Text2SqlError::polling(format!("Invalid page token {token}")))?,
        };
        let mut page = scenario
            .pages
            .get(index)
            .cloned()
            .ok_or_else(|| Text2SqlError::polling(format!("No result page {index}")))?;
        page.next_token = (index + 1 < scenario.pages.len())
            .then(|| format!("{PAGE_TOKEN_PREFIX}{}", index + 1));
        Ok(page)
    }

    async fn stop_query(&self, handle: &QueryHandle) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(execution) = self.lock_executions()?.get_mut(handle.as_str()) {
            execution.stopped = true;
        }
        Ok(())
    }
}

/// A query service whose every call fails, as if the service were unreachable.
#[derive(Debug, Default)]
pub struct FailingQueryService;

impl FailingQueryService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueryService for FailingQueryService {
    async fn start_query(&self, _request: &QueryRequest) -> Result<QueryHandle> {
        Err(Text2SqlError::submission(
            "Failed to connect to Athena: connection refused",
        ))
    }

    async fn query_status(&self, _handle: &QueryHandle) -> Result<StatusReport> {
        Err(Text2SqlError::polling("connection refused"))
    }

    async fn query_results(
        &self,
        _handle: &QueryHandle,
        _next_token: Option<&str>,
    ) -> Result<RawResultPage> {
        Err(Text2SqlError::polling("connection refused"))
    }

    async fn stop_query(&self, _handle: &QueryHandle) -> Result<()> {
        Err(Text2SqlError::polling("connection refused"))
    }
}
