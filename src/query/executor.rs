//! Query execution against an asynchronous query service.
//!
//! Hides the submit / poll / fetch protocol behind a single call that
//! either yields a shaped result or a diagnosable failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::shape::shape_result;
use crate::athena::{
    QueryFailure, QueryHandle, QueryOutcome, QueryRequest, QueryResult, QueryService, QueryStatus,
    RawResultSet, StatusReport,
};
use crate::config::AthenaConfig;
use crate::error::{Result, Text2SqlError};

/// Default delay between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default limit on how long to wait for a terminal state.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// How to wait for a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between status checks.
    pub poll_interval: Duration,

    /// Give up (and stop the query) after this long. `None` waits forever.
    pub max_wait: Option<Duration>,

    /// Consecutive failed status checks tolerated before giving up.
    /// Zero fails on the first error.
    pub poll_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: Some(DEFAULT_MAX_WAIT),
            poll_retries: 0,
        }
    }
}

impl PollPolicy {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_poll_retries(mut self, retries: u32) -> Self {
        self.poll_retries = retries;
        self
    }
}

/// Where queries run when the caller only supplies SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTarget {
    pub database: String,
    pub catalog: Option<String>,
    pub output_location: String,
    pub workgroup: Option<String>,
}

impl QueryTarget {
    /// Builds a request for `sql` against this target.
    pub fn request(&self, sql: impl Into<String>) -> QueryRequest {
        QueryRequest {
            query_text: sql.into(),
            database: self.database.clone(),
            catalog: self.catalog.clone(),
            output_location: self.output_location.clone(),
            workgroup: self.workgroup.clone(),
        }
    }
}

impl From<&AthenaConfig> for QueryTarget {
    fn from(config: &AthenaConfig) -> Self {
        Self {
            database: config.database.clone(),
            catalog: config.catalog.clone(),
            output_location: config.output_location.clone(),
            workgroup: config.workgroup.clone(),
        }
    }
}

/// Runs queries on a query service and waits for them to finish.
///
/// Holds no per-query state, so one executor can serve concurrent callers.
#[derive(Clone)]
pub struct QueryExecutor {
    service: Arc<dyn QueryService>,
    target: QueryTarget,
    policy: PollPolicy,
    max_rows: Option<usize>,
}

impl QueryExecutor {
    /// Creates a new query executor.
    pub fn new(service: Arc<dyn QueryService>, target: QueryTarget) -> Self {
        Self {
            service,
            target,
            policy: PollPolicy::default(),
            max_rows: None,
        }
    }

    /// Creates an executor with the target, policy and row limit from configuration.
    pub fn from_config(service: Arc<dyn QueryService>, config: &AthenaConfig) -> Self {
        Self::new(service, QueryTarget::from(config))
            .with_policy(config.poll_policy())
            .with_max_rows(config.max_rows)
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stops fetching result pages once this many data rows are in hand.
    pub fn with_max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// Runs `sql` against the configured target and flattens a failed query
    /// into `Text2SqlError::QueryFailed`.
    pub async fn execute_sql(&self, sql: &str) -> Result<QueryResult> {
        self.execute(&self.target.request(sql)).await?.into_result()
    }

    /// Like `execute_sql`, but gives up when `cancel` fires.
    pub async fn execute_sql_with_cancel(
        &self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        self.execute_with_cancel(&self.target.request(sql), cancel)
            .await?
            .into_result()
    }

    /// Submits a query, waits for a terminal state, and shapes the result.
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        self.execute_with_cancel(request, &CancellationToken::new()).await
    }

    /// Submits a query and waits for it, stopping it if `cancel` fires or the
    /// policy's maximum wait elapses.
    pub async fn execute_with_cancel(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome> {
        if request.query_text.trim().is_empty() {
            return Err(Text2SqlError::submission("Query text is empty"));
        }
        if cancel.is_cancelled() {
            return Err(Text2SqlError::Cancelled);
        }

        let start = Instant::now();
        let handle = self
            .service
            .start_query(request)
            .await
            .map_err(as_submission_error)?;
        info!(
            query_id = %handle,
            database = %request.database,
            "Query submitted"
        );

        let report = self.wait_for_completion(&handle, start, cancel).await?;

        match report.status {
            QueryStatus::Succeeded => {
                let raw = self.fetch_results(&handle).await?;
                let result = shape_result(&raw).with_execution_time(start.elapsed());
                info!(
                    query_id = %handle,
                    rows = result.row_count,
                    truncated = result.was_truncated,
                    elapsed_ms = result.execution_time.as_millis() as u64,
                    "Query succeeded"
                );
                Ok(QueryOutcome::Success(result))
            }
            QueryStatus::Failed | QueryStatus::Cancelled => {
                let reason = report.state_change_reason.unwrap_or_default();
                warn!(
                    query_id = %handle,
                    status = %report.status,
                    reason = %reason,
                    "Query did not succeed"
                );
                Ok(QueryOutcome::Failure(QueryFailure {
                    status: report.status,
                    reason,
                }))
            }
            other => Err(Text2SqlError::internal(format!(
                "Poll loop ended in non-terminal state {other}"
            ))),
        }
    }

    /// Polls until the service reports a terminal state.
    ///
    /// Exactly one status call per tick; a terminal status returns at once.
    async fn wait_for_completion(
        &self,
        handle: &QueryHandle,
        start: Instant,
        cancel: &CancellationToken,
    ) -> Result<StatusReport> {
        let deadline = self.policy.max_wait.map(|wait| start + wait);
        let mut polls: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(self.abandon(handle, Text2SqlError::Cancelled).await);
            }

            polls += 1;
            match self.service.query_status(handle).await {
                Ok(report) => {
                    consecutive_errors = 0;
                    if report.status.is_terminal() {
                        debug!(
                            query_id = %handle,
                            polls,
                            status = %report.status,
                            "Query reached terminal state"
                        );
                        return Ok(report);
                    }
                    debug!(
                        query_id = %handle,
                        poll = polls,
                        status = %report.status,
                        "Query still running"
                    );
                }
                Err(e) => {
                    if consecutive_errors >= self.policy.poll_retries {
                        return Err(as_polling_error(e));
                    }
                    consecutive_errors += 1;
                    warn!(
                        query_id = %handle,
                        attempt = consecutive_errors,
                        max_retries = self.policy.poll_retries,
                        "Status check failed, retrying: {e}"
                    );
                }
            }

            let mut delay = self.policy.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    let waited = self.policy.max_wait.unwrap_or_default();
                    return Err(self.abandon(handle, Text2SqlError::Timeout(waited)).await);
                }
                delay = delay.min(deadline - now);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(self.abandon(handle, Text2SqlError::Cancelled).await);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Fetches every result page, honoring the row limit.
    async fn fetch_results(&self, handle: &QueryHandle) -> Result<RawResultSet> {
        let mut raw = RawResultSet::default();
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .service
                .query_results(handle, next_token.as_deref())
                .await
                .map_err(as_polling_error)?;
            pages += 1;

            if pages == 1 {
                raw.columns = page.columns;
            }
            raw.rows.extend(page.rows);
            next_token = page.next_token;

            if let Some(max_rows) = self.max_rows {
                // The first raw row is the header.
                let data_rows = raw.rows.len().saturating_sub(1);
                if data_rows > max_rows || (data_rows == max_rows && next_token.is_some()) {
                    raw.rows.truncate(max_rows + 1);
                    raw.was_truncated = true;
                    break;
                }
            }

            if next_token.is_none() {
                break;
            }
        }

        debug!(query_id = %handle, pages, raw_rows = raw.rows.len(), "Fetched query results");
        Ok(raw)
    }

    /// Asks the service to stop the query, then returns `error`.
    ///
    /// A failed stop request is logged, not surfaced.
    async fn abandon(&self, handle: &QueryHandle, error: Text2SqlError) -> Text2SqlError {
        info!(query_id = %handle, "Stopping query: {error}");
        if let Err(e) = self.service.stop_query(handle).await {
            warn!(query_id = %handle, "Failed to stop query: {e}");
        }
        error
    }
}

fn as_submission_error(e: Text2SqlError) -> Text2SqlError {
    match e {
        Text2SqlError::Submission(_) => e,
        other => Text2SqlError::submission(other.to_string()),
    }
}

fn as_polling_error(e: Text2SqlError) -> Text2SqlError {
    match e {
        Text2SqlError::Polling(_) => e,
        other => Text2SqlError::polling(other.to_string()),
    }
}
