//! Query service abstraction for text2sql.
//!
//! Provides a trait-based interface to an asynchronous SQL service
//! (submit, poll, fetch results, stop), so the executor can run against
//! Amazon Athena or an in-memory stand-in interchangeably.

mod client;
mod mock;
pub mod sigv4;
mod types;

pub use client::AthenaClient;
pub use mock::{header_page, FailingQueryService, MockQueryService, Scenario, ScriptedCall};
pub use types::{
    ColumnInfo, QueryFailure, QueryHandle, QueryOutcome, QueryRequest, QueryResult, QueryStatus,
    RawResultPage, RawResultSet, RawRow, Row, StatusReport,
};

use crate::config::AthenaConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Trait defining the protocol of an asynchronous query service.
///
/// Implementations only relay calls; all state transitions belong to the service.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submits a query and returns its handle.
    async fn start_query(&self, request: &QueryRequest) -> Result<QueryHandle>;

    /// Returns the current status of a query.
    async fn query_status(&self, handle: &QueryHandle) -> Result<StatusReport>;

    /// Fetches one page of results for a succeeded query.
    ///
    /// `next_token` is `None` for the first page.
    async fn query_results(
        &self,
        handle: &QueryHandle,
        next_token: Option<&str>,
    ) -> Result<RawResultPage>;

    /// Asks the service to stop a running query.
    async fn stop_query(&self, handle: &QueryHandle) -> Result<()>;
}

/// Creates an Athena-backed query service from configuration.
pub fn connect(config: &AthenaConfig) -> Result<Box<dyn QueryService>> {
    Ok(Box::new(AthenaClient::new(config)?))
}
