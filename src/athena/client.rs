//! Amazon Athena client implementation.
//!
//! Implements the QueryService trait over Athena's JSON 1.1 HTTP API,
//! signing every request with SigV4.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::sigv4::{AwsCredentials, Signer, SigningRequest};
use super::{
    ColumnInfo, QueryHandle, QueryRequest, QueryService, QueryStatus, RawResultPage,
    StatusReport,
};
use crate::config::AthenaConfig;
use crate::error::{Result, Text2SqlError};

/// Default timeout for a single API request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Largest page GetQueryResults will return.
const MAX_RESULTS_PER_PAGE: u32 = 1000;

const TARGET_PREFIX: &str = "AmazonAthena";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Athena query service client.
#[derive(Debug, Clone)]
pub struct AthenaClient {
    client: Client,
    signer: Signer,
    endpoint: String,
    host: String,
}

impl AthenaClient {
    /// Creates a client for the configured region (or endpoint override).
    pub fn new(config: &AthenaConfig) -> Result<Self> {
        let credentials = config.credentials.clone().ok_or_else(|| {
            Text2SqlError::config(
                "No AWS credentials configured. Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.",
            )
        })?;
        Self::with_credentials(config, credentials)
    }

    /// Creates a client with explicit credentials.
    pub fn with_credentials(config: &AthenaConfig, credentials: AwsCredentials) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://athena.{}.amazonaws.com", config.region()));
        let host = url::Url::parse(&endpoint)
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{h}:{port}"),
                    None => h.to_string(),
                })
            })
            .ok_or_else(|| Text2SqlError::config(format!("Invalid Athena endpoint: {endpoint}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Text2SqlError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            signer: Signer::new(credentials, config.region(), "athena"),
            endpoint,
            host,
        })
    }

    /// Sends one signed API call and returns the raw response body.
    ///
    /// The error is a plain message; callers wrap it in the kind that fits
    /// the protocol step.
    async fn call<B: Serialize + Sync>(
        &self,
        operation: &str,
        body: &B,
    ) -> std::result::Result<String, String> {
        let payload =
            serde_json::to_vec(body).map_err(|e| format!("Failed to encode request: {e}"))?;
        let target = format!("{TARGET_PREFIX}.{operation}");

        let signed = self.signer.sign(
            &SigningRequest {
                method: "POST",
                host: &self.host,
                path: "/",
                headers: vec![("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())],
                payload: &payload,
            },
            chrono::Utc::now(),
        );

        debug!(operation, "Athena API request");

        let mut request = self
            .client
            .post(format!("{}/", self.endpoint.trim_end_matches('/')))
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", &target);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request.body(payload).send().await.map_err(|e| {
            if e.is_timeout() {
                format!("{operation} timed out")
            } else if e.is_connect() {
                format!("Failed to connect to Athena: {e}")
            } else {
                format!("{operation} request failed: {e}")
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read {operation} response: {e}"))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(parse_error(status, &text))
        }
    }
}

/// Builds a readable message from an AWS JSON error body.
fn parse_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(err) => {
            let kind = err
                .kind
                .as_deref()
                .map(|k| k.rsplit('#').next().unwrap_or(k))
                .unwrap_or("UnknownError");
            match err.message.or(err.message_upper) {
                Some(message) => format!("{kind}: {message}"),
                None => format!("{kind} ({status})"),
            }
        }
        Err(_) => format!("Athena API error ({status}): {body}"),
    }
}

fn decode<T: DeserializeOwned>(operation: &str, body: &str) -> std::result::Result<T, String> {
    serde_json::from_str(body).map_err(|e| format!("Failed to parse {operation} response: {e}"))
}

#[async_trait]
impl QueryService for AthenaClient {
    async fn start_query(&self, request: &QueryRequest) -> Result<QueryHandle> {
        let body = StartQueryExecutionRequest::from(request);
        let text = self
            .call("StartQueryExecution", &body)
            .await
            .map_err(Text2SqlError::submission)?;
        let response: StartQueryExecutionResponse =
            decode("StartQueryExecution", &text).map_err(Text2SqlError::submission)?;
        Ok(QueryHandle::new(response.query_execution_id))
    }

    async fn query_status(&self, handle: &QueryHandle) -> Result<StatusReport> {
        let body = ExecutionIdRequest {
            query_execution_id: handle.as_str(),
        };
        let text = self
            .call("GetQueryExecution", &body)
            .await
            .map_err(Text2SqlError::polling)?;
        let response: GetQueryExecutionResponse =
            decode("GetQueryExecution", &text).map_err(Text2SqlError::polling)?;
        response.into_report().map_err(Text2SqlError::polling)
    }

    async fn query_results(
        &self,
        handle: &QueryHandle,
        next_token: Option<&str>,
    ) -> Result<RawResultPage> {
        let body = GetQueryResultsRequest {
            query_execution_id: handle.as_str(),
            next_token,
            max_results: MAX_RESULTS_PER_PAGE,
        };
        let text = self
            .call("GetQueryResults", &body)
            .await
            .map_err(Text2SqlError::polling)?;
        let response: GetQueryResultsResponse =
            decode("GetQueryResults", &text).map_err(Text2SqlError::polling)?;
        Ok(response.into_page())
    }

    async fn stop_query(&self, handle: &QueryHandle) -> Result<()> {
        let body = ExecutionIdRequest {
            query_execution_id: handle.as_str(),
        };
        self.call("StopQueryExecution", &body)
            .await
            .map(|_| ())
            .map_err(Text2SqlError::polling)
    }
}

// Athena API wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionRequest<'a> {
    query_string: &'a str,
    query_execution_context: QueryExecutionContext<'a>,
    result_configuration: ResultConfiguration<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    work_group: Option<&'a str>,
}

impl<'a> From<&'a QueryRequest> for StartQueryExecutionRequest<'a> {
    fn from(request: &'a QueryRequest) -> Self {
        Self {
            query_string: &request.query_text,
            query_execution_context: QueryExecutionContext {
                database: &request.database,
                catalog: request.catalog.as_deref(),
            },
            result_configuration: ResultConfiguration {
                output_location: &request.output_location,
            },
            work_group: request.workgroup.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionContext<'a> {
    database: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResultConfiguration<'a> {
    output_location: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionResponse {
    query_execution_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionIdRequest<'a> {
    query_execution_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryExecutionResponse {
    query_execution: QueryExecution,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecution {
    status: ExecutionStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionStatus {
    state: String,
    #[serde(default)]
    state_change_reason: Option<String>,
}

impl GetQueryExecutionResponse {
    fn into_report(self) -> std::result::Result<StatusReport, String> {
        let ExecutionStatus {
            state,
            state_change_reason,
        } = self.query_execution.status;
        let status = QueryStatus::parse(&state)
            .ok_or_else(|| format!("Unknown query state '{state}'"))?;
        Ok(StatusReport {
            status,
            state_change_reason,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryResultsRequest<'a> {
    query_execution_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryResultsResponse {
    result_set: ResultSet,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultSet {
    #[serde(default)]
    rows: Vec<ResultRow>,
    #[serde(default)]
    result_set_metadata: ResultSetMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultSetMetadata {
    #[serde(default)]
    column_info: Vec<ApiColumnInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiColumnInfo {
    name: String,
    #[serde(rename = "Type", default)]
    data_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultRow {
    #[serde(default)]
    data: Vec<Datum>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Datum {
    #[serde(default)]
    var_char_value: Option<String>,
}

impl GetQueryResultsResponse {
    fn into_page(self) -> RawResultPage {
        RawResultPage {
            columns: self
                .result_set
                .result_set_metadata
                .column_info
                .into_iter()
                .map(|c| ColumnInfo::new(c.name, c.data_type))
                .collect(),
            rows: self
                .result_set
                .rows
                .into_iter()
                .map(|row| row.data.into_iter().map(|d| d.var_char_value).collect())
                .collect(),
            next_token: self.next_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "Message", default)]
    message_upper: Option<String>,
}
