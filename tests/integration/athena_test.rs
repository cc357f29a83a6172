//! Amazon Athena integration tests.
//!
//! Tests that talk to Athena need `ATHENA_TEST_DATABASE`,
//! `ATHENA_TEST_OUTPUT_LOCATION` and AWS credentials in the environment,
//! and are skipped otherwise.

use std::sync::Arc;

use text2sql::athena::sigv4::AwsCredentials;
use text2sql::athena::{self, AthenaClient, QueryService};
use text2sql::config::AthenaConfig;
use text2sql::error::Text2SqlError;
use text2sql::query::QueryExecutor;

/// Helper to build a config for the test database from the environment.
fn get_test_config() -> Option<AthenaConfig> {
    let mut config = AthenaConfig {
        database: std::env::var("ATHENA_TEST_DATABASE").ok()?,
        output_location: std::env::var("ATHENA_TEST_OUTPUT_LOCATION").ok()?,
        ..AthenaConfig::default()
    };
    config.apply_env_defaults();
    config.credentials.as_ref()?;
    Some(config)
}

fn get_test_executor() -> Option<QueryExecutor> {
    let config = get_test_config()?;
    let service: Arc<dyn QueryService> = Arc::from(athena::connect(&config).ok()?);
    Some(QueryExecutor::from_config(service, &config))
}

#[tokio::test]
async fn test_select_literal() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: ATHENA_TEST_DATABASE not set");
        return;
    };

    let result = executor
        .execute_sql("SELECT 1 AS one, 'two' AS two")
        .await
        .unwrap();

    assert_eq!(result.column_names(), vec!["one", "two"]);
    assert_eq!(result.rows, vec![vec!["1".to_string(), "two".to_string()]]);
}

#[tokio::test]
async fn test_syntax_error_reports_reason() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: ATHENA_TEST_DATABASE not set");
        return;
    };

    let err = executor.execute_sql("SELEC 1").await.unwrap_err();

    match err {
        Text2SqlError::QueryFailed(reason) => assert!(!reason.is_empty()),
        // Some engines reject the text at submission.
        Text2SqlError::Submission(_) => {}
        other => panic!("Expected query failure, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_unreachable_endpoint_is_submission_error() {
    let config = AthenaConfig {
        database: "sales".to_string(),
        output_location: "s3://results/".to_string(),
        endpoint: Some("http://127.0.0.1:1".to_string()),
        ..AthenaConfig::default()
    };
    let client = AthenaClient::with_credentials(
        &config,
        AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
    )
    .unwrap();
    let service: Arc<dyn QueryService> = Arc::new(client);
    let executor = QueryExecutor::from_config(service, &config);

    let err = executor.execute_sql("SELECT 1").await.unwrap_err();

    assert!(
        matches!(err, Text2SqlError::Submission(_)),
        "Expected submission error, got: {err}"
    );
}

#[test]
fn test_connect_requires_credentials() {
    let config = AthenaConfig {
        database: "sales".to_string(),
        output_location: "s3://results/".to_string(),
        ..AthenaConfig::default()
    };

    let err = athena::connect(&config).err().unwrap();

    assert!(matches!(err, Text2SqlError::Config(_)));
}
