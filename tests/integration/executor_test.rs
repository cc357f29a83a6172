//! Query executor integration tests.
//!
//! Drives the submit / poll / fetch protocol through the scripted query
//! service and checks the observable behavior of each path.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use text2sql::athena::{
    header_page, ColumnInfo, FailingQueryService, MockQueryService, QueryOutcome, QueryService,
    QueryStatus, RawResultPage, Scenario,
};
use text2sql::error::Text2SqlError;
use text2sql::query::{PollPolicy, QueryExecutor, QueryTarget};
use tokio_util::sync::CancellationToken;

fn target() -> QueryTarget {
    QueryTarget {
        database: "sales".to_string(),
        output_location: "s3://athena-results/text2sql/".to_string(),
        ..QueryTarget::default()
    }
}

fn fast_policy() -> PollPolicy {
    PollPolicy::default().with_poll_interval(Duration::from_millis(2))
}

fn executor(service: Arc<MockQueryService>) -> QueryExecutor {
    let service: Arc<dyn QueryService> = service;
    QueryExecutor::new(service, target()).with_policy(fast_policy())
}

fn data_page(rows: &[&[&str]]) -> RawResultPage {
    RawResultPage {
        columns: vec![ColumnInfo::new("n", "integer")],
        rows: rows
            .iter()
            .map(|row| row.iter().map(|c| Some(c.to_string())).collect())
            .collect(),
        next_token: None,
    }
}

#[tokio::test]
async fn test_status_calls_are_polls_plus_one() {
    for running in [0usize, 1, 3, 6] {
        let service = Arc::new(MockQueryService::with_scenario(
            Scenario::table(&["n"], &[&["1"]]).running_for(running),
        ));

        let result = executor(service.clone()).execute_sql("SELECT 1 AS n").await.unwrap();

        assert_eq!(result.row_count, 1);
        assert_eq!(service.status_calls(), running + 1, "running for {running} polls");
        assert_eq!(service.stop_calls(), 0);
    }
}

#[tokio::test]
async fn test_queued_then_running_then_succeeded() {
    let scenario = Scenario::new()
        .status(QueryStatus::Queued)
        .status(QueryStatus::Running)
        .status(QueryStatus::Succeeded)
        .page(header_page(&["n"], &[&["7"]]));
    let service = Arc::new(MockQueryService::with_scenario(scenario));

    let result = executor(service.clone()).execute_sql("SELECT 7 AS n").await.unwrap();

    assert_eq!(result.rows, vec![vec!["7".to_string()]]);
    assert_eq!(service.status_calls(), 3);
}

#[tokio::test]
async fn test_rows_are_raw_rows_minus_header() {
    let service = Arc::new(MockQueryService::with_scenario(Scenario::table(
        &["id", "name"],
        &[&["1", "Jane"], &["2", "John"], &["3", "Ada"]],
    )));

    let result = executor(service).execute_sql("SELECT id, name FROM customers").await.unwrap();

    assert_eq!(result.column_names(), vec!["id", "name"]);
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.row_count, 3);
    assert!(result.rows.iter().all(|row| row.len() == 2));
}

#[tokio::test]
async fn test_header_only_result_has_zero_rows() {
    let service = Arc::new(MockQueryService::with_scenario(Scenario::table(
        &["order_id", "amount"],
        &[],
    )));

    let result = executor(service)
        .execute_sql("SELECT order_id, amount FROM orders WHERE 1 = 0")
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.column_names(), vec!["order_id", "amount"]);
}

#[tokio::test]
async fn test_missing_cells_become_empty_strings() {
    let page = RawResultPage {
        columns: vec![
            ColumnInfo::new("id", "integer"),
            ColumnInfo::new("email", "varchar"),
        ],
        rows: vec![
            vec![Some("id".to_string()), Some("email".to_string())],
            vec![Some("1".to_string()), None],
            vec![Some("2".to_string())],
        ],
        next_token: None,
    };
    let service = Arc::new(MockQueryService::with_scenario(Scenario::succeeding(page)));

    let result = executor(service).execute_sql("SELECT id, email FROM users").await.unwrap();

    assert_eq!(
        result.rows,
        vec![
            vec!["1".to_string(), String::new()],
            vec!["2".to_string(), String::new()],
        ]
    );
}

#[tokio::test]
async fn test_failure_reason_is_verbatim() {
    let reason = "SYNTAX_ERROR: line 1:8: Column 'nme' cannot be resolved";
    let service = Arc::new(MockQueryService::with_scenario(
        Scenario::failing(reason).running_for(2),
    ));
    let exec = executor(service.clone());

    let outcome = exec.execute(&exec.target().request("SELECT nme FROM users")).await.unwrap();
    match outcome {
        QueryOutcome::Failure(failure) => {
            assert_eq!(failure.status, QueryStatus::Failed);
            assert_eq!(failure.reason, reason);
        }
        other => panic!("Expected Failure, got {other:?}"),
    }

    let err = exec.execute_sql("SELECT nme FROM users").await.unwrap_err();
    assert_eq!(err.failure_reason(), Some(reason));
    assert_eq!(service.result_calls(), 0);
}

#[tokio::test]
async fn test_submission_error_is_distinct_from_query_failure() {
    let service = Arc::new(MockQueryService::with_scenario(
        Scenario::new().rejecting_submission("InvalidRequestException: database does not exist"),
    ));

    let err = executor(service.clone()).execute_sql("SELECT 1").await.unwrap_err();

    assert!(matches!(err, Text2SqlError::Submission(_)));
    assert!(err.to_string().contains("database does not exist"));
    assert_eq!(service.status_calls(), 0);
}

#[tokio::test]
async fn test_unreachable_service_is_submission_error() {
    let service: Arc<dyn QueryService> = Arc::new(FailingQueryService::new());
    let exec = QueryExecutor::new(service, target()).with_policy(fast_policy());

    let err = exec.execute_sql("SELECT 1").await.unwrap_err();

    assert!(matches!(err, Text2SqlError::Submission(_)));
}

#[tokio::test]
async fn test_poll_error_fails_fast_by_default() {
    let service = Arc::new(MockQueryService::with_scenario(
        Scenario::new()
            .status(QueryStatus::Running)
            .poll_error("ThrottlingException: Rate exceeded")
            .status(QueryStatus::Succeeded)
            .page(header_page(&["n"], &[&["1"]])),
    ));

    let err = executor(service.clone()).execute_sql("SELECT 1").await.unwrap_err();

    assert!(matches!(err, Text2SqlError::Polling(_)));
    assert!(err.to_string().contains("Rate exceeded"));
    assert_eq!(service.status_calls(), 2);
}

#[tokio::test]
async fn test_poll_retries_tolerate_transient_errors() {
    let scenario = Scenario::new()
        .poll_error("ThrottlingException")
        .poll_error("ThrottlingException")
        .status(QueryStatus::Succeeded)
        .page(header_page(&["n"], &[&["1"]]));
    let service = Arc::new(MockQueryService::with_scenario(scenario.clone()));

    let exec = executor(service.clone()).with_policy(fast_policy().with_poll_retries(2));
    let result = exec.execute_sql("SELECT 1").await.unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(service.status_calls(), 3);

    let service = Arc::new(MockQueryService::with_scenario(scenario));
    let exec = executor(service).with_policy(fast_policy().with_poll_retries(1));
    let err = exec.execute_sql("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Text2SqlError::Polling(_)));
}

#[tokio::test]
async fn test_results_fetch_failure_is_polling_error() {
    let service = Arc::new(MockQueryService::with_scenario(
        Scenario::new()
            .status(QueryStatus::Succeeded)
            .failing_results("AccessDenied on s3://athena-results"),
    ));

    let err = executor(service).execute_sql("SELECT 1").await.unwrap_err();

    assert!(matches!(err, Text2SqlError::Polling(_)));
}

#[tokio::test]
async fn test_timeout_stops_query() {
    let service = Arc::new(MockQueryService::with_scenario(Scenario::new()));
    let exec = executor(service.clone())
        .with_policy(fast_policy().with_max_wait(Some(Duration::from_millis(30))));

    let err = exec.execute_sql("SELECT * FROM huge_table").await.unwrap_err();

    assert!(matches!(err, Text2SqlError::Timeout(wait) if wait == Duration::from_millis(30)));
    assert_eq!(service.stop_calls(), 1);
    assert!(service.status_calls() >= 1);
}

#[tokio::test]
async fn test_cancellation_stops_query() {
    let service = Arc::new(MockQueryService::with_scenario(Scenario::new()));
    let exec = executor(service.clone()).with_policy(fast_policy().with_max_wait(None));
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = exec
        .execute_sql_with_cancel("SELECT * FROM huge_table", &token)
        .await
        .unwrap_err();

    assert!(matches!(err, Text2SqlError::Cancelled));
    assert_eq!(service.stop_calls(), 1);
}

#[tokio::test]
async fn test_pages_are_concatenated() {
    let scenario = Scenario::new()
        .status(QueryStatus::Succeeded)
        .page(header_page(&["n"], &[&["1"], &["2"]]))
        .page(data_page(&[&["3"], &["4"]]))
        .page(data_page(&[&["5"]]));
    let service = Arc::new(MockQueryService::with_scenario(scenario));

    let result = executor(service.clone()).execute_sql("SELECT n FROM numbers").await.unwrap();

    let values: Vec<&str> = result.rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(values, vec!["1", "2", "3", "4", "5"]);
    assert!(!result.was_truncated);
    assert_eq!(service.result_calls(), 3);
}

#[tokio::test]
async fn test_max_rows_stops_paging() {
    let scenario = Scenario::new()
        .status(QueryStatus::Succeeded)
        .page(header_page(&["n"], &[&["1"], &["2"]]))
        .page(data_page(&[&["3"], &["4"]]))
        .page(data_page(&[&["5"]]));
    let service = Arc::new(MockQueryService::with_scenario(scenario));

    let result = executor(service.clone())
        .with_max_rows(Some(3))
        .execute_sql("SELECT n FROM numbers")
        .await
        .unwrap();

    assert_eq!(result.row_count, 3);
    assert!(result.was_truncated);
    assert!(result.truncation_warning().is_some());
    assert_eq!(service.result_calls(), 2);
}

#[tokio::test]
async fn test_executor_is_shared_across_tasks() {
    let service = Arc::new(MockQueryService::new());
    let exec = Arc::new(executor(service.clone()));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.execute_sql(&format!("SELECT {i}")).await })
        })
        .collect();

    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.row_count, 1);
        assert!(result.rows[0][0].starts_with("Mock result for: SELECT"));
    }
    assert_eq!(service.submitted().len(), 4);
}

#[tokio::test]
async fn test_every_path_yields_outcome_or_error() {
    let scenarios = vec![
        Scenario::table(&["n"], &[&["1"]]),
        Scenario::failing("boom"),
        Scenario::new().status(QueryStatus::Cancelled),
        Scenario::new().rejecting_submission("denied"),
        Scenario::new().poll_error("flaky"),
        Scenario::new().status(QueryStatus::Succeeded).failing_results("gone"),
        Scenario::new(),
    ];

    for scenario in scenarios {
        let service = Arc::new(MockQueryService::with_scenario(scenario));
        let exec = executor(service)
            .with_policy(fast_policy().with_max_wait(Some(Duration::from_millis(20))));

        match exec.execute(&exec.target().request("SELECT 1")).await {
            Ok(QueryOutcome::Success(result)) => assert_eq!(result.row_count, 1),
            Ok(QueryOutcome::Failure(failure)) => assert!(failure.status.is_terminal()),
            Err(e) => assert!(matches!(
                e,
                Text2SqlError::Submission(_) | Text2SqlError::Polling(_) | Text2SqlError::Timeout(_)
            )),
        }
    }
}
