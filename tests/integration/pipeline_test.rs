//! Question-to-answer pipeline integration tests.
//!
//! Uses the scripted query service and LLM, so runs are deterministic.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use text2sql::athena::{MockQueryService, QueryService, Scenario};
use text2sql::config::PipelineConfig;
use text2sql::error::Text2SqlError;
use text2sql::llm::{MockLlmClient, Role};
use text2sql::pipeline::Text2SqlPipeline;
use text2sql::query::{PollPolicy, QueryExecutor, QueryTarget};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

fn pipeline(
    service: Arc<MockQueryService>,
    llm: Arc<MockLlmClient>,
    settings: PipelineConfig,
) -> Text2SqlPipeline {
    let service: Arc<dyn QueryService> = service;
    let target = QueryTarget {
        database: "sales".to_string(),
        output_location: "s3://athena-results/".to_string(),
        ..QueryTarget::default()
    };
    let executor = QueryExecutor::new(service, target)
        .with_policy(PollPolicy::default().with_poll_interval(Duration::from_millis(1)));
    Text2SqlPipeline::new(executor, llm, settings)
}

fn settings() -> PipelineConfig {
    PipelineConfig {
        include_catalog: false,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_failed_query_is_repaired() {
    let service = Arc::new(
        MockQueryService::new()
            .on_query(
                "order_total",
                Scenario::failing(
                    "COLUMN_NOT_FOUND: line 1:12: Column 'order_total' cannot be resolved",
                ),
            )
            .on_query("sum(amount)", Scenario::table(&["revenue"], &[&["1200.50"]])),
    );
    let llm = Arc::new(
        MockLlmClient::new()
            .then_reply("```sql\nSELECT SUM(order_total) AS revenue FROM orders\n```")
            .then_reply("```sql\nSELECT SUM(amount) AS revenue FROM orders\n```")
            .then_reply("Total revenue is 1200.50."),
    );

    let answer = pipeline(service.clone(), llm.clone(), settings())
        .ask("What is our total revenue?")
        .await
        .unwrap();

    assert_eq!(answer.attempts, 2);
    assert_eq!(answer.sql, "SELECT SUM(amount) AS revenue FROM orders");
    assert_eq!(answer.result.rows, vec![vec!["1200.50".to_string()]]);
    assert_eq!(answer.summary, "Total revenue is 1200.50.");
    assert_eq!(service.submitted().len(), 2);

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    let repair = &requests[1];
    assert_eq!(repair[2].role, Role::Assistant);
    assert!(repair[2].content.contains("order_total"));
    assert!(repair[3].content.contains("COLUMN_NOT_FOUND"));
}

#[tokio::test]
async fn test_repair_attempts_are_bounded() {
    let service = Arc::new(MockQueryService::with_scenario(Scenario::failing(
        "TABLE_NOT_FOUND: Table 'sales.orderz' does not exist",
    )));
    let llm = Arc::new(
        MockLlmClient::new()
            .then_reply("```sql\nSELECT * FROM orderz\n```")
            .then_reply("```sql\nSELECT * FROM orderz LIMIT 10\n```"),
    );

    let err = pipeline(service.clone(), llm.clone(), settings())
        .ask("Show me some orders")
        .await
        .unwrap_err();

    assert_eq!(
        err.failure_reason(),
        Some("TABLE_NOT_FOUND: Table 'sales.orderz' does not exist")
    );
    assert_eq!(service.submitted().len(), 2);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_no_repair_when_disabled() {
    let service = Arc::new(MockQueryService::with_scenario(Scenario::failing("boom")));
    let llm = Arc::new(MockLlmClient::new().then_reply("```sql\nSELECT 1\n```"));
    let settings = PipelineConfig {
        max_repair_attempts: 0,
        ..settings()
    };

    let err = pipeline(service.clone(), llm.clone(), settings)
        .ask("Anything")
        .await
        .unwrap_err();

    assert!(matches!(err, Text2SqlError::QueryFailed(_)));
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_mutations_need_opt_in() {
    let llm = || Arc::new(MockLlmClient::new());

    let service = Arc::new(MockQueryService::new());
    let err = pipeline(service.clone(), llm(), settings())
        .ask("Delete the cancelled orders")
        .await
        .unwrap_err();
    assert!(matches!(err, Text2SqlError::Unsafe(_)));
    assert!(service.submitted().is_empty());

    let service = Arc::new(MockQueryService::new());
    let allowed = PipelineConfig {
        allow_mutations: true,
        ..settings()
    };
    let answer = pipeline(service.clone(), llm(), allowed)
        .ask("Delete the cancelled orders")
        .await
        .unwrap();
    assert!(answer.sql.starts_with("DELETE FROM orders"));
    assert_eq!(service.submitted().len(), 1);
}

#[tokio::test]
async fn test_knowledge_and_catalog_reach_prompt() {
    let mut notes = NamedTempFile::new().unwrap();
    writeln!(notes, "Revenue means SUM(amount) over completed orders.").unwrap();

    let service = Arc::new(
        MockQueryService::new()
            .on_query(
                "information_schema.columns",
                Scenario::table(
                    &["table_name", "column_name", "data_type"],
                    &[
                        &["orders", "id", "bigint"],
                        &["orders", "amount", "double"],
                        &["customers", "id", "bigint"],
                    ],
                ),
            )
            .on_query("sum(amount)", Scenario::table(&["region", "revenue"], &[&["EU", "10"]])),
    );
    let llm = Arc::new(MockLlmClient::new());
    let settings = PipelineConfig {
        knowledge_files: vec![notes.path().to_path_buf()],
        include_catalog: true,
        ..PipelineConfig::default()
    };

    let answer = pipeline(service.clone(), llm.clone(), settings)
        .ask("What is revenue by region?")
        .await
        .unwrap();

    assert_eq!(answer.attempts, 1);
    assert_eq!(answer.summary, "The query returned the requested data.");

    let system = &llm.requests()[0][0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("Database: sales"));
    assert!(system.content.contains("- orders(id bigint, amount double)"));
    assert!(system.content.contains("- customers(id bigint)"));
    assert!(system.content.contains("Revenue means SUM(amount)"));

    let submitted = service.submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted[0].query_text.contains("table_schema = 'sales'"));
}

#[tokio::test]
async fn test_missing_knowledge_file_is_config_error() {
    let service = Arc::new(MockQueryService::new());
    let llm = Arc::new(MockLlmClient::new());
    let settings = PipelineConfig {
        knowledge_files: vec!["/nonexistent/notes.md".into()],
        ..settings()
    };

    let err = pipeline(service, llm.clone(), settings)
        .ask("How many orders?")
        .await
        .unwrap_err();

    assert!(matches!(err, Text2SqlError::Config(_)));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_llm_failure_propagates() {
    let service = Arc::new(MockQueryService::new());
    let llm = Arc::new(MockLlmClient::new().then_fail("Bedrock throttled the request"));

    let err = pipeline(service.clone(), llm, settings())
        .ask("How many orders?")
        .await
        .unwrap_err();

    assert!(matches!(err, Text2SqlError::Llm(_)));
    assert!(service.submitted().is_empty());
}

#[tokio::test]
async fn test_cancel_during_execution() {
    let service = Arc::new(MockQueryService::with_scenario(Scenario::new()));
    let llm = Arc::new(MockLlmClient::new());
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = pipeline(service.clone(), llm, settings())
        .ask_with_cancel("How many orders?", &token)
        .await
        .unwrap_err();

    assert!(matches!(err, Text2SqlError::Cancelled));
    assert_eq!(service.stop_calls(), 1);
}

#[tokio::test]
async fn test_cancel_during_slow_llm_call() {
    let service = Arc::new(MockQueryService::new());
    let llm = Arc::new(MockLlmClient::new().with_latency(Duration::from_secs(30)));
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = pipeline(service.clone(), llm.clone(), settings())
        .ask_with_cancel("How many orders?", &token)
        .await
        .unwrap_err();

    assert!(matches!(err, Text2SqlError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(llm.call_count(), 1);
    assert!(service.submitted().is_empty());
}

#[tokio::test]
async fn test_pre_cancelled_ask_does_no_work() {
    let service = Arc::new(MockQueryService::new());
    let llm = Arc::new(MockLlmClient::new());
    let token = CancellationToken::new();
    token.cancel();

    let err = pipeline(service.clone(), llm.clone(), PipelineConfig::default())
        .ask_with_cancel("How many orders?", &token)
        .await
        .unwrap_err();

    assert!(matches!(err, Text2SqlError::Cancelled));
    assert_eq!(llm.call_count(), 0);
    assert!(service.submitted().is_empty());
    assert_eq!(service.stop_calls(), 0);
}
