//! Configuration file integration tests.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::{NamedTempFile, TempDir};
use text2sql::athena::{MockQueryService, QueryService, Scenario};
use text2sql::config::Config;
use text2sql::error::Text2SqlError;
use text2sql::query::QueryExecutor;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(
        r#"
[athena]
region = "eu-central-1"
database = "analytics"
catalog = "AwsDataCatalog"
output_location = "s3://team-athena-results/text2sql/"
workgroup = "analysts"
poll_interval_ms = 250
max_wait_secs = 60
poll_retries = 2
max_rows = 500

[llm]
provider = "openai"
model = "gpt-4o-mini"

[pipeline]
knowledge_files = ["docs/tables.md"]
include_catalog = false
max_repair_attempts = 2
"#,
    );

    let config = Config::load_from_file(file.path()).unwrap();

    assert_eq!(config.athena.region(), "eu-central-1");
    assert_eq!(config.athena.database, "analytics");
    assert_eq!(config.athena.workgroup.as_deref(), Some("analysts"));
    assert_eq!(config.athena.max_rows, Some(500));
    assert_eq!(config.llm.provider(), "openai");
    assert_eq!(config.llm.model.as_deref(), Some("gpt-4o-mini"));
    assert!(!config.pipeline.include_catalog);
    assert_eq!(config.pipeline.max_repair_attempts, 2);
    assert!(config.athena.validate().is_ok());

    let policy = config.athena.poll_policy();
    assert_eq!(policy.poll_interval, Duration::from_millis(250));
    assert_eq!(policy.max_wait, Some(Duration::from_secs(60)));
    assert_eq!(policy.poll_retries, 2);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_from_file(&dir.path().join("config.toml")).unwrap();

    assert_eq!(config.athena.region(), "us-east-1");
    assert_eq!(config.athena.poll_interval_ms, 1000);
    assert_eq!(config.athena.max_wait_secs, 300);
    assert_eq!(config.athena.poll_retries, 0);
    assert_eq!(config.llm.provider(), "bedrock");
    assert!(config.pipeline.include_catalog);
    assert!(!config.pipeline.allow_mutations);
}

#[test]
fn test_file_values_beat_environment() {
    let explicit = write_config(
        r#"
[athena]
region = "us-east-1"

[llm]
provider = "bedrock"
"#,
    );
    let silent = write_config("[athena]\ndatabase = \"sales\"\n");

    std::env::set_var("AWS_REGION_NAME", "eu-west-1");
    std::env::set_var("AWS_REGION", "eu-west-1");
    std::env::set_var("LLM_PROVIDER", "openai");

    let mut from_file = Config::load_from_file(explicit.path()).unwrap();
    from_file.apply_env_defaults();
    let mut from_env = Config::load_from_file(silent.path()).unwrap();
    from_env.apply_env_defaults();

    std::env::remove_var("AWS_REGION_NAME");
    std::env::remove_var("AWS_REGION");
    std::env::remove_var("LLM_PROVIDER");

    assert_eq!(from_file.athena.region(), "us-east-1");
    assert_eq!(from_file.llm.provider(), "bedrock");
    assert_eq!(from_env.athena.region(), "eu-west-1");
    assert_eq!(from_env.llm.provider(), "openai");
}

#[test]
fn test_invalid_file_is_config_error() {
    let file = write_config("[athena\ndatabase = ");

    let err = Config::load_from_file(file.path()).unwrap_err();

    assert!(matches!(err, Text2SqlError::Config(_)));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn test_rendered_config_loads_back() {
    let mut config = Config::default();
    config.athena.database = "sales".to_string();
    config.athena.output_location = "s3://results/".to_string();
    config.pipeline.summary_rows = 20;

    let rendered = toml::to_string_pretty(&config).unwrap();
    assert!(!rendered.contains("credentials"));
    let file = write_config(&rendered);
    let loaded = Config::load_from_file(file.path()).unwrap();

    assert_eq!(loaded.athena.database, "sales");
    assert_eq!(loaded.pipeline.summary_rows, 20);
}

#[tokio::test]
async fn test_executor_follows_config() {
    let file = write_config(
        r#"
[athena]
database = "sales"
output_location = "s3://results/"
poll_interval_ms = 5
max_wait_secs = 30
max_rows = 1
"#,
    );
    let config = Config::load_from_file(file.path()).unwrap();

    let service = Arc::new(MockQueryService::with_scenario(Scenario::table(
        &["n"],
        &[&["1"], &["2"]],
    )));
    let dyn_service: Arc<dyn QueryService> = service.clone();
    let executor = QueryExecutor::from_config(dyn_service, &config.athena);

    assert_eq!(executor.target().database, "sales");
    assert_eq!(executor.policy().poll_interval, Duration::from_millis(5));

    let result = executor.execute_sql("SELECT n FROM numbers").await.unwrap();
    assert_eq!(result.row_count, 1);
    assert!(result.was_truncated);

    let submitted = service.submitted();
    assert_eq!(submitted[0].database, "sales");
    assert_eq!(submitted[0].output_location, "s3://results/");
}
