//! Configuration management for text2sql.
//!
//! Handles loading configuration from TOML files and environment variables:
//! the Athena target, the LLM provider, and pipeline settings.

use crate::athena::sigv4::AwsCredentials;
use crate::error::{Result, Text2SqlError};
use crate::query::PollPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// Main configuration structure for text2sql.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Athena query target and polling behavior.
    #[serde(default)]
    pub athena: AthenaConfig,

    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Question-answering pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Athena configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// AWS region (e.g., "us-east-1"). Unset means the environment, then
    /// `DEFAULT_REGION`.
    pub region: Option<String>,

    /// Database queries run against.
    #[serde(default)]
    pub database: String,

    /// Data catalog (Athena default when unset).
    pub catalog: Option<String>,

    /// S3 location for query result files.
    #[serde(default)]
    pub output_location: String,

    /// Workgroup (Athena default when unset).
    pub workgroup: Option<String>,

    /// Endpoint override, e.g. for a local emulator.
    pub endpoint: Option<String>,

    /// Milliseconds between status checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds to wait for a query before stopping it. 0 waits forever.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Consecutive failed status checks tolerated.
    #[serde(default)]
    pub poll_retries: u32,

    /// Maximum number of result rows to fetch.
    pub max_rows: Option<usize>,

    /// Credentials are never read from or written to the config file.
    #[serde(skip)]
    pub credentials: Option<AwsCredentials>,
}

/// Region used when neither the config file nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Provider used when neither the config file nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "bedrock";

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_wait_secs() -> u64 {
    300
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            region: None,
            database: String::new(),
            catalog: None,
            output_location: String::new(),
            workgroup: None,
            endpoint: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
            poll_retries: 0,
            max_rows: None,
            credentials: None,
        }
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*$").expect("identifier pattern is valid")
    })
}

/// Returns true if `name` is a plain database or catalog identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

impl AthenaConfig {
    /// The configured region, or `DEFAULT_REGION`.
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Applies environment variables as defaults for unset fields.
    ///
    /// Reads `DATABASE_NAME`, `OUTPUT_LOCATION`, `ATHENA_WORKGROUP`,
    /// `AWS_REGION_NAME` / `AWS_REGION`, and the AWS credential variables.
    /// A region still unset afterwards becomes `DEFAULT_REGION`.
    pub fn apply_env_defaults(&mut self) {
        if self.database.is_empty() {
            if let Ok(database) = std::env::var("DATABASE_NAME") {
                self.database = database;
            }
        }
        if self.output_location.is_empty() {
            if let Ok(location) = std::env::var("OUTPUT_LOCATION") {
                self.output_location = location;
            }
        }
        if self.workgroup.is_none() {
            self.workgroup = std::env::var("ATHENA_WORKGROUP").ok();
        }
        if self.region.is_none() {
            self.region = std::env::var("AWS_REGION_NAME")
                .or_else(|_| std::env::var("AWS_REGION"))
                .ok();
        }
        self.region.get_or_insert_with(|| DEFAULT_REGION.to_string());
        if self.credentials.is_none() {
            self.credentials = AwsCredentials::from_env();
        }
    }

    /// Checks that the target is complete and well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(Text2SqlError::config(
                "Database name is required. Set [athena].database or DATABASE_NAME.",
            ));
        }
        if !is_valid_identifier(&self.database) {
            return Err(Text2SqlError::config(format!(
                "Invalid database name '{}'",
                self.database
            )));
        }
        if let Some(catalog) = &self.catalog {
            if !is_valid_identifier(catalog) {
                return Err(Text2SqlError::config(format!(
                    "Invalid catalog name '{catalog}'"
                )));
            }
        }
        if self.output_location.is_empty() {
            return Err(Text2SqlError::config(
                "Output location is required. Set [athena].output_location or OUTPUT_LOCATION.",
            ));
        }
        let location = Url::parse(&self.output_location).map_err(|e| {
            Text2SqlError::config(format!(
                "Invalid output location '{}': {e}",
                self.output_location
            ))
        })?;
        if location.scheme() != "s3" {
            return Err(Text2SqlError::config(format!(
                "Invalid scheme '{}' in output location. Expected 's3'",
                location.scheme()
            )));
        }
        if location.host_str().map_or(true, str::is_empty) {
            return Err(Text2SqlError::config(
                "Output location must name a bucket (s3://bucket/prefix/)",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Text2SqlError::config("poll_interval_ms must be positive"));
        }
        Ok(())
    }

    /// Returns the polling behavior described by this config.
    pub fn poll_policy(&self) -> PollPolicy {
        let max_wait =
            (self.max_wait_secs > 0).then(|| Duration::from_secs(self.max_wait_secs));
        PollPolicy::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_max_wait(max_wait)
            .with_poll_retries(self.poll_retries)
    }

    /// Returns a display-safe summary (no credentials).
    pub fn display_string(&self) -> String {
        let database = if self.database.is_empty() {
            "unknown"
        } else {
            &self.database
        };
        format!("{database} @ athena/{}", self.region())
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "bedrock", "openai" or "mock". Unset means
    /// `LLM_PROVIDER`, then `DEFAULT_PROVIDER`.
    pub provider: Option<String>,

    /// Model name; the provider default when unset.
    pub model: Option<String>,

    /// Region for Bedrock (defaults to the Athena region).
    pub region: Option<String>,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            region: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    /// The configured provider name, or `DEFAULT_PROVIDER`.
    pub fn provider(&self) -> &str {
        self.provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    /// Applies `LLM_PROVIDER` and `LLM_MODEL` as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.provider.is_none() {
            self.provider = std::env::var("LLM_PROVIDER").ok();
        }
        self.provider.get_or_insert_with(|| DEFAULT_PROVIDER.to_string());
        if self.model.is_none() {
            self.model = std::env::var("LLM_MODEL").ok();
        }
    }
}

/// Question-answering pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Plain-text files describing the data, passed to the LLM as context.
    #[serde(default)]
    pub knowledge_files: Vec<PathBuf>,

    /// Whether to read table and column names from information_schema.
    #[serde(default = "default_true")]
    pub include_catalog: bool,

    /// Let generated SQL modify data.
    #[serde(default)]
    pub allow_mutations: bool,

    /// Times a failed query is sent back to the LLM for a corrected version.
    #[serde(default = "default_repair_attempts")]
    pub max_repair_attempts: u32,

    /// Result rows shown to the LLM when summarizing.
    #[serde(default = "default_summary_rows")]
    pub summary_rows: usize,
}

fn default_true() -> bool {
    true
}

fn default_repair_attempts() -> u32 {
    1
}

fn default_summary_rows() -> usize {
    50
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            knowledge_files: Vec::new(),
            include_catalog: true,
            allow_mutations: false,
            max_repair_attempts: default_repair_attempts(),
            summary_rows: default_summary_rows(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("athena-text2sql")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Text2SqlError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Text2SqlError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Fills unset fields from the environment.
    pub fn apply_env_defaults(&mut self) {
        self.athena.apply_env_defaults();
        self.llm.apply_env_defaults();
    }
}
