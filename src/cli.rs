//! Command-line argument parsing for text2sql.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use text2sql::config::Config;
use text2sql::output::OutputFormat;

/// Ask questions about data in Amazon Athena.
#[derive(Parser, Debug)]
#[command(name = "text2sql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Athena database
    #[arg(short = 'd', long, global = true, value_name = "DATABASE")]
    pub database: Option<String>,

    /// Data catalog
    #[arg(long, global = true, value_name = "CATALOG")]
    pub catalog: Option<String>,

    /// S3 location for query results (e.g., s3://bucket/prefix/)
    #[arg(long, global = true, value_name = "S3_URI")]
    pub output_location: Option<String>,

    /// AWS region
    #[arg(long, global = true, value_name = "REGION")]
    pub region: Option<String>,

    /// Athena workgroup
    #[arg(long, global = true, value_name = "WORKGROUP")]
    pub workgroup: Option<String>,

    /// Athena endpoint override
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Milliseconds between status checks
    #[arg(long, global = true, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Seconds to wait before stopping a query (0 waits forever)
    #[arg(long, global = true, value_name = "SECS")]
    pub max_wait_secs: Option<u64>,

    /// Consecutive failed status checks to tolerate
    #[arg(long, global = true, value_name = "N")]
    pub poll_retries: Option<u32>,

    /// Maximum result rows to fetch
    #[arg(long, global = true, value_name = "N")]
    pub max_rows: Option<usize>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Use in-memory query service and LLM (no AWS calls)
    #[arg(long, global = true)]
    pub mock: bool,

    /// Write logs to the log file instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a SQL query and print the results
    Query {
        /// SQL to run
        sql: String,

        /// Run statements that modify data
        #[arg(long)]
        allow_mutations: bool,
    },

    /// Answer a question in plain language
    Ask {
        /// The question
        question: String,

        /// LLM provider (bedrock, openai, mock)
        #[arg(long, value_name = "PROVIDER")]
        llm: Option<String>,

        /// LLM model id
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Knowledge file describing the data (repeatable)
        #[arg(long = "knowledge", value_name = "PATH")]
        knowledge_files: Vec<PathBuf>,

        /// Skip reading tables and columns from information_schema
        #[arg(long)]
        no_catalog: bool,

        /// Let generated SQL modify data
        #[arg(long)]
        allow_mutations: bool,

        /// Times a failed query is sent back for correction
        #[arg(long, value_name = "N")]
        max_repair_attempts: Option<u32>,
    },

    /// Print the resolved configuration
    Config,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line values on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        let athena = &mut config.athena;
        if let Some(database) = &self.database {
            athena.database = database.clone();
        }
        if let Some(catalog) = &self.catalog {
            athena.catalog = Some(catalog.clone());
        }
        if let Some(location) = &self.output_location {
            athena.output_location = location.clone();
        }
        if let Some(region) = &self.region {
            athena.region = Some(region.clone());
        }
        if let Some(workgroup) = &self.workgroup {
            athena.workgroup = Some(workgroup.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            athena.endpoint = Some(endpoint.clone());
        }
        if let Some(interval) = self.poll_interval_ms {
            athena.poll_interval_ms = interval;
        }
        if let Some(max_wait) = self.max_wait_secs {
            athena.max_wait_secs = max_wait;
        }
        if let Some(retries) = self.poll_retries {
            athena.poll_retries = retries;
        }
        if self.max_rows.is_some() {
            athena.max_rows = self.max_rows;
        }

        match &self.command {
            Command::Query {
                allow_mutations, ..
            } => {
                config.pipeline.allow_mutations |= allow_mutations;
            }
            Command::Ask {
                llm,
                model,
                knowledge_files,
                no_catalog,
                allow_mutations,
                max_repair_attempts,
                ..
            } => {
                if let Some(provider) = llm {
                    config.llm.provider = Some(provider.clone());
                }
                if let Some(model) = model {
                    config.llm.model = Some(model.clone());
                }
                if !knowledge_files.is_empty() {
                    config.pipeline.knowledge_files = knowledge_files.clone();
                }
                if *no_catalog {
                    config.pipeline.include_catalog = false;
                }
                config.pipeline.allow_mutations |= allow_mutations;
                if let Some(attempts) = max_repair_attempts {
                    config.pipeline.max_repair_attempts = *attempts;
                }
            }
            Command::Config => {}
        }

        if self.mock {
            config.llm.provider = Some("mock".to_string());
        }
    }
}
