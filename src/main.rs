//! text2sql - ask questions about data in Amazon Athena.

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use cli::{Cli, Command};
use text2sql::athena::{self, MockQueryService, QueryService};
use text2sql::config::Config;
use text2sql::llm::create_client;
use text2sql::output::{format_answer, format_result};
use text2sql::pipeline::Text2SqlPipeline;
use text2sql::query::QueryExecutor;
use text2sql::safety::ensure_allowed;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match &cli.command {
        Command::Config => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("# {}", cli.config_path().display());
            println!(
                "# AWS credentials: {}",
                if config.athena.credentials.is_some() {
                    "found"
                } else {
                    "not found"
                }
            );
            print!("{rendered}");
        }
        Command::Query { sql, .. } => {
            ensure_allowed(sql, config.pipeline.allow_mutations)?;
            let executor = build_executor(&cli, &config)?;
            let cancel = cancel_on_ctrl_c();

            let result = executor.execute_sql_with_cancel(sql, &cancel).await?;
            print!("{}", format_result(&result, cli.format));
        }
        Command::Ask { question, .. } => {
            let executor = build_executor(&cli, &config)?;
            let llm = create_client(
                &config.llm,
                config.athena.region(),
                config.athena.credentials.clone(),
            )?;
            let pipeline = Text2SqlPipeline::new(executor, Arc::from(llm), config.pipeline.clone());
            let cancel = cancel_on_ctrl_c();

            let answer = pipeline.ask_with_cancel(question, &cancel).await?;
            print!("{}", format_answer(&answer, cli.format));
        }
    }

    Ok(())
}

/// Resolves configuration with precedence: CLI flags > config file > environment > defaults.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    config.apply_env_defaults();
    cli.apply_overrides(&mut config);

    if !cli.mock && cli.command != Command::Config {
        config.athena.validate()?;
    }
    info!("Target: {}", config.athena.display_string());

    Ok(config)
}

fn build_executor(cli: &Cli, config: &Config) -> Result<QueryExecutor> {
    let service: Arc<dyn QueryService> = if cli.mock {
        Arc::new(MockQueryService::new())
    } else {
        Arc::from(athena::connect(&config.athena)?)
    };
    Ok(QueryExecutor::from_config(service, &config.athena))
}

/// Returns a token cancelled on the first Ctrl-C. A second Ctrl-C exits at once.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, stopping query");
        trigger.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted again, exiting");
            std::process::exit(130);
        }
    });
    token
}
