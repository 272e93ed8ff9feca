//! Trading agent binary.
//!
//! One invocation is one run: parse the mode, load and validate config, take
//! the process lock, execute the pipeline, and exit. Exit code 0 covers
//! success, weekend skip, and duplicate no-op; exit code 1 covers lock
//! contention, failed health checks, and any unhandled error.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trading_agent::broker::AlpacaBroker;
use trading_agent::config::AppConfig;
use trading_agent::ledger::Ledger;
use trading_agent::lock::ProcessGuard;
use trading_agent::oracle::CliOracle;
use trading_agent::pipeline::{Mode, Pipeline};
use trading_agent::PipelineError;

/// Scheduled safety-first equity trading pipeline.
#[derive(Debug, Parser)]
#[command(name = "trading-agent", version, about)]
struct Cli {
    /// Pipeline mode to execute.
    #[arg(long, value_enum)]
    mode: Mode,

    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Config failures abort before the lock; no side effects yet.
    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Configuration invalid");
            return ExitCode::from(1);
        }
    };

    // Single-instance guard. Held until process exit; released on all paths.
    let _guard = match ProcessGuard::acquire(Path::new(&config.lock.path)) {
        Ok(guard) => guard,
        Err(PipelineError::LockContention { path }) => {
            tracing::warn!(path = %path, "Another instance is running, aborting");
            return ExitCode::from(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to take process lock");
            return ExitCode::from(1);
        }
    };

    match run(cli.mode, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            ExitCode::from(1)
        }
    }
}

async fn run(mode: Mode, config: AppConfig) -> anyhow::Result<u8> {
    let ledger = Ledger::open(&config.database.path).await?;
    let broker = AlpacaBroker::new(&config.alpaca)?;
    let oracle = CliOracle::new(&config.oracle);

    let pipeline = Pipeline::new(config, ledger, broker, oracle);
    let outcome = pipeline.run(mode, chrono::Utc::now()).await?;
    tracing::info!(outcome = ?outcome, "Done");
    Ok(u8::try_from(outcome.exit_code()).unwrap_or(1))
}
