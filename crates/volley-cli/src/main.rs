mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use volley_client::ReqwestFetcher;
use volley_core::{AppError, DrainMode, Fetcher, Pipeline, PipelineConfig, RunReport};

#[derive(Parser)]
#[command(
    name = "volley",
    version,
    about = "Fire a batch of concurrent GETs at one endpoint and tabulate the JSON replies"
)]
struct Cli {
    /// Path of the CSV table to write
    output: PathBuf,

    /// Endpoint every task fetches (http or https)
    #[arg(short, long, env = "VOLLEY_TARGET")]
    target: String,

    /// Number of concurrent workers
    #[arg(short, long, env = "VOLLEY_WORKERS", default_value_t = volley_core::config::DEFAULT_WORKERS)]
    workers: usize,

    /// Number of requests submitted
    #[arg(short, long, env = "VOLLEY_BATCH_SIZE", default_value_t = volley_core::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "VOLLEY_TIMEOUT_SECS", default_value_t = volley_core::config::DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Result channel capacity (defaults to 2 x workers)
    #[arg(long, env = "VOLLEY_RESULT_CAPACITY")]
    result_capacity: Option<usize>,

    /// When results are aggregated relative to batch completion
    #[arg(long, env = "VOLLEY_DRAIN", value_enum, default_value_t = Drain::Concurrent)]
    drain: Drain,
}

#[derive(Clone, Copy, ValueEnum)]
enum Drain {
    /// Aggregate while requests are still in flight
    Concurrent,
    /// Aggregate only after every request finished (can deadlock)
    AfterBarrier,
}

impl From<Drain> for DrainMode {
    fn from(drain: Drain) -> Self {
        match drain {
            Drain::Concurrent => DrainMode::Concurrent,
            Drain::AfterBarrier => DrainMode::AfterBarrier,
        }
    }
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.target.as_str())
            .with_workers(self.workers)
            .with_batch_size(self.batch_size)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_drain(self.drain.into());
        if let Some(capacity) = self.result_capacity {
            config = config.with_result_capacity(capacity);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("volley_core=info".parse()?)
                .add_directive("volley_cli=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let run = cmd_run(&cli);
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result,
        signal = tokio::signal::ctrl_c() => match interrupt_exit_code(&signal) {
            Some(code) => {
                // In-flight requests and buffered payloads are discarded.
                tracing::warn!("Interrupted, aborting without writing output");
                std::process::exit(code);
            }
            None => run.await,
        },
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Run failed");
            Ok(ExitCode::from(exit_code(&e)))
        }
    }
}

/// Exit code for a Ctrl-C future that resolved, or `None` if the handler
/// could not be installed and the run should continue without it.
fn interrupt_exit_code(signal: &std::io::Result<()>) -> Option<i32> {
    match signal {
        Ok(()) => Some(130),
        Err(e) => {
            tracing::warn!(error = %e, "Ctrl-C handler unavailable, running without it");
            None
        }
    }
}

/// 65 (EX_DATAERR) when the endpoint sent an undecodable payload, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    let data_error = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<AppError>())
        .any(AppError::is_data_error);
    if data_error { 65 } else { 1 }
}

async fn cmd_run(cli: &Cli) -> Result<()> {
    let config = cli.pipeline_config();

    let fetcher =
        ReqwestFetcher::with_timeout(config.timeout).context("Failed to create HTTP client")?;
    let report = run_to_file(config, fetcher, &cli.output).await?;

    println!("{}", serde_json::to_string(&report)?);

    Ok(())
}

/// Run one batch and write the table to `path`.
///
/// The file is only touched after the whole batch aggregated successfully.
async fn run_to_file<F: Fetcher>(
    config: PipelineConfig,
    fetcher: F,
    path: &Path,
) -> Result<RunReport> {
    let pipeline = Pipeline::new(config, fetcher);
    let output = pipeline.run().await.context("Batch failed")?;

    output::write_csv(&output.table, path)?;
    tracing::info!(
        path = %path.display(),
        rows = output.report.rows,
        "Table written"
    );

    Ok(output.report)
}
