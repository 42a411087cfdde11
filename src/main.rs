use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codebase_mirror::core::validator::RECORD_SCHEMA_V1;
use codebase_mirror::formatters::publish;
use codebase_mirror::{Pipeline, PipelineConfig, RunSummary};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "codebase-mirror",
    version,
    about = "Turn a source tree into per-file analysis records, a dependency graph and a call graph"
)]
struct Cli {
    /// Root directory to analyze
    #[arg(short, long, value_name = "DIR")]
    input: PathBuf,

    /// Directory for record streams, graphs and the run summary
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// TOML configuration file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Files processed concurrently
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Files larger than this are skipped as unreadable
    #[arg(long, value_name = "BYTES")]
    max_file_size: Option<u64>,

    /// Disk cache location (default: <output>/.cache)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Analyze every file, ignoring and not updating the cache
    #[arg(long)]
    no_cache: bool,

    /// Per-file deadline for reading and analysis
    #[arg(long, value_name = "SECS")]
    file_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(max_file_size) = self.max_file_size {
            config.max_file_size = max_file_size;
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = Some(cache_dir.clone());
        }
        if self.no_cache {
            config.use_cache = false;
        }
        if let Some(file_timeout) = self.file_timeout {
            config.file_timeout_secs = file_timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("codebase_mirror={log_level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            print_summary(&RunSummary {
                aborted: Some(format!("{err:#}")),
                ..RunSummary::new(RECORD_SCHEMA_V1)
            });
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.pipeline_config()?;
    tracing::info!("codebase-mirror v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Input: {}", cli.input.display());
    tracing::info!("Output: {}", cli.output.display());

    let mut report = Pipeline::new(&cli.input, &cli.output, config)
        .run(shutdown_signal())
        .await?;
    let interrupted = report.interrupted();

    let code = match publish(&mut report, &cli.output) {
        Ok(written) => {
            for path in &written {
                tracing::info!("Wrote {}", path.display());
            }
            if interrupted {
                ExitCode::from(130)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(1)
        }
    };
    print_summary(&report.summary);
    Ok(code)
}

fn print_summary(summary: &RunSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!("Cannot encode run summary: {err}"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}
