//! agescope CLI
//!
//! Command-line interface for the temporal access profiler:
//! - Replay query logs into an age histogram
//! - Extract and summarize query shapes
//! - Print the default configuration

use agescope::config::{generate_default_config, Config, LoggingConfig};
use agescope::profiler::QueryReplayer;
use agescope::report::{write_report, ReportFormat};
use agescope::runner::ProfileRunner;
use agescope::shapes::{collect_shapes, summarize, write_details, write_summary};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agescope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Measure how far back in time PromQL queries reach")]
#[command(long_about = "agescope replays logged PromQL queries against a synthetic storage layer \
and reports how old the data each query touches is, bucketed by age.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/agescope/config.toml or ./agescope.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay query logs and print the age histogram
    Profile {
        /// Query log files, read in order
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Report format (default: from config)
        #[arg(short, long, value_enum)]
        format: Option<ReportFormat>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Queries replayed at once (default: from config)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Print the anonymized shape of every logged query as CSV
    Shapes {
        /// Query log files, read in order
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Count range and instant queries per shape from a `shapes` CSV
    ShapesSummary {
        /// CSV written by `agescope shapes`
        path: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = match &cli.config {
        Some(path) => (Config::load_with_env(path)?, Some(path.clone())),
        None => Config::load_default()?,
    };
    init_tracing(&config.logging);

    match &config_path {
        Some(path) => tracing::info!("Loaded config from {}", path.display()),
        None => tracing::debug!("Using default config with environment overrides"),
    }

    match cli.command {
        Commands::Profile {
            paths,
            format,
            output,
            concurrency,
        } => {
            let histogram = Arc::new(config.buckets.build()?);
            let replayer = QueryReplayer::new(config.engine.engine_opts(), histogram);
            let runner = ProfileRunner::new(
                replayer,
                concurrency.unwrap_or(config.profiler.concurrency),
            );

            let summary = runner.run(paths.as_slice()).await?;
            if !summary.failures.is_empty() {
                tracing::warn!(
                    "{} of {} queries failed to evaluate",
                    summary.failures.len(),
                    summary.queries_replayed
                );
            }

            let snapshot = runner.histogram().snapshot();
            let mut out = open_output(output.as_deref())?;
            write_report(
                &snapshot,
                format.unwrap_or(config.profiler.report_format),
                &mut out,
            )?;
            out.flush()?;
        }

        Commands::Shapes { paths, output } => {
            let mut records = Vec::new();
            for path in &paths {
                tracing::info!("Analysing file {}", path.display());
                records.extend(collect_shapes(path)?);
            }

            let mut out = open_output(output.as_deref())?;
            write_details(&records, &mut out)?;
            out.flush()?;
        }

        Commands::ShapesSummary { path, output } => {
            let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
            let summaries = summarize(file)?;

            let mut out = open_output(output.as_deref())?;
            write_summary(&summaries, &mut out)?;
            out.flush()?;
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    eprintln!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("agescope={}", logging.level).into());

    let json = logging.format.eq_ignore_ascii_case("json");

    // Logs go to stderr so reports can be piped from stdout
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(std::io::stdout().lock()))),
    }
}
