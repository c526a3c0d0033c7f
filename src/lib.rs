//! # agescope
//!
//! Temporal access profiler for PromQL workloads. Replays logged queries
//! against a synthetic storage layer and records, for every data selection
//! the evaluator makes, how far before the query's execution time the
//! requested data lies.
//!
//! ## Modules
//!
//! - [`histogram`]: lock-free age histogram and bucket layouts
//! - [`promql`]: PromQL parser and evaluator with a pluggable storage capability
//! - [`profiler`]: the age-collecting storage adapter and query replay
//! - [`logline`]: query log decoding
//! - [`runner`]: concurrent replay of whole log files
//! - [`report`]: CSV and JSON histogram reports
//! - [`shapes`]: query anonymization and shape statistics
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agescope::histogram::AgeHistogram;
//! use agescope::profiler::QueryReplayer;
//! use agescope::promql::EngineOpts;
//! use agescope::runner::ProfileRunner;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let histogram = Arc::new(AgeHistogram::tiered(395)?);
//!     let replayer = QueryReplayer::new(EngineOpts::default(), histogram);
//!
//!     let runner = ProfileRunner::new(replayer, 8);
//!     let summary = runner.run(&["queries.log"]).await?;
//!
//!     agescope::report::write_csv(&runner.histogram().snapshot(), std::io::stdout())?;
//!     eprintln!("{} queries, {} failed", summary.queries_replayed, summary.failures.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod histogram;
pub mod logline;
pub mod profiler;
pub mod promql;
pub mod report;
pub mod runner;
pub mod shapes;

pub use config::{Config, ConfigError};

pub use histogram::{AgeBucket, AgeHistogram, HistogramError, HistogramSnapshot};

pub use profiler::{QueryDescriptor, QueryReplayer, ReplayError};

pub use runner::{ProfileError, ProfileRunner, RunSummary};
