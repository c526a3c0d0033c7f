//! Profiling Runner
//!
//! Streams query log files line by line, decodes each line in file order and
//! fans replays out over a bounded pool of blocking tasks. Evaluation is
//! CPU-bound, so replays run on `spawn_blocking` while a semaphore caps how
//! many are in flight.
//!
//! # Example
//!
//! ```rust,ignore
//! let runner = ProfileRunner::new(replayer, 8);
//! let summary = runner.run(&["query.log"]).await?;
//! println!("{} queries, {} failed", summary.queries_replayed, summary.failures.len());
//! ```

mod error;

pub use error::{ProfileError, ProfileResult};

use crate::histogram::AgeHistogram;
use crate::logline::decode_line;
use crate::profiler::{QueryReplayer, ReplayError};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// A query whose replay failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedQuery {
    pub query: String,
    pub error: String,
}

/// Outcome of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Lines read across all files
    pub lines_read: usize,
    /// Blank lines and requests to unrelated paths
    pub lines_skipped: usize,
    /// Queries handed to the replayer, failed ones included
    pub queries_replayed: usize,
    pub failures: Vec<FailedQuery>,
}

impl RunSummary {
    /// Queries that replayed without error
    pub fn succeeded(&self) -> usize {
        self.queries_replayed - self.failures.len()
    }
}

/// Replays query logs into a histogram
pub struct ProfileRunner {
    replayer: Arc<QueryReplayer>,
    concurrency: usize,
}

impl ProfileRunner {
    /// Create a runner with at most `concurrency` replays in flight
    pub fn new(replayer: QueryReplayer, concurrency: usize) -> Self {
        Self {
            replayer: Arc::new(replayer),
            concurrency: concurrency.max(1),
        }
    }

    pub fn histogram(&self) -> &Arc<AgeHistogram> {
        self.replayer.histogram()
    }

    /// Replay every query in `paths`, in order.
    ///
    /// Stops at the first unreadable file, undecodable line or panicked
    /// replay. Accounting already done is kept.
    pub async fn run<P: AsRef<Path>>(&self, paths: &[P]) -> ProfileResult<RunSummary> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(String, Result<(), ReplayError>)> = JoinSet::new();
        let mut summary = RunSummary::default();

        for path in paths {
            let path = path.as_ref();
            tracing::info!("Analysing file {}", path.display());

            let io_error = |source| ProfileError::Io {
                path: path.to_path_buf(),
                source,
            };

            let file = File::open(path).await.map_err(io_error)?;
            let mut lines = BufReader::new(file).lines();
            let mut line_number = 0;

            while let Some(line) = lines.next_line().await.map_err(io_error)? {
                line_number += 1;
                summary.lines_read += 1;

                if line.trim().is_empty() {
                    summary.lines_skipped += 1;
                    continue;
                }

                let descriptor = match decode_line(&line) {
                    Ok(Some(descriptor)) => descriptor,
                    Ok(None) => {
                        tracing::debug!("Skipping line {} of {}: not a query request", line_number, path.display());
                        summary.lines_skipped += 1;
                        continue;
                    }
                    Err(source) => {
                        return Err(ProfileError::Decode {
                            path: path.to_path_buf(),
                            line: line_number,
                            source,
                        })
                    }
                };

                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| ProfileError::PoolClosed)?;

                while let Some(joined) = tasks.try_join_next() {
                    record_outcome(joined, &mut summary)?;
                }

                let replayer = Arc::clone(&self.replayer);
                summary.queries_replayed += 1;
                tasks.spawn_blocking(move || {
                    let _permit = permit;
                    let outcome = replayer.replay(&descriptor);
                    (descriptor.query, outcome)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            record_outcome(joined, &mut summary)?;
        }

        tracing::info!(
            "Analysis complete: {} queries replayed, {} failed, {} lines skipped",
            summary.queries_replayed,
            summary.failures.len(),
            summary.lines_skipped
        );

        Ok(summary)
    }
}

fn record_outcome(
    joined: Result<(String, Result<(), ReplayError>), JoinError>,
    summary: &mut RunSummary,
) -> ProfileResult<()> {
    match joined {
        Ok((_, Ok(()))) => Ok(()),
        Ok((query, Err(err))) => {
            tracing::warn!("{}", err);
            summary.failures.push(FailedQuery {
                query,
                error: err.to_string(),
            });
            Ok(())
        }
        Err(join_error) => {
            let message = if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                join_error.to_string()
            };
            tracing::error!("Replay task failed: {}", message);
            Err(ProfileError::ReplayPanicked(message))
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
