//! Query replay
//!
//! Re-runs one logged query through the engine against an
//! [`AgeCollectingStorage`] bound to the query's execution time. The engine
//! decides which windows to read; the storage turns each into an age record.

use super::descriptor::{Evaluation, QueryDescriptor};
use super::error::{ReplayError, ReplayResult};
use super::storage::AgeCollectingStorage;
use crate::histogram::AgeHistogram;
use crate::promql::{Engine, EngineOpts};
use std::sync::Arc;

/// Replays queries into a shared histogram
#[derive(Debug, Clone)]
pub struct QueryReplayer {
    engine: Engine,
    histogram: Arc<AgeHistogram>,
}

impl QueryReplayer {
    pub fn new(opts: EngineOpts, histogram: Arc<AgeHistogram>) -> Self {
        Self {
            engine: Engine::new(opts),
            histogram,
        }
    }

    /// The histogram replays report into
    pub fn histogram(&self) -> &Arc<AgeHistogram> {
        &self.histogram
    }

    /// Replay one query
    ///
    /// The query total is incremented before anything else, so failed
    /// queries are counted too. Sessions are released on every path.
    ///
    /// # Panics
    ///
    /// Panics if the engine ever requests a window whose start lies after its
    /// end.
    pub fn replay(&self, descriptor: &QueryDescriptor) -> ReplayResult<()> {
        self.histogram.increment_query_count();

        let storage = AgeCollectingStorage::new(Arc::clone(&self.histogram), descriptor.executed_at);

        let query = match &descriptor.evaluation {
            Evaluation::Instant { time } => self.engine.new_instant_query(&storage, &descriptor.query, *time),
            Evaluation::Range { start, end, step } => {
                self.engine
                    .new_range_query(&storage, &descriptor.query, *start, *end, *step)
            }
        };

        query
            .and_then(|mut q| q.exec())
            .map(|_| ())
            .map_err(|source| ReplayError::Evaluation {
                query: descriptor.query.clone(),
                source,
            })
    }
}
