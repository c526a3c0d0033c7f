//! Age-collecting storage
//!
//! A [`Queryable`] that holds no data. Every session the engine opens is
//! converted into an age interval relative to the query's execution time and
//! recorded in the shared [`AgeHistogram`]; selects then return nothing.

use crate::histogram::{AgeHistogram, AgeInterval};
use crate::promql::{
    LabelMatcher, Querier, Queryable, SelectHints, SeriesSet, StorageResult,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Storage that records how old the requested data is
#[derive(Debug, Clone)]
pub struct AgeCollectingStorage {
    histogram: Arc<AgeHistogram>,
    executed_at_ms: i64,
}

impl AgeCollectingStorage {
    /// Storage for one query that ran at `executed_at`
    pub fn new(histogram: Arc<AgeHistogram>, executed_at: DateTime<Utc>) -> Self {
        Self {
            histogram,
            executed_at_ms: executed_at.timestamp_millis(),
        }
    }

    /// Age interval covered by an absolute `[mint, maxt]` window
    pub fn interval_for(&self, mint: i64, maxt: i64) -> AgeInterval {
        AgeInterval::from_millis(
            self.executed_at_ms.saturating_sub(maxt),
            self.executed_at_ms.saturating_sub(mint),
        )
    }
}

impl Queryable for AgeCollectingStorage {
    fn querier<'a>(&'a self, mint: i64, maxt: i64) -> StorageResult<Box<dyn Querier + 'a>> {
        self.histogram.record(self.interval_for(mint, maxt));
        Ok(Box::new(EmptyQuerier))
    }
}

/// Session that never returns data
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyQuerier;

impl Querier for EmptyQuerier {
    fn select(&self, _sort_series: bool, _hints: &SelectHints, _matchers: &[LabelMatcher]) -> StorageResult<SeriesSet> {
        Ok(SeriesSet::new())
    }

    fn label_values(&self, _name: &str, _matchers: &[LabelMatcher]) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn label_names(&self, _matchers: &[LabelMatcher]) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
