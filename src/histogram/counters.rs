//! Concurrent age histogram
//!
//! One `AtomicU64` per configured bucket plus two corpus-wide totals. Every
//! increment is a single relaxed `fetch_add`, so any number of replays can
//! report into the same histogram without a lock.

use super::bucket::{hourly_buckets, tiered_buckets, AgeBucket};
use super::error::{HistogramError, HistogramResult};
use super::interval::AgeInterval;
use chrono::Duration;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Histogram of data-selection ages
#[derive(Debug)]
pub struct AgeHistogram {
    buckets: Vec<AgeBucket>,
    counts: Vec<AtomicU64>,
    query_count: AtomicU64,
    selection_count: AtomicU64,
}

impl AgeHistogram {
    /// Create a histogram over an ordered bucket configuration.
    ///
    /// Buckets may overlap and may leave gaps, but each one must be
    /// well-formed and only the last may be open-ended.
    pub fn new(buckets: Vec<AgeBucket>) -> HistogramResult<Self> {
        validate(&buckets)?;

        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();

        Ok(Self {
            buckets,
            counts,
            query_count: AtomicU64::new(0),
            selection_count: AtomicU64::new(0),
        })
    }

    /// Histogram with `count` uniform one-hour buckets
    pub fn hourly(count: usize) -> HistogramResult<Self> {
        Self::new(hourly_buckets(count))
    }

    /// Histogram with the recent/warm/daily tiered layout out to `days` days
    pub fn tiered(days: usize) -> HistogramResult<Self> {
        Self::new(tiered_buckets(days))
    }

    /// Configured buckets, in configuration order
    pub fn buckets(&self) -> &[AgeBucket] {
        &self.buckets
    }

    /// Record one data-selection request reaching from `younger` to `older`.
    ///
    /// # Panics
    ///
    /// Panics if `younger > older`. No counter is touched in that case.
    pub fn increment_for_interval(&self, younger: Duration, older: Duration) {
        self.record(AgeInterval::new(younger, older));
    }

    /// Record an already-built interval.
    ///
    /// Every bucket overlapping the past part of the interval is incremented
    /// exactly once. The selection total is incremented even when no bucket is.
    pub fn record(&self, interval: AgeInterval) {
        self.selection_count.fetch_add(1, Ordering::Relaxed);

        let Some((younger_ms, older_ms)) = interval.past() else {
            return;
        };

        for (bucket, count) in self.buckets.iter().zip(&self.counts) {
            if bucket.intersects(younger_ms, older_ms) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record that one query was replayed
    pub fn increment_query_count(&self) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Total queries replayed so far
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Total data-selection requests observed so far
    pub fn selection_count(&self) -> u64 {
        self.selection_count.load(Ordering::Relaxed)
    }

    /// Point-in-time read of every counter
    pub fn snapshot(&self) -> HistogramSnapshot {
        let buckets = self
            .buckets
            .iter()
            .zip(&self.counts)
            .map(|(bucket, count)| BucketCount {
                bucket: *bucket,
                count: count.load(Ordering::Relaxed),
            })
            .collect();

        HistogramSnapshot {
            buckets,
            total_selections: self.selection_count(),
            total_queries: self.query_count(),
        }
    }
}

fn validate(buckets: &[AgeBucket]) -> HistogramResult<()> {
    if buckets.is_empty() {
        return Err(HistogramError::NoBuckets);
    }

    let last = buckets.len() - 1;

    for (index, bucket) in buckets.iter().enumerate() {
        if bucket.start_ms < 0 {
            return Err(HistogramError::NegativeStart { index });
        }

        match bucket.end_ms {
            Some(end) if end <= bucket.start_ms => {
                return Err(HistogramError::EmptyBucket { index });
            }
            None if index != last => {
                return Err(HistogramError::OpenBucketNotLast { index });
            }
            _ => {}
        }
    }

    Ok(())
}

/// One bucket and its count at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    #[serde(flatten)]
    pub bucket: AgeBucket,
    pub count: u64,
}

/// Counters read out of an [`AgeHistogram`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramSnapshot {
    /// Buckets in configuration order
    pub buckets: Vec<BucketCount>,
    /// Data-selection requests observed
    pub total_selections: u64,
    /// Queries replayed
    pub total_queries: u64,
}

impl HistogramSnapshot {
    /// Count of the first bucket starting at `start`
    pub fn count_at(&self, start: Duration) -> Option<u64> {
        let start_ms = start.num_milliseconds();
        self.buckets
            .iter()
            .find(|b| b.bucket.start_ms == start_ms)
            .map(|b| b.count)
    }

    /// Buckets with a non-zero count
    pub fn non_zero(&self) -> impl Iterator<Item = &BucketCount> {
        self.buckets.iter().filter(|b| b.count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Non-zero counts keyed by bucket start in hours
    fn non_zero_hours(histogram: &AgeHistogram) -> BTreeMap<i64, u64> {
        histogram
            .snapshot()
            .non_zero()
            .map(|b| (b.bucket.start().num_hours(), b.count))
            .collect()
    }

    fn expected(pairs: &[(i64, u64)]) -> BTreeMap<i64, u64> {
        pairs.iter().copied().collect()
    }

    fn h(hours: i64) -> Duration {
        Duration::hours(hours)
    }

    #[test]
    fn test_hourly_overlapping_requests() {
        let histogram = AgeHistogram::hourly(396).unwrap();

        histogram.increment_for_interval(Duration::zero(), h(2));
        histogram.increment_for_interval(h(1), h(2));

        assert_eq!(non_zero_hours(&histogram), expected(&[(0, 1), (1, 2)]));
        assert_eq!(histogram.selection_count(), 2);
    }

    #[test]
    fn test_partial_overlap_counts_once() {
        let histogram = AgeHistogram::hourly(10).unwrap();

        histogram.increment_for_interval(Duration::minutes(30), Duration::minutes(150));

        assert_eq!(non_zero_hours(&histogram), expected(&[(0, 1), (1, 1), (2, 1)]));
    }

    #[test]
    fn test_tiered_sequence() {
        let histogram = AgeHistogram::tiered(365).unwrap();

        // Future range
        histogram.increment_for_interval(h(-1), Duration::minutes(-10));
        assert_eq!(non_zero_hours(&histogram), expected(&[]));

        // Before the 12h cutoff
        histogram.increment_for_interval(Duration::zero(), h(11));
        assert_eq!(non_zero_hours(&histogram), expected(&[(0, 1)]));

        // Across the 12h cutoff
        histogram.increment_for_interval(h(1), h(14));
        assert_eq!(non_zero_hours(&histogram), expected(&[(0, 2), (12, 1)]));

        histogram.increment_for_interval(h(1), h(49));
        assert_eq!(
            non_zero_hours(&histogram),
            expected(&[(0, 3), (12, 2), (24, 1), (48, 1)])
        );

        // Inside the overlap of the recent and warm tiers
        histogram.increment_for_interval(h(12), h(13));
        assert_eq!(
            non_zero_hours(&histogram),
            expected(&[(0, 4), (12, 3), (24, 1), (48, 1)])
        );

        histogram.increment_for_interval(h(27), h(49));
        assert_eq!(
            non_zero_hours(&histogram),
            expected(&[(0, 4), (12, 3), (24, 2), (48, 2)])
        );

        // Inside a single daily bucket
        histogram.increment_for_interval(h(25), h(26));
        assert_eq!(
            non_zero_hours(&histogram),
            expected(&[(0, 4), (12, 3), (24, 3), (48, 2)])
        );

        assert_eq!(histogram.selection_count(), 7);
    }

    #[test]
    fn test_beyond_horizon_is_truncated() {
        let histogram = AgeHistogram::tiered(365).unwrap();

        histogram.increment_for_interval(Duration::days(360), Duration::days(370));

        let days: Vec<i64> = histogram
            .snapshot()
            .non_zero()
            .map(|b| b.bucket.start().num_days())
            .collect();
        assert_eq!(days, vec![360, 361, 362, 363, 364]);

        histogram.increment_for_interval(Duration::days(400), Duration::days(410));
        assert_eq!(histogram.snapshot().non_zero().count(), 5);
        assert_eq!(histogram.selection_count(), 2);
    }

    #[test]
    fn test_future_request_counts_selection_only() {
        let histogram = AgeHistogram::hourly(24).unwrap();

        histogram.increment_for_interval(h(-3), h(-1));
        histogram.increment_for_interval(h(-3), Duration::zero());

        assert_eq!(histogram.snapshot().non_zero().count(), 0);
        assert_eq!(histogram.selection_count(), 2);
    }

    #[test]
    fn test_request_straddling_execution_time() {
        let histogram = AgeHistogram::hourly(24).unwrap();

        histogram.increment_for_interval(Duration::minutes(-5), Duration::minutes(30));

        assert_eq!(non_zero_hours(&histogram), expected(&[(0, 1)]));
    }

    #[test]
    fn test_inverted_interval_leaves_counters_untouched() {
        let histogram = AgeHistogram::hourly(24).unwrap();

        let result = std::panic::catch_unwind(|| {
            histogram.increment_for_interval(h(5), h(2));
        });

        assert!(result.is_err());
        assert_eq!(histogram.selection_count(), 0);
        assert_eq!(histogram.snapshot().non_zero().count(), 0);
    }

    #[test]
    fn test_replaying_sequence_doubles_counts() {
        let calls = [(0, 2), (1, 5), (3, 4), (-2, 1), (20, 30)];
        let histogram = AgeHistogram::hourly(24).unwrap();

        for (younger, older) in calls {
            histogram.increment_for_interval(h(younger), h(older));
        }
        let once = histogram.snapshot();

        for (younger, older) in calls {
            histogram.increment_for_interval(h(younger), h(older));
        }
        let twice = histogram.snapshot();

        assert_eq!(twice.total_selections, once.total_selections * 2);
        for (a, b) in once.buckets.iter().zip(&twice.buckets) {
            assert_eq!(b.count, a.count * 2);
        }
    }

    #[test]
    fn test_open_last_bucket_catches_overflow() {
        let buckets = vec![
            AgeBucket::new(Duration::zero(), h(13)),
            AgeBucket::new(h(12), h(24)),
            AgeBucket::open(h(24)),
        ];
        let histogram = AgeHistogram::new(buckets).unwrap();

        histogram.increment_for_interval(Duration::days(500), Duration::days(501));

        assert_eq!(non_zero_hours(&histogram), expected(&[(24, 1)]));
    }

    #[test]
    fn test_query_count_is_independent() {
        let histogram = AgeHistogram::hourly(1).unwrap();
        histogram.increment_query_count();
        histogram.increment_query_count();

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.total_queries, 2);
        assert_eq!(snapshot.total_selections, 0);
    }

    #[test]
    fn test_rejects_malformed_configurations() {
        assert_eq!(AgeHistogram::new(vec![]).unwrap_err(), HistogramError::NoBuckets);

        let err = AgeHistogram::new(vec![AgeBucket::new(h(-1), h(1))]).unwrap_err();
        assert_eq!(err, HistogramError::NegativeStart { index: 0 });

        let err = AgeHistogram::new(vec![
            AgeBucket::new(Duration::zero(), h(1)),
            AgeBucket::new(h(2), h(2)),
        ])
        .unwrap_err();
        assert_eq!(err, HistogramError::EmptyBucket { index: 1 });

        let err = AgeHistogram::new(vec![
            AgeBucket::open(Duration::zero()),
            AgeBucket::new(h(2), h(3)),
        ])
        .unwrap_err();
        assert_eq!(err, HistogramError::OpenBucketNotLast { index: 0 });
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let histogram = Arc::new(AgeHistogram::tiered(30).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let histogram = Arc::clone(&histogram);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        histogram.increment_query_count();
                        histogram.increment_for_interval(h(1), h(14));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.total_queries, 8000);
        assert_eq!(snapshot.total_selections, 8000);
        assert_eq!(snapshot.count_at(Duration::zero()), Some(8000));
        assert_eq!(snapshot.count_at(h(12)), Some(8000));
        assert_eq!(snapshot.count_at(h(24)), Some(0));
    }
}
