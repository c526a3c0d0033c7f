//! Age buckets and the reference bucket layouts
//!
//! A bucket is a half-open age window `[start, end)` measured backward from a
//! query's execution time. Ages are kept in milliseconds, the resolution PromQL
//! timestamps use.

use chrono::Duration;
use serde::{Deserialize, Serialize};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Upper edge of the "recent" tier in the tiered layout, in milliseconds
pub const RECENT_TIER_END_MS: i64 = 13 * HOUR_MS;

/// Lower edge of the "warm" tier in the tiered layout, in milliseconds
pub const WARM_TIER_START_MS: i64 = 12 * HOUR_MS;

/// Default number of one-hour buckets (16.5 days)
pub const DEFAULT_HOURLY_BUCKETS: usize = 396;

/// Default horizon of the tiered layout in days (13 months)
pub const DEFAULT_TIERED_DAYS: usize = 395;

/// A configured age window with one counter in the histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeBucket {
    /// Youngest age covered, in milliseconds
    pub start_ms: i64,
    /// First age no longer covered, in milliseconds. `None` means unbounded.
    pub end_ms: Option<i64>,
}

impl AgeBucket {
    /// Create a bounded bucket covering `[start, end)`
    pub fn new(start: Duration, end: Duration) -> Self {
        Self {
            start_ms: start.num_milliseconds(),
            end_ms: Some(end.num_milliseconds()),
        }
    }

    /// Create an open-ended bucket covering `[start, +inf)`
    pub fn open(start: Duration) -> Self {
        Self {
            start_ms: start.num_milliseconds(),
            end_ms: None,
        }
    }

    /// Youngest age covered by this bucket
    pub fn start(&self) -> Duration {
        Duration::milliseconds(self.start_ms)
    }

    /// Oldest age bound, or `None` when the bucket is open-ended
    pub fn end(&self) -> Option<Duration> {
        self.end_ms.map(Duration::milliseconds)
    }

    /// Whether the bucket has no upper bound
    pub fn is_open(&self) -> bool {
        self.end_ms.is_none()
    }

    /// Half-open intersection test against `[younger_ms, older_ms)`
    pub fn intersects(&self, younger_ms: i64, older_ms: i64) -> bool {
        if younger_ms >= older_ms {
            return false;
        }

        let before_end = match self.end_ms {
            Some(end) => younger_ms < end,
            None => true,
        };

        before_end && self.start_ms < older_ms
    }
}

impl std::fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end_ms {
            Some(end) => write!(f, "[{}ms, {}ms)", self.start_ms, end),
            None => write!(f, "[{}ms, inf)", self.start_ms),
        }
    }
}

/// Uniform one-hour buckets from age zero up to `count` hours
pub fn hourly_buckets(count: usize) -> Vec<AgeBucket> {
    (0..count as i64)
        .map(|i| AgeBucket {
            start_ms: i * HOUR_MS,
            end_ms: Some((i + 1) * HOUR_MS),
        })
        .collect()
}

/// Tiered buckets: `[0, 13h)` for the recent tier, `[12h, 24h)` for the warm
/// boundary, then one bucket per day until `days` days.
pub fn tiered_buckets(days: usize) -> Vec<AgeBucket> {
    let mut buckets = vec![
        AgeBucket {
            start_ms: 0,
            end_ms: Some(RECENT_TIER_END_MS),
        },
        AgeBucket {
            start_ms: WARM_TIER_START_MS,
            end_ms: Some(DAY_MS),
        },
    ];

    buckets.extend((1..days as i64).map(|day| AgeBucket {
        start_ms: day * DAY_MS,
        end_ms: Some((day + 1) * DAY_MS),
    }));

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects_partial_overlap() {
        let bucket = AgeBucket::new(Duration::hours(1), Duration::hours(2));

        assert!(bucket.intersects(0, HOUR_MS + 1));
        assert!(bucket.intersects(2 * HOUR_MS - 1, 3 * HOUR_MS));
        assert!(bucket.intersects(0, 10 * HOUR_MS));
    }

    #[test]
    fn test_intersects_is_half_open() {
        let bucket = AgeBucket::new(Duration::hours(1), Duration::hours(2));

        // Touching the start from below does not overlap
        assert!(!bucket.intersects(0, HOUR_MS));
        // Starting exactly at the end does not overlap
        assert!(!bucket.intersects(2 * HOUR_MS, 3 * HOUR_MS));
        // Empty request interval overlaps nothing
        assert!(!bucket.intersects(HOUR_MS + 5, HOUR_MS + 5));
    }

    #[test]
    fn test_open_bucket() {
        let bucket = AgeBucket::open(Duration::days(30));

        assert!(bucket.is_open());
        assert!(bucket.intersects(100 * DAY_MS, 200 * DAY_MS));
        assert!(!bucket.intersects(0, 30 * DAY_MS));
        assert_eq!(bucket.end(), None);
    }

    #[test]
    fn test_hourly_layout() {
        let buckets = hourly_buckets(DEFAULT_HOURLY_BUCKETS);

        assert_eq!(buckets.len(), 396);
        assert_eq!(buckets[0], AgeBucket::new(Duration::zero(), Duration::hours(1)));
        assert_eq!(buckets[395].start(), Duration::hours(395));
    }

    #[test]
    fn test_tiered_layout() {
        let buckets = tiered_buckets(DEFAULT_TIERED_DAYS);

        assert_eq!(buckets.len(), 396);
        assert_eq!(buckets[0], AgeBucket::new(Duration::zero(), Duration::hours(13)));
        assert_eq!(buckets[1], AgeBucket::new(Duration::hours(12), Duration::hours(24)));
        assert_eq!(buckets[2], AgeBucket::new(Duration::days(1), Duration::days(2)));
        assert_eq!(buckets[395].end(), Some(Duration::days(395)));
    }
}
