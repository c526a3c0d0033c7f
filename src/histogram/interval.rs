//! Age intervals
//!
//! An [`AgeInterval`] is the age-relative form of one data-selection request:
//! how long before the query ran the youngest and oldest requested samples are.

use chrono::Duration;

/// A `[younger, older)` pair of ages, in milliseconds
///
/// Ages may be negative when a request reaches past the execution time of the
/// query (future-dated requests in synthetic logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeInterval {
    younger_ms: i64,
    older_ms: i64,
}

impl AgeInterval {
    /// Build an interval from two ages.
    ///
    /// # Panics
    ///
    /// Panics if `younger` is older than `older`. That can only happen when the
    /// evaluator hands out a selection window whose start lies after its end.
    pub fn new(younger: Duration, older: Duration) -> Self {
        Self::from_millis(younger.num_milliseconds(), older.num_milliseconds())
    }

    /// Millisecond variant of [`AgeInterval::new`]
    ///
    /// # Panics
    ///
    /// Panics if `younger_ms > older_ms`.
    pub fn from_millis(younger_ms: i64, older_ms: i64) -> Self {
        assert!(
            younger_ms <= older_ms,
            "younger age ({}ms) is older than older age ({}ms)",
            younger_ms,
            older_ms
        );

        Self {
            younger_ms,
            older_ms,
        }
    }

    /// Age of the most recent requested edge
    pub fn younger(&self) -> Duration {
        Duration::milliseconds(self.younger_ms)
    }

    /// Age of the oldest requested edge
    pub fn older(&self) -> Duration {
        Duration::milliseconds(self.older_ms)
    }

    pub fn younger_ms(&self) -> i64 {
        self.younger_ms
    }

    pub fn older_ms(&self) -> i64 {
        self.older_ms
    }

    /// Whether the whole request lies after the execution time
    pub fn is_future(&self) -> bool {
        self.older_ms <= 0
    }

    /// The part of the interval that lies in the past, i.e. with the younger
    /// edge clamped to age zero. `None` for future requests.
    pub fn past(&self) -> Option<(i64, i64)> {
        if self.is_future() {
            None
        } else {
            Some((self.younger_ms.max(0), self.older_ms))
        }
    }
}
