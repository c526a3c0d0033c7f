//! Age Histogram
//!
//! Counts how old the data touched by each data-selection request was,
//! relative to the moment the query ran:
//!
//! - **bucket**: configured age windows and the hourly/tiered layouts
//! - **interval**: the `[younger, older)` age pair of one request
//! - **counters**: the lock-free histogram and its snapshot
//! - **error**: bucket configuration errors
//!
//! # Example
//!
//! ```rust
//! use agescope::histogram::AgeHistogram;
//! use chrono::Duration;
//!
//! let histogram = AgeHistogram::hourly(396).unwrap();
//! histogram.increment_for_interval(Duration::zero(), Duration::hours(2));
//! histogram.increment_for_interval(Duration::hours(1), Duration::hours(2));
//!
//! let snapshot = histogram.snapshot();
//! assert_eq!(snapshot.count_at(Duration::zero()), Some(1));
//! assert_eq!(snapshot.count_at(Duration::hours(1)), Some(2));
//! ```

pub mod bucket;
pub mod counters;
pub mod error;
pub mod interval;

pub use bucket::{
    hourly_buckets, tiered_buckets, AgeBucket, DEFAULT_HOURLY_BUCKETS, DEFAULT_TIERED_DAYS,
};
pub use counters::{AgeHistogram, BucketCount, HistogramSnapshot};
pub use error::{HistogramError, HistogramResult};
pub use interval::AgeInterval;
