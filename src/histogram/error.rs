//! Histogram error types
//!
//! Only bucket configuration can fail. Interval contract violations are bugs
//! and panic instead of returning an error.

use thiserror::Error;

/// Errors raised while building an [`AgeHistogram`](super::AgeHistogram)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistogramError {
    /// No buckets were configured
    #[error("Bucket configuration is empty")]
    NoBuckets,

    /// A bucket starts before age zero
    #[error("Bucket {index} starts at a negative age")]
    NegativeStart { index: usize },

    /// A bounded bucket whose end does not lie after its start
    #[error("Bucket {index} is empty: end must be after start")]
    EmptyBucket { index: usize },

    /// Only the final bucket may be open-ended
    #[error("Bucket {index} is open-ended but is not the last bucket")]
    OpenBucketNotLast { index: usize },
}

/// Result type alias for histogram construction
pub type HistogramResult<T> = Result<T, HistogramError>;
