//! Replay error types

use crate::promql::PromqlError;
use thiserror::Error;

/// Errors raised while replaying one query
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The engine rejected or failed to evaluate the query
    #[error("Evaluation of {query:?} failed: {source}")]
    Evaluation {
        query: String,
        #[source]
        source: PromqlError,
    },
}

impl ReplayError {
    /// Text of the query that failed
    pub fn query(&self) -> &str {
        match self {
            Self::Evaluation { query, .. } => query,
        }
    }
}

/// Result type alias for replay operations
pub type ReplayResult<T> = Result<T, ReplayError>;
