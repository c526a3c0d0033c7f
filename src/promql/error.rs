//! PromQL error types
//!
//! Defines all error conditions that can occur while parsing, checking and
//! evaluating a query.

use super::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum PromqlError {
    /// Query text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Query parsed but is not well-typed
    #[error("Type error: {0}")]
    Type(String),

    /// Query parameters (range, step) are invalid
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Evaluation failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// Evaluation exceeded the engine timeout
    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Evaluation exceeded the engine sample limit
    #[error("Query processing would load too many samples into memory (limit {0})")]
    TooManySamples(usize),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for query operations
pub type PromqlResult<T> = Result<T, PromqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PromqlError::Parse("unexpected input at position 3".to_string());
        assert_eq!(err.to_string(), "Parse error: unexpected input at position 3");

        let err: PromqlError = StorageError::new("disk on fire").into();
        assert!(matches!(err, PromqlError::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: disk on fire");
    }
}
