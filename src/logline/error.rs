//! Log line decoding errors

use thiserror::Error;

/// Errors raised while turning a raw log line into a query descriptor
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The line is not a JSON object with a string `line` field
    #[error("Invalid JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The `line` field is not well-formed logfmt
    #[error("Invalid logfmt record: {0}")]
    Logfmt(String),

    /// `ts` is not an RFC3339 timestamp
    #[error("Invalid log timestamp '{0}'")]
    InvalidTimestamp(String),

    /// A query time parameter could not be parsed
    #[error("Invalid query {field} '{value}'")]
    InvalidTime { field: &'static str, value: String },

    /// `param_step` could not be parsed
    #[error("Invalid query step '{0}'")]
    InvalidStep(String),

    #[error("No timestamp")]
    MissingTimestamp,

    #[error("No query")]
    MissingQuery,

    #[error("No query time for instant query")]
    MissingQueryTime,

    #[error("No query start time for range query")]
    MissingStart,

    #[error("No query end time for range query")]
    MissingEnd,

    #[error("No step for range query")]
    MissingStep,

    #[error("Range query starts after it ends")]
    StartAfterEnd,
}

/// Result type alias for decoding
pub type DecodeResult<T> = Result<T, DecodeError>;
