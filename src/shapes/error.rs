//! Query shape errors

use crate::logline::DecodeError;
use crate::promql::PromqlError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the shape tools
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: parsing log line failed: {source}", path.display())]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: DecodeError,
    },

    /// A logged query is not valid PromQL
    #[error("{}:{line}: could not parse query {query:?}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        query: String,
        #[source]
        source: PromqlError,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A details row whose query type is neither `range` nor `instant`
    #[error("Unknown query type '{0}'")]
    UnknownQueryType(String),

    /// A details row with fewer than four fields
    #[error("Details row {0} has too few fields")]
    ShortRow(usize),
}

/// Result type alias for the shape tools
pub type ShapeResult<T> = Result<T, ShapeError>;
