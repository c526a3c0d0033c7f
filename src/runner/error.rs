//! Run errors
//!
//! Everything here aborts the whole run. Individual query failures are not
//! errors at this level; they are collected in the run summary.

use crate::logline::DecodeError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors of a profiling run
#[derive(Error, Debug)]
pub enum ProfileError {
    /// A log file could not be opened or read
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A log line could not be decoded
    #[error("{}:{line}: parsing log line failed: {source}", path.display())]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: DecodeError,
    },

    /// A replay panicked, which only happens on a broken evaluator invariant
    #[error("Replay panicked: {0}")]
    ReplayPanicked(String),

    /// The replay pool shut down while work was still queued
    #[error("Replay pool closed")]
    PoolClosed,
}

/// Result type alias for runs
pub type ProfileResult<T> = Result<T, ProfileError>;
