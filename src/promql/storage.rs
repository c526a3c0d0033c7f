//! Storage capability consumed by the engine
//!
//! The engine never reads data directly. For every selector in a query it
//! opens a [`Querier`] over the absolute time window that selector needs and
//! asks it for matching series:
//!
//! ```text
//! Engine ── querier(mint, maxt) ──▶ Queryable
//!        ◀── Box<dyn Querier> ─────
//!        ── select(hints, matchers) ─▶ Querier ── SeriesSet
//!        ── close() ───────────────▶ Querier
//! ```

use super::labels::LabelMatcher;
use super::value::Series;
use thiserror::Error;

/// Series returned by a select
pub type SeriesSet = Vec<Series>;

/// Storage layer error surfaced through the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StorageError(String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Extra information handed to a select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectHints {
    /// Start of the window in Unix milliseconds
    pub start: i64,
    /// End of the window in Unix milliseconds
    pub end: i64,
    /// Query resolution step in milliseconds (0 for instant queries)
    pub step: i64,
    /// Range of the enclosing range selector in milliseconds (0 for instant selectors)
    pub range: i64,
}

/// Something that can open read sessions over a time window
pub trait Queryable: Send + Sync {
    /// Open a session covering `[mint, maxt]`, both Unix milliseconds
    fn querier<'a>(&'a self, mint: i64, maxt: i64) -> StorageResult<Box<dyn Querier + 'a>>;
}

/// A read session over one time window
pub trait Querier: Send + Sync {
    /// Return all series matching every matcher
    fn select(
        &self,
        sort_series: bool,
        hints: &SelectHints,
        matchers: &[LabelMatcher],
    ) -> StorageResult<SeriesSet>;

    /// Values of one label across the matching series
    fn label_values(&self, name: &str, matchers: &[LabelMatcher]) -> StorageResult<Vec<String>>;

    /// Label names across the matching series
    fn label_names(&self, matchers: &[LabelMatcher]) -> StorageResult<Vec<String>>;

    /// Release the session
    fn close(&mut self) -> StorageResult<()>;
}
