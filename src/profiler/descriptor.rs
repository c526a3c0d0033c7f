//! Query descriptors
//!
//! A [`QueryDescriptor`] is everything needed to replay one logged query:
//! when it ran, what it asked, and how it was evaluated.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// How a query was evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Evaluation {
    /// Evaluated once at `time`
    Instant { time: DateTime<Utc> },
    /// Evaluated at every `step` from `start` through `end`
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[serde(serialize_with = "serialize_step")]
        step: Duration,
    },
}

fn serialize_step<S: serde::Serializer>(step: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(step.num_milliseconds())
}

impl Evaluation {
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range { .. })
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instant { .. } => write!(f, "instant"),
            Self::Range { .. } => write!(f, "range"),
        }
    }
}

/// One logged query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryDescriptor {
    /// When the query actually ran
    pub executed_at: DateTime<Utc>,
    /// PromQL text
    pub query: String,
    pub evaluation: Evaluation,
}

impl QueryDescriptor {
    /// Instant query evaluated at `time`
    pub fn instant(executed_at: DateTime<Utc>, query: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            executed_at,
            query: query.into(),
            evaluation: Evaluation::Instant { time },
        }
    }

    /// Range query over `[start, end]`
    pub fn range(
        executed_at: DateTime<Utc>,
        query: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Self {
        Self {
            executed_at,
            query: query.into(),
            evaluation: Evaluation::Range { start, end, step },
        }
    }
}
