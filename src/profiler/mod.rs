//! Temporal Access Profiler
//!
//! Measures how far into the past each replayed query reaches:
//!
//! - **descriptor**: one logged query and its evaluation mode
//! - **storage**: the synthetic storage recording every requested window
//! - **replay**: drives the engine for one descriptor
//! - **error**: replay failures
//!
//! # Example
//!
//! ```rust
//! use agescope::histogram::AgeHistogram;
//! use agescope::profiler::{QueryDescriptor, QueryReplayer};
//! use agescope::promql::EngineOpts;
//! use chrono::Utc;
//! use std::sync::Arc;
//!
//! let histogram = Arc::new(AgeHistogram::hourly(396).unwrap());
//! let replayer = QueryReplayer::new(EngineOpts::default(), Arc::clone(&histogram));
//!
//! let now = Utc::now();
//! replayer.replay(&QueryDescriptor::instant(now, "a / b", now)).unwrap();
//!
//! assert_eq!(histogram.snapshot().total_selections, 2);
//! ```

pub mod descriptor;
pub mod error;
pub mod replay;
pub mod storage;

pub use descriptor::{Evaluation, QueryDescriptor};
pub use error::{ReplayError, ReplayResult};
pub use replay::QueryReplayer;
pub use storage::{AgeCollectingStorage, EmptyQuerier};
