//! PromQL Engine
//!
//! A self-contained PromQL parser and evaluator that reads its data through
//! the [`Queryable`]/[`Querier`] storage capability:
//!
//! - **parser**: nom-based parser producing an [`Expr`] tree
//! - **check**: static type rules
//! - **engine**: instant and range queries, session management
//! - **eval**: step-wise evaluation of functions, aggregations and operators
//!
//! # Example
//!
//! ```rust,ignore
//! use agescope::promql::{Engine, EngineOpts};
//!
//! let engine = Engine::new(EngineOpts::default());
//! let mut query = engine.new_instant_query(&storage, "sum(rate(http_requests_total[5m]))", now)?;
//! let value = query.exec()?;
//! ```

mod aggregate;
pub mod ast;
mod binary;
mod check;
pub mod duration;
mod engine;
mod error;
mod eval;
mod functions;
pub mod labels;
mod parser;
pub mod storage;
pub mod value;

pub use ast::{Expr, ValueType};
pub use duration::{format_duration, parse_duration};
pub use engine::{Engine, EngineOpts, Query, MAX_POINTS_PER_SERIES};
pub use error::{PromqlError, PromqlResult};
pub use functions::{get_function, Function};
pub use labels::{LabelMatcher, Labels, MatchOp, METRIC_NAME};
pub use parser::parse_expr;
pub use storage::{Querier, Queryable, SelectHints, SeriesSet, StorageError, StorageResult};
pub use value::{Point, Sample, Series, Value};
