//! Query Shapes
//!
//! Groups logged queries by structure so the most common query forms can be
//! profiled separately:
//!
//! - **anonymize**: strips names, label values, literals and window sizes
//! - **details**: one CSV row per logged query
//! - **summary**: range/instant counts per shape

pub mod anonymize;
pub mod details;
mod error;
pub mod summary;

pub use anonymize::{anonymize, clean_query};
pub use details::{collect_shapes, write_details, ShapeRecord};
pub use error::{ShapeError, ShapeResult};
pub use summary::{summarize, write_summary, ShapeCount};
