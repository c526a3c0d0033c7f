//! Query Log Decoding
//!
//! Turns query-frontend log lines into [`QueryDescriptor`](crate::profiler::QueryDescriptor)s:
//!
//! - **logfmt**: the `key=value` record parser
//! - **decode**: field extraction, time and step parsing
//! - **error**: decoding failures

pub mod decode;
pub mod error;
pub mod logfmt;

pub use decode::{decode_line, parse_step, parse_time, INSTANT_QUERY_PATH, RANGE_QUERY_PATH};
pub use error::{DecodeError, DecodeResult};
