//! Per-query shape records
//!
//! Decodes query logs and writes one row per query:
//! `Timestamp,Original query,Query type,Cleaned query`.

use super::anonymize::clean_query;
use super::error::{ShapeError, ShapeResult};
use crate::logline::decode_line;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub const DETAILS_HEADER: [&str; 4] = ["Timestamp", "Original query", "Query type", "Cleaned query"];

/// One logged query and its anonymized shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeRecord {
    pub timestamp: DateTime<Utc>,
    pub original_query: String,
    /// `instant` or `range`
    pub query_type: String,
    pub cleaned_query: String,
}

/// Collect shape records from one log file, in file order
pub fn collect_shapes(path: &Path) -> ShapeResult<Vec<ShapeRecord>> {
    let io_error = |source| ShapeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let reader = BufReader::new(File::open(path).map_err(io_error)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error)?;
        let line_number = index + 1;

        if line.trim().is_empty() {
            continue;
        }

        let descriptor = match decode_line(&line) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => continue,
            Err(source) => {
                return Err(ShapeError::Decode {
                    path: path.to_path_buf(),
                    line: line_number,
                    source,
                })
            }
        };

        let cleaned_query = clean_query(&descriptor.query).map_err(|source| ShapeError::Parse {
            path: path.to_path_buf(),
            line: line_number,
            query: descriptor.query.clone(),
            source,
        })?;

        records.push(ShapeRecord {
            timestamp: descriptor.executed_at,
            query_type: descriptor.evaluation.to_string(),
            original_query: descriptor.query,
            cleaned_query,
        });
    }

    tracing::info!("Collected {} query shapes from {}", records.len(), path.display());
    Ok(records)
}

/// RFC3339 with as many fractional digits as needed, e.g. `12:00:00.25Z`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    let full = ts.to_rfc3339_opts(SecondsFormat::Nanos, true);
    match full.strip_suffix('Z') {
        Some(body) if body.contains('.') => {
            format!("{}Z", body.trim_end_matches('0').trim_end_matches('.'))
        }
        _ => full,
    }
}

/// Write the details CSV
pub fn write_details<W: Write>(records: &[ShapeRecord], writer: W) -> ShapeResult<()> {
    let mut w = csv::Writer::from_writer(writer);

    w.write_record(DETAILS_HEADER)?;
    for record in records {
        w.write_record([
            format_timestamp(&record.timestamp).as_str(),
            record.original_query.as_str(),
            record.query_type.as_str(),
            record.cleaned_query.as_str(),
        ])?;
    }

    w.flush().map_err(csv::Error::from)?;
    Ok(())
}
