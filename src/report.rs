//! Histogram Reports
//!
//! Renders a [`HistogramSnapshot`] for humans and tools:
//!
//! - **CSV**: `Range,Select count` rows labelled like `0d12h-1d0h`, followed by
//!   `Total selects` and `Total queries`
//! - **JSON**: the snapshot itself, each bucket carrying its label

use crate::histogram::{AgeBucket, HistogramSnapshot};
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Errors raised while writing a report
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for report writing
pub type ReportResult<T> = Result<T, ReportError>;

/// Output format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

/// Format an age as days and hours, e.g. `1d12h`
///
/// Minutes and seconds are appended only when the age is not a whole hour.
pub fn format_age(ms: i64) -> String {
    let days = ms.div_euclid(DAY_MS);
    let rest = ms.rem_euclid(DAY_MS);
    let hours = rest / HOUR_MS;
    let minutes = (rest % HOUR_MS) / MINUTE_MS;
    let seconds = (rest % MINUTE_MS) / 1000;

    let mut out = format!("{}d{}h", days, hours);
    if minutes != 0 || seconds != 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds != 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

/// `start-end` label of a bucket, with `inf` for an open end
pub fn bucket_label(bucket: &AgeBucket) -> String {
    match bucket.end_ms {
        Some(end) => format!("{}-{}", format_age(bucket.start_ms), format_age(end)),
        None => format!("{}-inf", format_age(bucket.start_ms)),
    }
}

/// Write the CSV report
pub fn write_csv<W: Write>(snapshot: &HistogramSnapshot, writer: W) -> ReportResult<()> {
    let mut w = csv::Writer::from_writer(writer);

    w.write_record(["Range", "Select count"])?;
    for entry in &snapshot.buckets {
        w.write_record([bucket_label(&entry.bucket), entry.count.to_string()])?;
    }
    w.write_record(["Total selects".to_string(), snapshot.total_selections.to_string()])?;
    w.write_record(["Total queries".to_string(), snapshot.total_queries.to_string()])?;

    w.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct LabelledBucket<'a> {
    label: String,
    #[serde(flatten)]
    entry: &'a crate::histogram::BucketCount,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    buckets: Vec<LabelledBucket<'a>>,
    total_selections: u64,
    total_queries: u64,
}

/// Write the JSON report
pub fn write_json<W: Write>(snapshot: &HistogramSnapshot, mut writer: W) -> ReportResult<()> {
    let report = JsonReport {
        buckets: snapshot
            .buckets
            .iter()
            .map(|entry| LabelledBucket {
                label: bucket_label(&entry.bucket),
                entry,
            })
            .collect(),
        total_selections: snapshot.total_selections,
        total_queries: snapshot.total_queries,
    };

    serde_json::to_writer_pretty(&mut writer, &report)?;
    writeln!(writer)?;
    Ok(())
}

/// Write a report in `format`
pub fn write_report<W: Write>(
    snapshot: &HistogramSnapshot,
    format: ReportFormat,
    writer: W,
) -> ReportResult<()> {
    match format {
        ReportFormat::Csv => write_csv(snapshot, writer),
        ReportFormat::Json => write_json(snapshot, writer),
    }
}
