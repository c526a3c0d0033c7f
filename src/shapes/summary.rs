//! Shape frequency summary
//!
//! Reads a details CSV and counts range and instant queries per cleaned query.

use super::error::{ShapeError, ShapeResult};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Query counts of one shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeCount {
    pub range: u64,
    pub instant: u64,
}

/// Count queries per cleaned query, sorted by cleaned query
pub fn summarize<R: Read>(reader: R) -> ShapeResult<BTreeMap<String, ShapeCount>> {
    let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut summaries: BTreeMap<String, ShapeCount> = BTreeMap::new();

    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        let (Some(query_type), Some(cleaned)) = (row.get(2), row.get(3)) else {
            // +2: one-based, after the header
            return Err(ShapeError::ShortRow(index + 2));
        };

        let entry = summaries.entry(cleaned.to_string()).or_default();
        match query_type {
            "range" => entry.range += 1,
            "instant" => entry.instant += 1,
            other => return Err(ShapeError::UnknownQueryType(other.to_string())),
        }
    }

    Ok(summaries)
}

/// Write the summary CSV
pub fn write_summary<W: Write>(summaries: &BTreeMap<String, ShapeCount>, writer: W) -> ShapeResult<()> {
    let mut w = csv::Writer::from_writer(writer);

    w.write_record(["Cleaned query", "Range queries", "Instant queries"])?;
    for (query, count) in summaries {
        w.write_record([query.clone(), count.range.to_string(), count.instant.to_string()])?;
    }

    w.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILS: &str = "\
Timestamp,Original query,Query type,Cleaned query
2024-05-01T12:00:00Z,up,instant,metric
2024-05-01T12:00:01Z,rate(x[5m]),range,rate(metric[1m])
2024-05-01T12:00:02Z,process_up,range,metric
2024-05-01T12:00:03Z,\"a / on (b) c\",instant,metric / on (labels) metric
";

    #[test]
    fn test_summarize_counts_by_type() {
        let summaries = summarize(DETAILS.as_bytes()).unwrap();

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries["metric"], ShapeCount { range: 1, instant: 1 });
        assert_eq!(summaries["rate(metric[1m])"], ShapeCount { range: 1, instant: 0 });
    }

    #[test]
    fn test_summary_is_sorted() {
        let summaries = summarize(DETAILS.as_bytes()).unwrap();
        let mut out = Vec::new();
        write_summary(&summaries, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Cleaned query,Range queries,Instant queries\n\
             metric,1,1\n\
             metric / on (labels) metric,0,1\n\
             rate(metric[1m]),1,0\n"
        );
    }

    #[test]
    fn test_unknown_query_type() {
        let input = "Timestamp,Original query,Query type,Cleaned query\nx,up,series,metric\n";
        let err = summarize(input.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown query type 'series'");
    }

    #[test]
    fn test_header_only() {
        let input = "Timestamp,Original query,Query type,Cleaned query\n";
        assert!(summarize(input.as_bytes()).unwrap().is_empty());
    }
}
