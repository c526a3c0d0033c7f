//! Query log line decoding
//!
//! Each line of a query log is a JSON object whose `line` field carries a
//! logfmt record written by the query frontend, e.g.
//!
//! ```text
//! {"line": "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query param_query=up param_time=1714564800"}
//! ```

use super::error::{DecodeError, DecodeResult};
use super::logfmt::parse_record;
use crate::profiler::QueryDescriptor;
use crate::promql::parse_duration;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

/// Path of instant query requests
pub const INSTANT_QUERY_PATH: &str = "/prometheus/api/v1/query";

/// Path of range query requests
pub const RANGE_QUERY_PATH: &str = "/prometheus/api/v1/query_range";

/// How Prometheus prints its minimum timestamp for open-ended ranges
pub const MIN_TIME_FORMATTED: &str = "-292273086-05-16T16:47:06Z";

/// How Prometheus prints its maximum timestamp for open-ended ranges
pub const MAX_TIME_FORMATTED: &str = "292277026596-12-04T15:30:07.999999999Z";

#[derive(Debug, Deserialize)]
struct Envelope {
    line: String,
}

/// Raw logfmt fields of interest; later keys win
#[derive(Debug, Default)]
struct RawFields {
    ts: Option<String>,
    query: Option<String>,
    path: Option<String>,
    time: Option<String>,
    start: Option<String>,
    end: Option<String>,
    step: Option<String>,
}

impl RawFields {
    fn collect(pairs: Vec<(String, String)>) -> Self {
        let mut fields = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "ts" => &mut fields.ts,
                "param_query" => &mut fields.query,
                "path" => &mut fields.path,
                "param_time" => &mut fields.time,
                "param_start" => &mut fields.start,
                "param_end" => &mut fields.end,
                "param_step" => &mut fields.step,
                _ => continue,
            };
            *slot = Some(value);
        }
        fields
    }
}

/// Decode one log line.
///
/// Returns `Ok(None)` for requests to paths other than the instant and range
/// query endpoints. A record without a `path` is treated as an instant query.
pub fn decode_line(line: &str) -> DecodeResult<Option<QueryDescriptor>> {
    let envelope: Envelope = serde_json::from_str(line)?;
    let fields = RawFields::collect(parse_record(&envelope.line).map_err(DecodeError::Logfmt)?);

    let is_range = match fields.path.as_deref() {
        None | Some(INSTANT_QUERY_PATH) => false,
        Some(RANGE_QUERY_PATH) => true,
        Some(_) => return Ok(None),
    };

    let executed_at = match fields.ts {
        Some(ts) => DateTime::parse_from_rfc3339(&ts)
            .map_err(|_| DecodeError::InvalidTimestamp(ts.clone()))?
            .with_timezone(&Utc),
        None => return Err(DecodeError::MissingTimestamp),
    };

    let query = match fields.query {
        Some(query) if !query.is_empty() => query,
        _ => return Err(DecodeError::MissingQuery),
    };

    if !is_range {
        let time = required_time(fields.time, "time", DecodeError::MissingQueryTime)?;
        return Ok(Some(QueryDescriptor::instant(executed_at, query, time)));
    }

    let start = required_time(fields.start, "start time", DecodeError::MissingStart)?;
    let end = required_time(fields.end, "end time", DecodeError::MissingEnd)?;

    let step = match fields.step {
        Some(raw) => parse_step(&raw).ok_or(DecodeError::InvalidStep(raw))?,
        None => return Err(DecodeError::MissingStep),
    };
    if step.is_zero() {
        return Err(DecodeError::MissingStep);
    }

    if start > end {
        return Err(DecodeError::StartAfterEnd);
    }

    Ok(Some(QueryDescriptor::range(executed_at, query, start, end, step)))
}

fn required_time(
    raw: Option<String>,
    field: &'static str,
    missing: DecodeError,
) -> DecodeResult<DateTime<Utc>> {
    match raw {
        Some(value) => parse_time(&value).ok_or(DecodeError::InvalidTime { field, value }),
        None => Err(missing),
    }
}

/// Parse a query time parameter
///
/// Accepts Unix seconds with a fractional part (rounded to milliseconds),
/// RFC3339, or Prometheus' printed minimum/maximum timestamps, which map to
/// the earliest and latest representable times.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = s.parse::<f64>() {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.trunc();
        let ms = whole * 1000.0 + ((secs - whole) * 1000.0).round();
        if ms.abs() >= i64::MAX as f64 {
            return None;
        }
        return Utc.timestamp_millis_opt(ms as i64).single();
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }

    match s {
        MIN_TIME_FORMATTED => Some(DateTime::<Utc>::MIN_UTC),
        MAX_TIME_FORMATTED => Some(DateTime::<Utc>::MAX_UTC),
        _ => None,
    }
}

/// Parse a step parameter: float seconds or a Prometheus duration
pub fn parse_step(s: &str) -> Option<Duration> {
    if let Ok(secs) = s.parse::<f64>() {
        let ns = secs * 1e9;
        if !ns.is_finite() || ns >= i64::MAX as f64 || ns <= i64::MIN as f64 {
            return None;
        }
        return Some(Duration::milliseconds(ns as i64 / 1_000_000));
    }

    parse_duration(s).ok().map(Duration::milliseconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::Evaluation;

    fn envelope(record: &str) -> String {
        serde_json::json!({ "line": record }).to_string()
    }

    fn decode(record: &str) -> DecodeResult<Option<QueryDescriptor>> {
        decode_line(&envelope(record))
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_instant_query() {
        let descriptor = decode(
            r#"level=info ts=2024-05-01T12:00:05.5Z path=/prometheus/api/v1/query param_query="sum(up{job=\"api\"})" param_time=1714564800"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(descriptor.executed_at, utc("2024-05-01T12:00:05.5Z"));
        assert_eq!(descriptor.query, r#"sum(up{job="api"})"#);
        assert_eq!(
            descriptor.evaluation,
            Evaluation::Instant {
                time: utc("2024-05-01T12:00:00Z")
            }
        );
    }

    #[test]
    fn test_range_query() {
        let descriptor = decode(
            "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up \
             param_start=2024-05-01T10:00:00Z param_end=1714564800 param_step=30s",
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            descriptor.evaluation,
            Evaluation::Range {
                start: utc("2024-05-01T10:00:00Z"),
                end: utc("2024-05-01T12:00:00Z"),
                step: Duration::seconds(30),
            }
        );

        let descriptor = decode(
            "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up \
             param_start=1714560000 param_end=1714564800 param_step=15",
        )
        .unwrap()
        .unwrap();
        assert!(matches!(
            descriptor.evaluation,
            Evaluation::Range { step, .. } if step == Duration::seconds(15)
        ));
    }

    #[test]
    fn test_other_paths_are_skipped() {
        let decoded = decode("ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/labels").unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_missing_path_is_instant() {
        let descriptor = decode("ts=2024-05-01T12:00:00Z param_query=up param_time=1714564800")
            .unwrap()
            .unwrap();
        assert!(!descriptor.evaluation.is_range());
    }

    #[test]
    fn test_missing_fields() {
        let cases = [
            ("path=/prometheus/api/v1/query param_query=up param_time=1", "No timestamp"),
            ("ts=2024-05-01T12:00:00Z param_time=1", "No query"),
            ("ts=2024-05-01T12:00:00Z param_query= param_time=1", "No query"),
            ("ts=2024-05-01T12:00:00Z param_query=up", "No query time for instant query"),
            (
                "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up param_end=2 param_step=1",
                "No query start time for range query",
            ),
            (
                "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up param_start=1 param_step=1",
                "No query end time for range query",
            ),
            (
                "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up param_start=1 param_end=2",
                "No step for range query",
            ),
            (
                "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up param_start=1 param_end=2 param_step=0",
                "No step for range query",
            ),
        ];

        for (record, message) in cases {
            let err = decode(record).unwrap_err();
            assert_eq!(err.to_string(), message, "record: {}", record);
        }
    }

    #[test]
    fn test_start_after_end() {
        let err = decode(
            "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up \
             param_start=20 param_end=10 param_step=1",
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::StartAfterEnd));
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(decode_line("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode_line(r#"{"other": 1}"#), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode(r#"ts=2024 param_query="unterminated"#),
            Err(DecodeError::Logfmt(_))
        ));
        assert!(matches!(
            decode("ts=yesterday param_query=up param_time=1"),
            Err(DecodeError::InvalidTimestamp(_))
        ));

        let err = decode("ts=2024-05-01T12:00:00Z param_query=up param_time=soon").unwrap_err();
        assert_eq!(err.to_string(), "Invalid query time 'soon'");

        let err = decode(
            "ts=2024-05-01T12:00:00Z path=/prometheus/api/v1/query_range param_query=up \
             param_start=1 param_end=2 param_step=often",
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidStep(s) if s == "often"));
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("1714564800").unwrap(), utc("2024-05-01T12:00:00Z"));
        assert_eq!(
            parse_time("1714564800.1234").unwrap(),
            utc("2024-05-01T12:00:00.123Z")
        );
        assert_eq!(parse_time("-1.5").unwrap().timestamp_millis(), -1500);
        assert_eq!(
            parse_time("2024-05-01T14:00:00+02:00").unwrap(),
            utc("2024-05-01T12:00:00Z")
        );
        assert_eq!(parse_time(MIN_TIME_FORMATTED), Some(DateTime::<Utc>::MIN_UTC));
        assert_eq!(parse_time(MAX_TIME_FORMATTED), Some(DateTime::<Utc>::MAX_UTC));
        assert_eq!(parse_time("NaN"), None);
        assert_eq!(parse_time("tomorrow"), None);
    }

    #[test]
    fn test_parse_step_formats() {
        assert_eq!(parse_step("60"), Some(Duration::minutes(1)));
        assert_eq!(parse_step("0.25"), Some(Duration::milliseconds(250)));
        assert_eq!(parse_step("1m30s"), Some(Duration::seconds(90)));
        assert_eq!(parse_step("1e300"), None);
        assert_eq!(parse_step("fast"), None);
    }
}
