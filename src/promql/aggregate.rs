//! Aggregation operators over instant vectors

use super::ast::AggregateOp;
use super::functions::{fold_nan_aware, quantile, variance};
use super::labels::{Labels, METRIC_NAME};
use super::value::{Sample, Vector};
use std::collections::BTreeMap;

/// Grouping key of a sample under `by`/`without`
fn group_key(labels: &Labels, grouping: &[String], without: bool) -> Labels {
    if without {
        let mut names = grouping.to_vec();
        names.push(METRIC_NAME.to_string());
        labels.drop_names(&names)
    } else {
        labels.keep(grouping)
    }
}

/// Evaluated leading parameter of an aggregation
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateParam {
    None,
    /// `topk`, `bottomk` and `quantile`
    Scalar(f64),
    /// Output label of `count_values`
    Label(String),
}

impl AggregateParam {
    fn scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// Apply an aggregation at one step
pub fn aggregate(
    op: AggregateOp,
    vector: Vector,
    param: &AggregateParam,
    grouping: &[String],
    without: bool,
    ts: i64,
) -> Vector {
    let mut groups: BTreeMap<Labels, Vec<Sample>> = BTreeMap::new();
    for sample in vector {
        let key = group_key(&sample.labels, grouping, without);
        groups.entry(key).or_default().push(sample);
    }

    let mut out = Vector::new();
    for (labels, samples) in groups {
        let values: Vec<f64> = samples.iter().map(|s| s.v).collect();

        let value = match op {
            AggregateOp::Sum => values.iter().sum(),
            AggregateOp::Avg => values.iter().sum::<f64>() / values.len() as f64,
            AggregateOp::Count => values.len() as f64,
            AggregateOp::Group => 1.0,
            AggregateOp::Min => fold_nan_aware(&values, f64::min),
            AggregateOp::Max => fold_nan_aware(&values, f64::max),
            AggregateOp::Stdvar => variance(&values),
            AggregateOp::Stddev => variance(&values).sqrt(),
            AggregateOp::Quantile => quantile(param.scalar().unwrap_or(f64::NAN), &values),
            AggregateOp::Topk | AggregateOp::Bottomk => {
                out.extend(select_k(op, samples, param.scalar().unwrap_or(0.0), ts));
                continue;
            }
            AggregateOp::CountValues => {
                if let AggregateParam::Label(name) = param {
                    out.extend(count_values(&labels, &values, name, ts));
                }
                continue;
            }
        };

        out.push(Sample { labels, t: ts, v: value });
    }

    out
}

/// `topk`/`bottomk` keep whole samples, labels included
fn select_k(op: AggregateOp, mut samples: Vec<Sample>, k: f64, ts: i64) -> Vec<Sample> {
    if !(k >= 1.0) {
        return Vec::new();
    }
    let k = if k >= samples.len() as f64 { samples.len() } else { k as usize };

    // NaN sorts last either way
    samples.sort_by(|a, b| match (a.v.is_nan(), b.v.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) if op == AggregateOp::Topk => b.v.total_cmp(&a.v),
        (false, false) => a.v.total_cmp(&b.v),
    });

    samples
        .into_iter()
        .take(k)
        .map(|s| Sample { t: ts, ..s })
        .collect()
}

/// One output sample per distinct value, labelled with that value
fn count_values(group: &Labels, values: &[f64], name: &str, ts: i64) -> Vec<Sample> {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    for &v in values {
        *counts.entry(format_value(v)).or_insert(0.0) += 1.0;
    }

    counts
        .into_iter()
        .map(|(value, count)| {
            let mut labels = group.clone();
            labels.set(name, value);
            Sample { labels, t: ts, v: count }
        })
        .collect()
}

/// Shortest text form of a sample value, `+Inf`/`-Inf`/`NaN` for specials
fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pairs: &[(&str, &str)], v: f64) -> Sample {
        Sample {
            labels: Labels::from_pairs(pairs),
            t: 0,
            v,
        }
    }

    fn input() -> Vector {
        vec![
            sample(&[("__name__", "x"), ("job", "api"), ("instance", "a")], 1.0),
            sample(&[("__name__", "x"), ("job", "api"), ("instance", "b")], 3.0),
            sample(&[("__name__", "x"), ("job", "db"), ("instance", "c")], 10.0),
        ]
    }

    #[test]
    fn test_sum_by() {
        let out = aggregate(AggregateOp::Sum, input(), &AggregateParam::None, &["job".to_string()], false, 0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].labels, Labels::from_pairs(&[("job", "api")]));
        assert_eq!(out[0].v, 4.0);
        assert_eq!(out[1].v, 10.0);
    }

    #[test]
    fn test_without_drops_metric_name() {
        let out = aggregate(AggregateOp::Max, input(), &AggregateParam::None, &["instance".to_string()], true, 0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].labels, Labels::from_pairs(&[("job", "api")]));
        assert_eq!(out[0].v, 3.0);
    }

    #[test]
    fn test_no_grouping() {
        let out = aggregate(AggregateOp::Avg, input(), &AggregateParam::None, &[], false, 0);
        assert_eq!(out.len(), 1);
        assert!(out[0].labels.is_empty());
        assert!((out[0].v - 14.0 / 3.0).abs() < 1e-9);

        let out = aggregate(AggregateOp::Count, input(), &AggregateParam::None, &[], false, 0);
        assert_eq!(out[0].v, 3.0);
    }

    #[test]
    fn test_topk_keeps_labels() {
        let out = aggregate(AggregateOp::Topk, input(), &AggregateParam::Scalar(2.0), &[], false, 5);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].v, 10.0);
        assert_eq!(out[0].labels.get("instance"), "c");
        assert_eq!(out[0].t, 5);

        let out = aggregate(AggregateOp::Bottomk, input(), &AggregateParam::Scalar(1.0), &[], false, 0);
        assert_eq!(out[0].v, 1.0);

        assert!(aggregate(AggregateOp::Topk, input(), &AggregateParam::Scalar(0.0), &[], false, 0).is_empty());
    }

    #[test]
    fn test_stddev_and_quantile() {
        let v = vec![sample(&[], 2.0), sample(&[], 4.0), sample(&[], 4.0), sample(&[], 6.0)];
        let out = aggregate(AggregateOp::Stddev, v.clone(), &AggregateParam::None, &[], false, 0);
        assert!((out[0].v - 2.0_f64.sqrt()).abs() < 1e-9);

        let out = aggregate(AggregateOp::Quantile, v, &AggregateParam::Scalar(0.5), &[], false, 0);
        assert_eq!(out[0].v, 4.0);
    }

    #[test]
    fn test_count_values() {
        let v = vec![
            sample(&[("job", "api"), ("instance", "a")], 1.0),
            sample(&[("job", "api"), ("instance", "b")], 1.0),
            sample(&[("job", "db"), ("instance", "c")], 2.5),
        ];
        let param = AggregateParam::Label("version".to_string());

        let out = aggregate(AggregateOp::CountValues, v.clone(), &param, &[], false, 7);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].labels, Labels::from_pairs(&[("version", "1")]));
        assert_eq!(out[0].v, 2.0);
        assert_eq!(out[0].t, 7);
        assert_eq!(out[1].labels, Labels::from_pairs(&[("version", "2.5")]));
        assert_eq!(out[1].v, 1.0);

        let out = aggregate(AggregateOp::CountValues, v, &param, &["job".to_string()], false, 0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].labels, Labels::from_pairs(&[("job", "api"), ("version", "1")]));
        assert_eq!(out[1].labels, Labels::from_pairs(&[("job", "db"), ("version", "2.5")]));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(-0.25), "-0.25");
    }
}
