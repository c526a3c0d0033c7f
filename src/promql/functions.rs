//! PromQL function table and implementations
//!
//! Each [`Function`] describes its signature for the type checker. The
//! evaluator hands already-evaluated arguments to [`call`], together with the
//! argument expressions and the window selected by a range-vector argument.

use super::ast::{equality_labels, Expr, ValueType};
use super::error::{PromqlError, PromqlResult};
use super::labels::{is_label_name, Labels, METRIC_NAME};
use super::value::{Matrix, Point, Sample, Value, Vector};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use regex::Regex;
use std::collections::BTreeMap;

/// Signature of a PromQL function
#[derive(Debug, PartialEq)]
pub struct Function {
    pub name: &'static str,
    pub arg_types: &'static [ValueType],
    /// 0: fixed arity, n > 0: up to n trailing arguments may be omitted or
    /// repeated, -1: the last argument repeats without limit
    pub variadic: i32,
    pub return_type: ValueType,
}

use ValueType::{Matrix as M, Scalar as S, String as Str, Vector as V};

macro_rules! function {
    ($name:expr, [$($arg:expr),*], $variadic:expr, $ret:expr) => {
        Function {
            name: $name,
            arg_types: &[$($arg),*],
            variadic: $variadic,
            return_type: $ret,
        }
    };
}

static FUNCTIONS: &[Function] = &[
    function!("abs", [V], 0, V),
    function!("absent", [V], 0, V),
    function!("absent_over_time", [M], 0, V),
    function!("acos", [V], 0, V),
    function!("acosh", [V], 0, V),
    function!("asin", [V], 0, V),
    function!("asinh", [V], 0, V),
    function!("atan", [V], 0, V),
    function!("atanh", [V], 0, V),
    function!("avg_over_time", [M], 0, V),
    function!("ceil", [V], 0, V),
    function!("changes", [M], 0, V),
    function!("clamp", [V, S, S], 0, V),
    function!("clamp_max", [V, S], 0, V),
    function!("clamp_min", [V, S], 0, V),
    function!("cos", [V], 0, V),
    function!("cosh", [V], 0, V),
    function!("count_over_time", [M], 0, V),
    function!("day_of_month", [V], 1, V),
    function!("day_of_week", [V], 1, V),
    function!("day_of_year", [V], 1, V),
    function!("days_in_month", [V], 1, V),
    function!("deg", [V], 0, V),
    function!("delta", [M], 0, V),
    function!("deriv", [M], 0, V),
    function!("double_exponential_smoothing", [M, S, S], 0, V),
    function!("exp", [V], 0, V),
    function!("floor", [V], 0, V),
    function!("histogram_count", [V], 0, V),
    function!("histogram_fraction", [S, S, V], 0, V),
    function!("histogram_quantile", [S, V], 0, V),
    function!("histogram_stddev", [V], 0, V),
    function!("histogram_stdvar", [V], 0, V),
    function!("histogram_sum", [V], 0, V),
    function!("holt_winters", [M, S, S], 0, V),
    function!("hour", [V], 1, V),
    function!("idelta", [M], 0, V),
    function!("increase", [M], 0, V),
    function!("irate", [M], 0, V),
    function!("label_join", [V, Str, Str, Str], -1, V),
    function!("label_replace", [V, Str, Str, Str, Str], 0, V),
    function!("last_over_time", [M], 0, V),
    function!("ln", [V], 0, V),
    function!("log10", [V], 0, V),
    function!("log2", [V], 0, V),
    function!("max_over_time", [M], 0, V),
    function!("min_over_time", [M], 0, V),
    function!("minute", [V], 1, V),
    function!("month", [V], 1, V),
    function!("pi", [], 0, S),
    function!("predict_linear", [M, S], 0, V),
    function!("present_over_time", [M], 0, V),
    function!("quantile_over_time", [S, M], 0, V),
    function!("rad", [V], 0, V),
    function!("rate", [M], 0, V),
    function!("resets", [M], 0, V),
    function!("round", [V, S], 1, V),
    function!("scalar", [V], 0, S),
    function!("sgn", [V], 0, V),
    function!("sin", [V], 0, V),
    function!("sinh", [V], 0, V),
    function!("sort", [V], 0, V),
    function!("sort_desc", [V], 0, V),
    function!("sqrt", [V], 0, V),
    function!("stddev_over_time", [M], 0, V),
    function!("stdvar_over_time", [M], 0, V),
    function!("sum_over_time", [M], 0, V),
    function!("tan", [V], 0, V),
    function!("tanh", [V], 0, V),
    function!("time", [], 0, S),
    function!("timestamp", [V], 0, V),
    function!("vector", [S], 0, V),
    function!("year", [V], 1, V),
];

/// Look up a function by name
pub fn get_function(name: &str) -> Option<&'static Function> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

/// Evaluated arguments of one function call at one step
pub(crate) struct Args<'a> {
    pub values: Vec<Value>,
    pub exprs: &'a [Expr],
    /// Evaluation timestamp in milliseconds
    pub ts: i64,
    /// `(start, end)` of the window selected by the range-vector argument
    pub window: Option<(i64, i64)>,
}

impl<'a> Args<'a> {
    fn vector(&self, i: usize) -> PromqlResult<&Vector> {
        match self.values.get(i) {
            Some(Value::Vector(v)) => Ok(v),
            other => Err(unexpected("instant vector", other)),
        }
    }

    fn matrix(&self, i: usize) -> PromqlResult<&Matrix> {
        self.values
            .iter()
            .filter_map(|v| match v {
                Value::Matrix(m) => Some(m),
                _ => None,
            })
            .nth(i)
            .ok_or_else(|| unexpected("range vector", None))
    }

    fn scalar(&self, i: usize) -> PromqlResult<f64> {
        match self.values.get(i) {
            Some(Value::Scalar { v, .. }) => Ok(*v),
            other => Err(unexpected("scalar", other)),
        }
    }

    fn string(&self, i: usize) -> PromqlResult<&str> {
        match self.values.get(i) {
            Some(Value::String { s, .. }) => Ok(s),
            other => Err(unexpected("string", other)),
        }
    }

    fn window(&self) -> PromqlResult<(i64, i64)> {
        self.window
            .ok_or_else(|| PromqlError::Execution("range function called without a range".to_string()))
    }
}

fn unexpected(expected: &str, got: Option<&Value>) -> PromqlError {
    PromqlError::Execution(format!("expected {} argument, got {:?}", expected, got))
}

/// Evaluate a function call
pub(crate) fn call(func: &Function, args: Args<'_>) -> PromqlResult<Value> {
    let ts = args.ts;
    let vector = match func.name {
        "pi" => return Ok(Value::Scalar { t: ts, v: std::f64::consts::PI }),
        "time" => return Ok(Value::Scalar { t: ts, v: ts as f64 / 1000.0 }),
        "scalar" => {
            let v = args.vector(0)?;
            let value = if v.len() == 1 { v[0].v } else { f64::NAN };
            return Ok(Value::Scalar { t: ts, v: value });
        }
        "vector" => vec![Sample {
            labels: Labels::new(),
            t: ts,
            v: args.scalar(0)?,
        }],

        "abs" => map_values(args.vector(0)?, ts, f64::abs),
        "ceil" => map_values(args.vector(0)?, ts, f64::ceil),
        "floor" => map_values(args.vector(0)?, ts, f64::floor),
        "exp" => map_values(args.vector(0)?, ts, f64::exp),
        "sqrt" => map_values(args.vector(0)?, ts, f64::sqrt),
        "ln" => map_values(args.vector(0)?, ts, f64::ln),
        "log2" => map_values(args.vector(0)?, ts, f64::log2),
        "log10" => map_values(args.vector(0)?, ts, f64::log10),
        "acos" => map_values(args.vector(0)?, ts, f64::acos),
        "acosh" => map_values(args.vector(0)?, ts, f64::acosh),
        "asin" => map_values(args.vector(0)?, ts, f64::asin),
        "asinh" => map_values(args.vector(0)?, ts, f64::asinh),
        "atan" => map_values(args.vector(0)?, ts, f64::atan),
        "atanh" => map_values(args.vector(0)?, ts, f64::atanh),
        "cos" => map_values(args.vector(0)?, ts, f64::cos),
        "cosh" => map_values(args.vector(0)?, ts, f64::cosh),
        "sin" => map_values(args.vector(0)?, ts, f64::sin),
        "sinh" => map_values(args.vector(0)?, ts, f64::sinh),
        "tan" => map_values(args.vector(0)?, ts, f64::tan),
        "tanh" => map_values(args.vector(0)?, ts, f64::tanh),
        "deg" => map_values(args.vector(0)?, ts, f64::to_degrees),
        "rad" => map_values(args.vector(0)?, ts, f64::to_radians),
        "sgn" => map_values(args.vector(0)?, ts, |v| {
            if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                v
            }
        }),
        "round" => {
            let to_nearest = if args.values.len() > 1 { args.scalar(1)? } else { 1.0 };
            let inverse = 1.0 / to_nearest;
            map_values(args.vector(0)?, ts, |v| (v * inverse + 0.5).floor() / inverse)
        }
        "clamp" => {
            let (min, max) = (args.scalar(1)?, args.scalar(2)?);
            if max < min {
                Vec::new()
            } else {
                map_values(args.vector(0)?, ts, |v| v.max(min).min(max))
            }
        }
        "clamp_max" => {
            let max = args.scalar(1)?;
            map_values(args.vector(0)?, ts, |v| v.min(max))
        }
        "clamp_min" => {
            let min = args.scalar(1)?;
            map_values(args.vector(0)?, ts, |v| v.max(min))
        }

        "timestamp" => args
            .vector(0)?
            .iter()
            .map(|s| Sample {
                labels: s.labels.without_metric_name(),
                t: ts,
                v: s.t as f64 / 1000.0,
            })
            .collect(),
        "sort" => {
            let mut v = args.vector(0)?.clone();
            v.sort_by(|a, b| cmp_nan_last(a.v, b.v));
            v
        }
        "sort_desc" => {
            let mut v = args.vector(0)?.clone();
            v.sort_by(|a, b| match (a.v.is_nan(), b.v.is_nan()) {
                (false, false) => b.v.total_cmp(&a.v),
                _ => cmp_nan_last(a.v, b.v),
            });
            v
        }
        "absent" => {
            if !args.vector(0)?.is_empty() {
                Vec::new()
            } else {
                vec![absent_sample(args.exprs.first(), ts)]
            }
        }
        "absent_over_time" => {
            if !args.matrix(0)?.is_empty() {
                Vec::new()
            } else {
                vec![absent_sample(args.exprs.first(), ts)]
            }
        }

        "day_of_month" => date_function(&args, |d| d.day() as f64)?,
        "day_of_week" => date_function(&args, |d| d.weekday().num_days_from_sunday() as f64)?,
        "day_of_year" => date_function(&args, |d| d.ordinal() as f64)?,
        "days_in_month" => date_function(&args, |d| days_in_month(d.year(), d.month()) as f64)?,
        "hour" => date_function(&args, |d| d.hour() as f64)?,
        "minute" => date_function(&args, |d| d.minute() as f64)?,
        "month" => date_function(&args, |d| d.month() as f64)?,
        "year" => date_function(&args, |d| d.year() as f64)?,

        "rate" => {
            let window = args.window()?;
            range_function(args.matrix(0)?, ts, |p| extrapolated_rate(p, window, true, true))
        }
        "increase" => {
            let window = args.window()?;
            range_function(args.matrix(0)?, ts, |p| extrapolated_rate(p, window, true, false))
        }
        "delta" => {
            let window = args.window()?;
            range_function(args.matrix(0)?, ts, |p| extrapolated_rate(p, window, false, false))
        }
        "irate" => range_function(args.matrix(0)?, ts, |p| instant_value(p, true)),
        "idelta" => range_function(args.matrix(0)?, ts, |p| instant_value(p, false)),
        "changes" => range_function(args.matrix(0)?, ts, |p| {
            Some(p.windows(2).filter(|w| w[0].v != w[1].v && !(w[0].v.is_nan() && w[1].v.is_nan())).count() as f64)
        }),
        "resets" => range_function(args.matrix(0)?, ts, |p| {
            Some(p.windows(2).filter(|w| w[1].v < w[0].v).count() as f64)
        }),
        "deriv" => range_function(args.matrix(0)?, ts, |p| {
            if p.len() < 2 {
                return None;
            }
            Some(linear_regression(p, p[0].t).0)
        }),
        "predict_linear" => {
            let duration = args.scalar(1)?;
            range_function(args.matrix(0)?, ts, |p| {
                if p.len() < 2 {
                    return None;
                }
                let (slope, intercept) = linear_regression(p, ts);
                Some(slope * duration + intercept)
            })
        }

        "avg_over_time" => over_time(args.matrix(0)?, ts, |v| v.iter().sum::<f64>() / v.len() as f64),
        "count_over_time" => over_time(args.matrix(0)?, ts, |v| v.len() as f64),
        "last_over_time" => over_time_keep_name(args.matrix(0)?, ts, |v| v[v.len() - 1]),
        "max_over_time" => over_time(args.matrix(0)?, ts, |v| fold_nan_aware(v, f64::max)),
        "min_over_time" => over_time(args.matrix(0)?, ts, |v| fold_nan_aware(v, f64::min)),
        "present_over_time" => over_time(args.matrix(0)?, ts, |_| 1.0),
        "sum_over_time" => over_time(args.matrix(0)?, ts, |v| v.iter().sum()),
        "stddev_over_time" => over_time(args.matrix(0)?, ts, |v| variance(v).sqrt()),
        "stdvar_over_time" => over_time(args.matrix(0)?, ts, variance),
        "quantile_over_time" => {
            let q = args.scalar(0)?;
            over_time(args.matrix(0)?, ts, |v| quantile(q, v))
        }

        "holt_winters" | "double_exponential_smoothing" => {
            let (sf, tf) = (args.scalar(1)?, args.scalar(2)?);
            for (name, factor) in [("smoothing", sf), ("trend", tf)] {
                if !(factor > 0.0 && factor < 1.0) {
                    return Err(PromqlError::Execution(format!(
                        "invalid {} factor. Expected: 0 < factor < 1, got: {}",
                        name, factor
                    )));
                }
            }
            range_function(args.matrix(0)?, ts, |p| holt_winters(p, sf, tf))
        }

        "histogram_quantile" => histogram_quantile(args.scalar(0)?, args.vector(1)?, ts),
        // Only native histogram samples feed these; float samples yield nothing
        "histogram_count" | "histogram_sum" | "histogram_stddev" | "histogram_stdvar" | "histogram_fraction" => {
            let arg = if func.name == "histogram_fraction" { 2 } else { 0 };
            args.vector(arg)?;
            Vec::new()
        }
        "label_replace" => label_replace(&args)?,
        "label_join" => label_join(&args)?,

        other => {
            return Err(PromqlError::Execution(format!(
                "function {:?} is not implemented",
                other
            )))
        }
    };

    Ok(Value::Vector(vector))
}

fn map_values(v: &Vector, ts: i64, f: impl Fn(f64) -> f64) -> Vector {
    v.iter()
        .map(|s| Sample {
            labels: s.labels.without_metric_name(),
            t: ts,
            v: f(s.v),
        })
        .collect()
}

fn cmp_nan_last(a: f64, b: f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

fn absent_sample(arg: Option<&Expr>, ts: i64) -> Sample {
    let selector = arg.map(Expr::unparen).and_then(|e| match e {
        Expr::Vector(sel) => Some(sel),
        Expr::Matrix(m) => Some(&m.selector),
        _ => None,
    });

    let mut labels = Labels::new();
    if let Some(sel) = selector {
        for (name, value) in equality_labels(&sel.matchers) {
            labels.set(name, value);
        }
    }

    Sample { labels, t: ts, v: 1.0 }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 0,
    }
}

fn date_function(args: &Args<'_>, f: impl Fn(&DateTime<Utc>) -> f64) -> PromqlResult<Vector> {
    let at = |secs: f64| DateTime::<Utc>::from_timestamp(secs.floor() as i64, 0);

    if args.values.is_empty() {
        let value = at(args.ts as f64 / 1000.0).map(|d| f(&d)).unwrap_or(f64::NAN);
        return Ok(vec![Sample {
            labels: Labels::new(),
            t: args.ts,
            v: value,
        }]);
    }

    Ok(args
        .vector(0)?
        .iter()
        .map(|s| Sample {
            labels: s.labels.without_metric_name(),
            t: args.ts,
            v: at(s.v).map(|d| f(&d)).unwrap_or(f64::NAN),
        })
        .collect())
}

fn range_function(m: &Matrix, ts: i64, f: impl Fn(&[Point]) -> Option<f64>) -> Vector {
    m.iter()
        .filter_map(|series| {
            f(&series.points).map(|v| Sample {
                labels: series.labels.without_metric_name(),
                t: ts,
                v,
            })
        })
        .collect()
}

fn over_time(m: &Matrix, ts: i64, f: impl Fn(&[f64]) -> f64) -> Vector {
    range_function(m, ts, |points| {
        if points.is_empty() {
            return None;
        }
        let values: Vec<f64> = points.iter().map(|p| p.v).collect();
        Some(f(&values))
    })
}

fn over_time_keep_name(m: &Matrix, ts: i64, f: impl Fn(&[f64]) -> f64) -> Vector {
    m.iter()
        .filter(|s| !s.points.is_empty())
        .map(|series| {
            let values: Vec<f64> = series.points.iter().map(|p| p.v).collect();
            Sample {
                labels: series.labels.clone(),
                t: ts,
                v: f(&values),
            }
        })
        .collect()
}

/// Fold that replaces a NaN accumulator with the next value
pub(crate) fn fold_nan_aware(values: &[f64], f: impl Fn(f64, f64) -> f64) -> f64 {
    values
        .iter()
        .skip(1)
        .fold(values[0], |acc, &v| if acc.is_nan() { v } else { f(acc, v) })
}

/// Population variance
pub(crate) fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Double exponential smoothing over the points of one series
fn holt_winters(points: &[Point], sf: f64, tf: f64) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let mut smoothed = points[0].v;
    let mut previous = 0.0;
    let mut trend = points[1].v - points[0].v;

    for (i, point) in points.iter().enumerate().skip(1) {
        if i > 1 {
            trend = tf * (smoothed - previous) + (1.0 - tf) * trend;
        }
        previous = smoothed;
        smoothed = sf * point.v + (1.0 - sf) * (smoothed + trend);
    }

    Some(smoothed)
}

/// φ-quantile of a set of values, interpolating linearly between ranks
pub(crate) fn quantile(q: f64, values: &[f64]) -> f64 {
    if values.is_empty() || q.is_nan() {
        return f64::NAN;
    }
    if q < 0.0 {
        return f64::NEG_INFINITY;
    }
    if q > 1.0 {
        return f64::INFINITY;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len() as f64;
    let rank = q * (n - 1.0);
    let lower = rank.floor().max(0.0);
    let upper = (lower + 1.0).min(n - 1.0);
    let weight = rank - rank.floor();

    sorted[lower as usize] * (1.0 - weight) + sorted[upper as usize] * weight
}

/// Rate, increase and delta with extrapolation to the window edges
fn extrapolated_rate(points: &[Point], window: (i64, i64), is_counter: bool, is_rate: bool) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let (range_start, range_end) = window;
    let first = points[0];
    let last = points[points.len() - 1];

    let mut result = last.v - first.v;
    if is_counter {
        let mut previous = 0.0;
        for p in points {
            if p.v < previous {
                result += previous;
            }
            previous = p.v;
        }
    }

    let mut to_start = (first.t - range_start) as f64 / 1000.0;
    let to_end = (range_end - last.t) as f64 / 1000.0;
    let sampled = (last.t - first.t) as f64 / 1000.0;
    let average_gap = sampled / (points.len() - 1) as f64;

    if is_counter && result > 0.0 && first.v >= 0.0 {
        let to_zero = sampled * (first.v / result);
        if to_zero < to_start {
            to_start = to_zero;
        }
    }

    let threshold = average_gap * 1.1;
    let mut extrapolate_to = sampled;
    extrapolate_to += if to_start < threshold { to_start } else { average_gap / 2.0 };
    extrapolate_to += if to_end < threshold { to_end } else { average_gap / 2.0 };

    result *= extrapolate_to / sampled;
    if is_rate {
        result /= (range_end - range_start) as f64 / 1000.0;
    }

    Some(result)
}

/// `irate` and `idelta`: based on the last two points only
fn instant_value(points: &[Point], is_rate: bool) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let last = points[points.len() - 1];
    let previous = points[points.len() - 2];

    let mut result = if is_rate && last.v < previous.v {
        // Counter reset
        last.v
    } else {
        last.v - previous.v
    };

    if is_rate {
        let interval = last.t - previous.t;
        if interval == 0 {
            return None;
        }
        result /= interval as f64 / 1000.0;
    }

    Some(result)
}

/// Least-squares fit; returns `(slope, intercept)` with x in seconds from `intercept_time`
fn linear_regression(points: &[Point], intercept_time: i64) -> (f64, f64) {
    let first = points[0].v;
    if points.iter().all(|p| p.v == first) {
        if first.is_infinite() {
            return (f64::NAN, f64::NAN);
        }
        return (0.0, first);
    }

    let n = points.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        let x = (p.t - intercept_time) as f64 / 1000.0;
        sum_x += x;
        sum_y += p.v;
        sum_xy += x * p.v;
        sum_x2 += x * x;
    }

    let cov_xy = sum_xy - sum_x * sum_y / n;
    let var_x = sum_x2 - sum_x * sum_x / n;
    let slope = cov_xy / var_x;
    let intercept = sum_y / n - slope * sum_x / n;

    (slope, intercept)
}

fn histogram_quantile(q: f64, v: &Vector, ts: i64) -> Vector {
    let mut groups: BTreeMap<Labels, Vec<(f64, f64)>> = BTreeMap::new();

    for sample in v {
        let upper_bound = match sample.labels.get("le").parse::<f64>() {
            Ok(bound) => bound,
            Err(_) => match sample.labels.get("le") {
                "+Inf" | "Inf" | "inf" => f64::INFINITY,
                _ => continue,
            },
        };
        let key = sample.labels.drop_names(&["le".to_string(), METRIC_NAME.to_string()]);
        groups.entry(key).or_default().push((upper_bound, sample.v));
    }

    groups
        .into_iter()
        .map(|(labels, buckets)| Sample {
            labels,
            t: ts,
            v: bucket_quantile(q, buckets),
        })
        .collect()
}

fn bucket_quantile(q: f64, mut buckets: Vec<(f64, f64)>) -> f64 {
    if q.is_nan() {
        return f64::NAN;
    }
    if q < 0.0 {
        return f64::NEG_INFINITY;
    }
    if q > 1.0 {
        return f64::INFINITY;
    }

    buckets.sort_by(|a, b| a.0.total_cmp(&b.0));
    match buckets.last() {
        Some((bound, _)) if bound.is_infinite() && *bound > 0.0 => {}
        _ => return f64::NAN,
    }

    // Merge buckets with equal bounds, then force counts to be monotonic
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(buckets.len());
    for (bound, count) in buckets {
        match merged.last_mut() {
            Some(last) if last.0 == bound => last.1 += count,
            _ => merged.push((bound, count)),
        }
    }
    let mut max = f64::NEG_INFINITY;
    for bucket in merged.iter_mut() {
        if bucket.1 > max {
            max = bucket.1;
        } else {
            bucket.1 = max;
        }
    }

    if merged.len() < 2 {
        return f64::NAN;
    }
    let observations = merged[merged.len() - 1].1;
    if observations == 0.0 {
        return f64::NAN;
    }

    let mut rank = q * observations;
    let b = merged[..merged.len() - 1]
        .iter()
        .position(|(_, count)| *count >= rank)
        .unwrap_or(merged.len() - 1);

    if b == merged.len() - 1 {
        return merged[merged.len() - 2].0;
    }
    if b == 0 && merged[0].0 <= 0.0 {
        return merged[0].0;
    }

    let mut bucket_start = 0.0;
    let bucket_end = merged[b].0;
    let mut count = merged[b].1;
    if b > 0 {
        bucket_start = merged[b - 1].0;
        count -= merged[b - 1].1;
        rank -= merged[b - 1].1;
    }

    bucket_start + (bucket_end - bucket_start) * (rank / count)
}

fn label_replace(args: &Args<'_>) -> PromqlResult<Vector> {
    let dst = args.string(1)?;
    let replacement = args.string(2)?;
    let src = args.string(3)?;
    let pattern = args.string(4)?;

    let regex = Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| PromqlError::Execution(format!("invalid regular expression in label_replace(): {}", e)))?;
    if !is_label_name(dst) {
        return Err(PromqlError::Execution(format!(
            "invalid destination label name in label_replace(): {}",
            dst
        )));
    }

    Ok(args
        .vector(0)?
        .iter()
        .map(|s| {
            let mut labels = s.labels.clone();
            if let Some(captures) = regex.captures(s.labels.get(src)) {
                let mut value = String::new();
                captures.expand(replacement, &mut value);
                labels.set(dst, value);
            }
            Sample { labels, t: args.ts, v: s.v }
        })
        .collect())
}

fn label_join(args: &Args<'_>) -> PromqlResult<Vector> {
    let dst = args.string(1)?;
    let separator = args.string(2)?;
    let sources = (3..args.values.len())
        .map(|i| args.string(i))
        .collect::<PromqlResult<Vec<_>>>()?;

    if !is_label_name(dst) {
        return Err(PromqlError::Execution(format!(
            "invalid destination label name in label_join(): {}",
            dst
        )));
    }

    Ok(args
        .vector(0)?
        .iter()
        .map(|s| {
            let joined = sources
                .iter()
                .map(|name| s.labels.get(name))
                .collect::<Vec<_>>()
                .join(separator);
            let mut labels = s.labels.clone();
            labels.set(dst, joined);
            Sample { labels, t: args.ts, v: s.v }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promql::value::Series;

    fn series(labels: &[(&str, &str)], points: &[(i64, f64)]) -> Series {
        Series::new(
            Labels::from_pairs(labels),
            points.iter().map(|&(t, v)| Point { t, v }).collect(),
        )
    }

    fn matrix_args(m: Matrix, ts: i64, window: (i64, i64)) -> Args<'static> {
        Args {
            values: vec![Value::Matrix(m)],
            exprs: &[],
            ts,
            window: Some(window),
        }
    }

    fn single(value: Value) -> f64 {
        match value {
            Value::Vector(v) if v.len() == 1 => v[0].v,
            other => panic!("expected one sample, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(get_function("rate").map(|f| f.return_type), Some(ValueType::Vector));
        assert_eq!(get_function("time").map(|f| f.arg_types.len()), Some(0));
        assert!(get_function("no_such_function").is_none());
    }

    #[test]
    fn test_rate_without_extrapolation_gap() {
        // One sample every 15s across a 60s window ending at 60s
        let m = vec![series(
            &[("__name__", "requests_total")],
            &[(15_000, 1.0), (30_000, 2.0), (45_000, 3.0), (60_000, 4.0)],
        )];
        let rate = get_function("rate").unwrap();
        let value = single(call(rate, matrix_args(m, 60_000, (0, 60_000))).unwrap());
        // 3 increments over 45s, extrapolated by 15s to the window start
        assert!((value - 4.0 / 60.0).abs() < 1e-9, "got {}", value);
    }

    #[test]
    fn test_increase_handles_counter_reset() {
        let m = vec![series(&[], &[(10_000, 5.0), (20_000, 1.0), (30_000, 3.0)])];
        let increase = get_function("increase").unwrap();
        let value = single(call(increase, matrix_args(m, 30_000, (10_000, 30_000))).unwrap());
        // Raw increase: 3 - 5 + 5 (reset) = 3
        assert!((value - 3.0).abs() < 1e-9, "got {}", value);
    }

    #[test]
    fn test_rate_needs_two_points() {
        let m = vec![series(&[], &[(10_000, 5.0)])];
        let rate = get_function("rate").unwrap();
        let value = call(rate, matrix_args(m, 30_000, (0, 30_000))).unwrap();
        assert_eq!(value, Value::Vector(Vec::new()));
    }

    #[test]
    fn test_over_time_functions() {
        let m = vec![series(&[("__name__", "x")], &[(1_000, 1.0), (2_000, 3.0), (3_000, 8.0)])];
        let call_one = |name: &str| {
            let func = get_function(name).unwrap();
            single(call(func, matrix_args(m.clone(), 3_000, (0, 3_000))).unwrap())
        };

        assert_eq!(call_one("sum_over_time"), 12.0);
        assert_eq!(call_one("avg_over_time"), 4.0);
        assert_eq!(call_one("count_over_time"), 3.0);
        assert_eq!(call_one("max_over_time"), 8.0);
        assert_eq!(call_one("min_over_time"), 1.0);
        assert_eq!(call_one("last_over_time"), 8.0);
        assert_eq!(call_one("changes"), 2.0);
    }

    #[test]
    fn test_holt_winters() {
        let m = vec![series(&[("__name__", "x")], &[(1_000, 1.0), (2_000, 2.0), (3_000, 3.0)])];
        let func = get_function("holt_winters").unwrap();
        let args = Args {
            values: vec![
                Value::Matrix(m.clone()),
                Value::Scalar { t: 0, v: 0.5 },
                Value::Scalar { t: 0, v: 0.5 },
            ],
            exprs: &[],
            ts: 3_000,
            window: Some((0, 3_000)),
        };
        // A linear series is followed exactly
        assert_eq!(single(call(func, args).unwrap()), 3.0);

        let args = Args {
            values: vec![
                Value::Matrix(m),
                Value::Scalar { t: 0, v: 1.0 },
                Value::Scalar { t: 0, v: 0.5 },
            ],
            exprs: &[],
            ts: 3_000,
            window: Some((0, 3_000)),
        };
        assert!(call(func, args).is_err());
    }

    #[test]
    fn test_histogram_functions_skip_float_samples() {
        let vector = vec![Sample {
            labels: Labels::from_pairs(&[("__name__", "x")]),
            t: 0,
            v: 4.0,
        }];
        for name in ["histogram_count", "histogram_sum", "histogram_stddev"] {
            let func = get_function(name).unwrap();
            let args = Args {
                values: vec![Value::Vector(vector.clone())],
                exprs: &[],
                ts: 0,
                window: None,
            };
            assert_eq!(call(func, args).unwrap(), Value::Vector(Vec::new()), "{}", name);
        }

        let func = get_function("histogram_fraction").unwrap();
        let args = Args {
            values: vec![
                Value::Scalar { t: 0, v: 0.0 },
                Value::Scalar { t: 0, v: 0.2 },
                Value::Vector(vector),
            ],
            exprs: &[],
            ts: 0,
            window: None,
        };
        assert_eq!(call(func, args).unwrap(), Value::Vector(Vec::new()));
    }

    #[test]
    fn test_quantile() {
        assert_eq!(quantile(0.5, &[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(quantile(0.75, &[1.0, 2.0, 3.0, 4.0, 5.0]), 4.0);
        assert_eq!(quantile(1.5, &[1.0]), f64::INFINITY);
        assert!(quantile(0.5, &[]).is_nan());
    }

    #[test]
    fn test_histogram_quantile() {
        let ts = 0;
        let bucket = |le: &str, v: f64| Sample {
            labels: Labels::from_pairs(&[("__name__", "latency_bucket"), ("le", le)]),
            t: ts,
            v,
        };
        let v = vec![bucket("0.1", 50.0), bucket("0.5", 90.0), bucket("+Inf", 100.0)];

        let result = histogram_quantile(0.5, &v, ts);
        assert_eq!(result.len(), 1);
        assert!(result[0].labels.is_empty());
        assert!((result[0].v - 0.1).abs() < 1e-9);

        let result = histogram_quantile(0.7, &v, ts);
        assert!((result[0].v - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_label_replace() {
        let args = Args {
            values: vec![
                Value::Vector(vec![Sample {
                    labels: Labels::from_pairs(&[("instance", "host-1:9090")]),
                    t: 0,
                    v: 1.0,
                }]),
                Value::String { t: 0, s: "host".to_string() },
                Value::String { t: 0, s: "$1".to_string() },
                Value::String { t: 0, s: "instance".to_string() },
                Value::String { t: 0, s: "(.*):.*".to_string() },
            ],
            exprs: &[],
            ts: 0,
            window: None,
        };

        let result = label_replace(&args).unwrap();
        assert_eq!(result[0].labels.get("host"), "host-1");
    }

    #[test]
    fn test_date_functions_default_to_eval_time() {
        // 2021-03-04T05:06:07Z
        let ts = 1_614_834_367_000;
        let args = Args {
            values: Vec::new(),
            exprs: &[],
            ts,
            window: None,
        };

        assert_eq!(date_function(&args, |d| d.hour() as f64).unwrap()[0].v, 5.0);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 12), 31);
    }
}
