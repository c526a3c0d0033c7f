//! Step-wise expression evaluation
//!
//! Selectors must already hold their series (see [`super::engine`]). An
//! instant query is evaluated at a single timestamp; a range query is
//! evaluated once per step and the per-step vectors are stitched into series.

use super::aggregate::{aggregate, AggregateParam};
use super::ast::{AtModifier, Expr, MatrixSelector, SubqueryExpr, VectorSelector};
use super::binary::{scalar_scalar, vector_scalar, vector_vector};
use super::error::{PromqlError, PromqlResult};
use super::functions::{call, Args};
use super::labels::{is_label_name, Labels};
use super::value::{Matrix, Point, Sample, Series, Value, Vector};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Evaluation parameters of one query, all times in milliseconds
pub(crate) struct Evaluator {
    pub start: i64,
    pub end: i64,
    /// Step between evaluations; 0 for instant queries
    pub interval: i64,
    pub lookback: i64,
    /// Step used by subqueries that do not give one
    pub subquery_step: i64,
    pub deadline: Option<Instant>,
    pub timeout: Duration,
    pub max_samples: usize,
    samples: usize,
}

impl Evaluator {
    pub fn new(start: i64, end: i64, interval: i64, lookback: i64, subquery_step: i64) -> Self {
        Self {
            start,
            end,
            interval,
            lookback,
            subquery_step,
            deadline: None,
            timeout: Duration::MAX,
            max_samples: usize::MAX,
            samples: 0,
        }
    }

    /// Give up once `timeout` has elapsed from `started`
    pub fn with_timeout(mut self, started: Instant, timeout: Duration) -> Self {
        self.deadline = started.checked_add(timeout);
        self.timeout = timeout;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Evaluate the whole query
    pub fn run(&mut self, expr: &Expr) -> PromqlResult<Value> {
        if self.interval == 0 {
            self.check_deadline()?;
            return self.eval(expr, self.start);
        }

        let mut series: BTreeMap<Labels, Vec<Point>> = BTreeMap::new();
        let mut ts = self.start;

        while ts <= self.end {
            self.check_deadline()?;

            match self.eval(expr, ts)? {
                Value::Scalar { v, .. } => series.entry(Labels::new()).or_default().push(Point { t: ts, v }),
                Value::Vector(vector) => {
                    for sample in vector {
                        series.entry(sample.labels).or_default().push(Point { t: ts, v: sample.v });
                    }
                }
                other => {
                    return Err(PromqlError::Execution(format!(
                        "range query produced unexpected value {:?}",
                        other
                    )))
                }
            }

            ts = match ts.checked_add(self.interval) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(Value::Matrix(
            series
                .into_iter()
                .map(|(labels, points)| Series::new(labels, points))
                .collect(),
        ))
    }

    fn check_deadline(&self) -> PromqlResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(PromqlError::Timeout(self.timeout)),
            _ => Ok(()),
        }
    }

    fn add_samples(&mut self, n: usize) -> PromqlResult<()> {
        self.samples = self.samples.saturating_add(n);
        if self.samples > self.max_samples {
            return Err(PromqlError::TooManySamples(self.max_samples));
        }
        Ok(())
    }

    /// Reference time of a selector or subquery after `@` and `offset`
    fn ref_time(&self, at: Option<AtModifier>, offset: i64, ts: i64) -> i64 {
        let base = match at {
            Some(AtModifier::Timestamp(t)) => t,
            Some(AtModifier::Start) => self.start,
            Some(AtModifier::End) => self.end,
            None => ts,
        };
        base.saturating_sub(offset)
    }

    /// `(start, end)` window selected by a range-vector expression
    fn window(&self, expr: &Expr, ts: i64) -> Option<(i64, i64)> {
        match expr.unparen() {
            Expr::Matrix(m) => {
                let end = self.ref_time(m.selector.at, m.selector.offset, ts);
                Some((end.saturating_sub(m.range), end))
            }
            Expr::Subquery(sq) => {
                let end = self.ref_time(sq.at, sq.offset, ts);
                Some((end.saturating_sub(sq.range), end))
            }
            _ => None,
        }
    }

    fn eval(&mut self, expr: &Expr, ts: i64) -> PromqlResult<Value> {
        match expr {
            Expr::Number(v) => Ok(Value::Scalar { t: ts, v: *v }),
            Expr::String(s) => Ok(Value::String { t: ts, s: s.clone() }),
            Expr::Paren(inner) => self.eval(inner, ts),

            Expr::Negation(inner) => match self.eval(inner, ts)? {
                Value::Scalar { t, v } => Ok(Value::Scalar { t, v: -v }),
                Value::Vector(vector) => Ok(Value::Vector(
                    vector
                        .into_iter()
                        .map(|s| Sample {
                            labels: s.labels.without_metric_name(),
                            t: s.t,
                            v: -s.v,
                        })
                        .collect(),
                )),
                other => Err(PromqlError::Execution(format!("cannot negate {:?}", other))),
            },

            Expr::Vector(sel) => Ok(Value::Vector(self.select_vector(sel, ts, false)?)),
            Expr::Matrix(m) => Ok(Value::Matrix(self.select_matrix(m, ts)?)),
            Expr::Subquery(sq) => Ok(Value::Matrix(self.eval_subquery(sq, ts)?)),

            Expr::Binary(b) => {
                let lhs = self.eval(&b.lhs, ts)?;
                let rhs = self.eval(&b.rhs, ts)?;

                match (lhs, rhs) {
                    (Value::Scalar { v: l, .. }, Value::Scalar { v: r, .. }) => Ok(Value::Scalar {
                        t: ts,
                        v: scalar_scalar(b.op, l, r),
                    }),
                    (Value::Vector(l), Value::Scalar { v: r, .. }) => {
                        Ok(Value::Vector(vector_scalar(b.op, l, r, false, b.return_bool, ts)))
                    }
                    (Value::Scalar { v: l, .. }, Value::Vector(r)) => {
                        Ok(Value::Vector(vector_scalar(b.op, r, l, true, b.return_bool, ts)))
                    }
                    (Value::Vector(l), Value::Vector(r)) => {
                        let matching = b.matching.clone().unwrap_or_default();
                        Ok(Value::Vector(vector_vector(b.op, l, r, &matching, b.return_bool, ts)?))
                    }
                    (l, r) => Err(PromqlError::Execution(format!(
                        "invalid operands for {}: {:?} and {:?}",
                        b.op, l, r
                    ))),
                }
            }

            Expr::Aggregate(a) => {
                let param = match &a.param {
                    Some(p) => match self.eval(p, ts)? {
                        Value::Scalar { v, .. } => AggregateParam::Scalar(v),
                        Value::String { s, .. } if is_label_name(&s) => AggregateParam::Label(s),
                        Value::String { s, .. } => {
                            return Err(PromqlError::Execution(format!("invalid label name {:?}", s)))
                        }
                        other => {
                            return Err(PromqlError::Execution(format!(
                                "invalid aggregation parameter {:?}",
                                other
                            )))
                        }
                    },
                    None => AggregateParam::None,
                };

                match self.eval(&a.expr, ts)? {
                    Value::Vector(vector) => Ok(Value::Vector(aggregate(
                        a.op,
                        vector,
                        &param,
                        &a.grouping,
                        a.without,
                        ts,
                    ))),
                    other => Err(PromqlError::Execution(format!(
                        "aggregation expects an instant vector, got {:?}",
                        other
                    ))),
                }
            }

            Expr::Call(c) => {
                let mut values = Vec::with_capacity(c.args.len());
                let mut window = None;

                for arg in &c.args {
                    // timestamp() reports the sample's own time
                    let value = match (c.func.name, arg.unparen()) {
                        ("timestamp", Expr::Vector(sel)) => Value::Vector(self.select_vector(sel, ts, true)?),
                        _ => self.eval(arg, ts)?,
                    };
                    if window.is_none() {
                        window = self.window(arg, ts);
                    }
                    values.push(value);
                }

                call(
                    c.func,
                    Args {
                        values,
                        exprs: &c.args,
                        ts,
                        window,
                    },
                )
            }
        }
    }

    /// Latest sample of each series within the lookback window
    fn select_vector(&mut self, sel: &VectorSelector, ts: i64, keep_sample_time: bool) -> PromqlResult<Vector> {
        let reference = self.ref_time(sel.at, sel.offset, ts);
        let oldest = reference.saturating_sub(self.lookback);

        let vector: Vector = sel
            .series
            .iter()
            .filter_map(|series| {
                series
                    .points
                    .iter()
                    .rev()
                    .find(|p| p.t <= reference && p.t > oldest)
                    .map(|p| Sample {
                        labels: series.labels.clone(),
                        t: if keep_sample_time { p.t } else { ts },
                        v: p.v,
                    })
            })
            .collect();

        self.add_samples(vector.len())?;
        Ok(vector)
    }

    /// Points of each series within `(ref - range, ref]`
    fn select_matrix(&mut self, m: &MatrixSelector, ts: i64) -> PromqlResult<Matrix> {
        let reference = self.ref_time(m.selector.at, m.selector.offset, ts);
        let oldest = reference.saturating_sub(m.range);

        let matrix: Matrix = m
            .selector
            .series
            .iter()
            .filter_map(|series| {
                let points: Vec<Point> = series
                    .points
                    .iter()
                    .filter(|p| p.t > oldest && p.t <= reference)
                    .copied()
                    .collect();
                (!points.is_empty()).then(|| Series::new(series.labels.clone(), points))
            })
            .collect();

        self.add_samples(matrix.iter().map(|s| s.points.len()).sum())?;
        Ok(matrix)
    }

    /// Evaluate the inner expression at step-aligned times within `(ref - range, ref]`
    fn eval_subquery(&mut self, sq: &SubqueryExpr, ts: i64) -> PromqlResult<Matrix> {
        let step = sq.step.unwrap_or(self.subquery_step);
        if step <= 0 {
            return Err(PromqlError::Execution(format!(
                "subquery step must be positive, got {}ms",
                step
            )));
        }

        let reference = self.ref_time(sq.at, sq.offset, ts);
        let oldest = reference.saturating_sub(sq.range);
        let mut t = oldest.div_euclid(step).saturating_add(1).saturating_mul(step);

        let mut series: BTreeMap<Labels, Vec<Point>> = BTreeMap::new();
        while t <= reference {
            self.check_deadline()?;

            match self.eval(&sq.expr, t)? {
                Value::Vector(vector) => {
                    for sample in vector {
                        series.entry(sample.labels).or_default().push(Point { t, v: sample.v });
                    }
                }
                Value::Scalar { v, .. } => series.entry(Labels::new()).or_default().push(Point { t, v }),
                other => {
                    return Err(PromqlError::Execution(format!(
                        "subquery produced unexpected value {:?}",
                        other
                    )))
                }
            }

            t = match t.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(series
            .into_iter()
            .map(|(labels, points)| Series::new(labels, points))
            .collect())
    }
}
