//! Query engine
//!
//! Turns query text into an executable [`Query`]. Executing a query happens
//! in two phases:
//!
//! 1. **Preparation**: for every selector, open one storage session over the
//!    absolute window that selector can reach (including `offset`, `@`,
//!    lookback, range and enclosing subqueries) and select its series.
//! 2. **Evaluation**: evaluate the expression step by step over the loaded
//!    series.
//!
//! All sessions are closed when execution finishes or the query is dropped.

use super::ast::{AtModifier, Expr, ValueType, VectorSelector};
use super::error::{PromqlError, PromqlResult};
use super::eval::Evaluator;
use super::parser::parse_expr;
use super::storage::{Querier, Queryable, SelectHints};
use super::value::Value;
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Prometheus rejects range queries with more points than this per series
pub const MAX_POINTS_PER_SERIES: i64 = 11_000;

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineOpts {
    /// How far back an instant selector looks for the latest sample
    pub lookback_delta: chrono::Duration,
    /// Step of subqueries that do not specify one
    pub no_step_subquery_interval: chrono::Duration,
    /// Wall-clock limit for one query
    pub timeout: std::time::Duration,
    /// Limit on samples loaded by one query
    pub max_samples: usize,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            lookback_delta: chrono::Duration::minutes(5),
            no_step_subquery_interval: chrono::Duration::minutes(1),
            timeout: std::time::Duration::from_secs(60),
            max_samples: usize::MAX,
        }
    }
}

/// Creates queries against a [`Queryable`]
#[derive(Debug, Clone, Default)]
pub struct Engine {
    opts: EngineOpts,
}

impl Engine {
    pub fn new(opts: EngineOpts) -> Self {
        Self { opts }
    }

    pub fn opts(&self) -> &EngineOpts {
        &self.opts
    }

    /// Query evaluated at a single instant
    pub fn new_instant_query<'a>(
        &self,
        queryable: &'a dyn Queryable,
        query: &str,
        ts: DateTime<Utc>,
    ) -> PromqlResult<Query<'a>> {
        let expr = parse_expr(query)?;
        let t = ts.timestamp_millis();
        Ok(Query::new(queryable, expr, t, t, 0, self.opts.clone()))
    }

    /// Query evaluated at every `step` from `start` through `end`
    pub fn new_range_query<'a>(
        &self,
        queryable: &'a dyn Queryable,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: chrono::Duration,
    ) -> PromqlResult<Query<'a>> {
        let step_ms = step.num_milliseconds();
        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());

        if step_ms <= 0 {
            return Err(PromqlError::InvalidQuery(
                "zero or negative query resolution step widths are not accepted. Try a positive integer"
                    .to_string(),
            ));
        }
        if end_ms < start_ms {
            return Err(PromqlError::InvalidQuery(
                "end timestamp must not be before start time".to_string(),
            ));
        }
        if end_ms.saturating_sub(start_ms) / step_ms > MAX_POINTS_PER_SERIES {
            return Err(PromqlError::InvalidQuery(format!(
                "exceeded maximum resolution of {} points per timeseries. Try decreasing the query resolution (?step=XX)",
                MAX_POINTS_PER_SERIES
            )));
        }

        let expr = parse_expr(query)?;
        let value_type = expr.value_type();
        if value_type != ValueType::Scalar && value_type != ValueType::Vector {
            return Err(PromqlError::InvalidQuery(format!(
                "invalid expression type {:?} for range query, must be scalar or instant vector",
                value_type.to_string()
            )));
        }

        Ok(Query::new(queryable, expr, start_ms, end_ms, step_ms, self.opts.clone()))
    }
}

/// A parsed query bound to its storage and evaluation times
pub struct Query<'a> {
    queryable: &'a dyn Queryable,
    expr: Expr,
    start: i64,
    end: i64,
    interval: i64,
    opts: EngineOpts,
    queriers: Vec<Box<dyn Querier + 'a>>,
}

impl<'a> Query<'a> {
    fn new(queryable: &'a dyn Queryable, expr: Expr, start: i64, end: i64, interval: i64, opts: EngineOpts) -> Self {
        Self {
            queryable,
            expr,
            start,
            end,
            interval,
            opts,
            queriers: Vec::new(),
        }
    }

    /// The parsed expression
    pub fn statement(&self) -> &Expr {
        &self.expr
    }

    /// Load the series every selector needs, then evaluate
    pub fn exec(&mut self) -> PromqlResult<Value> {
        let started = Instant::now();
        let span = Span {
            start: self.start,
            end: self.end,
            step: self.interval,
            lookback: self.opts.lookback_delta.num_milliseconds(),
        };

        let prepared = populate(
            self.queryable,
            &mut self.queriers,
            &span,
            &mut self.expr,
            &mut Vec::new(),
        );

        let result = prepared.and_then(|_| {
            Evaluator::new(
                self.start,
                self.end,
                self.interval,
                span.lookback,
                self.opts.no_step_subquery_interval.num_milliseconds(),
            )
            .with_timeout(started, self.opts.timeout)
            .with_max_samples(self.opts.max_samples)
            .run(&self.expr)
        });

        tracing::debug!(
            "Executed {:?} over {} sessions in {:?}",
            self.expr.to_string(),
            self.queriers.len(),
            started.elapsed()
        );

        self.close();
        result
    }

    /// Close every open storage session
    pub fn close(&mut self) {
        for mut querier in self.queriers.drain(..) {
            if let Err(e) = querier.close() {
                tracing::warn!("Failed to close querier: {}", e);
            }
        }
    }
}

impl Drop for Query<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Times shared by every selector of a query, in milliseconds
struct Span {
    start: i64,
    end: i64,
    step: i64,
    lookback: i64,
}

impl Span {
    fn resolve(&self, at: AtModifier) -> i64 {
        match at {
            AtModifier::Timestamp(t) => t,
            AtModifier::Start => self.start,
            AtModifier::End => self.end,
        }
    }
}

/// Modifiers of a subquery enclosing a selector
struct SubqueryFrame {
    offset: i64,
    range: i64,
    at: Option<AtModifier>,
}

/// Window `[mint, maxt]` a selector can read during evaluation
fn selector_window(span: &Span, sel: &VectorSelector, range: i64, path: &[SubqueryFrame]) -> (i64, i64) {
    let (mut start, mut end) = (span.start, span.end);

    let mut subquery_offset: i64 = 0;
    let mut subquery_range: i64 = 0;
    let mut subquery_at = None;
    for frame in path {
        subquery_offset = subquery_offset.saturating_add(frame.offset);
        subquery_range = subquery_range.saturating_add(frame.range);
        if let Some(at) = frame.at {
            // An @ on a subquery resets everything enclosing it
            subquery_offset = frame.offset;
            subquery_range = frame.range;
            subquery_at = Some(span.resolve(at));
        }
    }

    if let Some(ts) = subquery_at {
        start = ts;
        end = ts;
    }

    if let Some(at) = sel.at {
        start = span.resolve(at);
        end = start;
    } else {
        start = start
            .saturating_sub(subquery_offset)
            .saturating_sub(subquery_range);
        end = end.saturating_sub(subquery_offset);
    }

    start = if range == 0 {
        start.saturating_sub(span.lookback)
    } else {
        start.saturating_sub(range)
    };

    (
        start.saturating_sub(sel.offset),
        end.saturating_sub(sel.offset),
    )
}

fn select_series<'a>(
    queryable: &'a dyn Queryable,
    queriers: &mut Vec<Box<dyn Querier + 'a>>,
    span: &Span,
    sel: &mut VectorSelector,
    range: i64,
    path: &[SubqueryFrame],
) -> PromqlResult<()> {
    let (mint, maxt) = selector_window(span, sel, range, path);
    let querier = queryable.querier(mint, maxt)?;

    let hints = SelectHints {
        start: mint,
        end: maxt,
        step: span.step,
        range,
    };
    let selected = querier.select(false, &hints, &sel.all_matchers());
    queriers.push(querier);

    sel.series = selected?;
    Ok(())
}

fn populate<'a>(
    queryable: &'a dyn Queryable,
    queriers: &mut Vec<Box<dyn Querier + 'a>>,
    span: &Span,
    expr: &mut Expr,
    path: &mut Vec<SubqueryFrame>,
) -> PromqlResult<()> {
    match expr {
        Expr::Number(_) | Expr::String(_) => Ok(()),
        Expr::Vector(sel) => select_series(queryable, queriers, span, sel, 0, path),
        Expr::Matrix(m) => select_series(queryable, queriers, span, &mut m.selector, m.range, path),
        Expr::Subquery(sq) => {
            path.push(SubqueryFrame {
                offset: sq.offset,
                range: sq.range,
                at: sq.at,
            });
            let result = populate(queryable, queriers, span, &mut sq.expr, path);
            path.pop();
            result
        }
        Expr::Paren(inner) | Expr::Negation(inner) => populate(queryable, queriers, span, inner, path),
        Expr::Binary(b) => {
            populate(queryable, queriers, span, &mut b.lhs, path)?;
            populate(queryable, queriers, span, &mut b.rhs, path)
        }
        Expr::Aggregate(a) => {
            if let Some(param) = &mut a.param {
                populate(queryable, queriers, span, param, path)?;
            }
            populate(queryable, queriers, span, &mut a.expr, path)
        }
        Expr::Call(c) => c
            .args
            .iter_mut()
            .try_for_each(|arg| populate(queryable, queriers, span, arg, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promql::labels::{LabelMatcher, Labels};
    use crate::promql::storage::{SeriesSet, StorageError, StorageResult};
    use crate::promql::value::{Point, Series};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const MINUTE: i64 = 60_000;
    const HOUR: i64 = 60 * MINUTE;

    /// In-memory storage recording every session it opens
    #[derive(Default)]
    struct MemoryStorage {
        series: Vec<Series>,
        sessions: Mutex<Vec<(i64, i64)>>,
        closed: AtomicUsize,
        fail_select: bool,
    }

    impl MemoryStorage {
        fn with_series(series: Vec<Series>) -> Self {
            Self {
                series,
                ..Self::default()
            }
        }

        fn sessions(&self) -> Vec<(i64, i64)> {
            self.sessions.lock().unwrap().clone()
        }
    }

    struct MemoryQuerier<'a> {
        storage: &'a MemoryStorage,
        mint: i64,
        maxt: i64,
    }

    impl Queryable for MemoryStorage {
        fn querier<'a>(&'a self, mint: i64, maxt: i64) -> StorageResult<Box<dyn Querier + 'a>> {
            self.sessions.lock().unwrap().push((mint, maxt));
            Ok(Box::new(MemoryQuerier {
                storage: self,
                mint,
                maxt,
            }))
        }
    }

    impl Querier for MemoryQuerier<'_> {
        fn select(&self, _sort: bool, _hints: &SelectHints, matchers: &[LabelMatcher]) -> StorageResult<SeriesSet> {
            if self.storage.fail_select {
                return Err(StorageError::new("select failed"));
            }
            Ok(self
                .storage
                .series
                .iter()
                .filter(|s| s.labels.matches(matchers))
                .map(|s| {
                    let points = s
                        .points
                        .iter()
                        .filter(|p| p.t >= self.mint && p.t <= self.maxt)
                        .copied()
                        .collect();
                    Series::new(s.labels.clone(), points)
                })
                .collect())
        }

        fn label_values(&self, _name: &str, _matchers: &[LabelMatcher]) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn label_names(&self, _matchers: &[LabelMatcher]) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn close(&mut self) -> StorageResult<()> {
            self.storage.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A counter growing by 1 every 15 seconds from t=0 to t=`until`
    fn counter(name: &str, job: &str, until: i64) -> Series {
        let points = (0..=until / 15_000)
            .map(|i| Point {
                t: i * 15_000,
                v: i as f64,
            })
            .collect();
        Series::new(Labels::from_pairs(&[("__name__", name), ("job", job)]), points)
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn instant(storage: &MemoryStorage, query: &str, ts: i64) -> PromqlResult<Value> {
        let engine = Engine::default();
        let mut q = engine.new_instant_query(storage, query, at(ts))?;
        q.exec()
    }

    fn vector(value: Value) -> Vec<(Labels, f64)> {
        match value {
            Value::Vector(v) => v.into_iter().map(|s| (s.labels, s.v)).collect(),
            other => panic!("expected vector, got {:?}", other),
        }
    }

    #[test]
    fn test_instant_selector_uses_lookback() {
        let storage = MemoryStorage::with_series(vec![counter("up", "api", 10 * MINUTE)]);
        let t = 10 * MINUTE;

        let result = vector(instant(&storage, "up", t).unwrap());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1, 40.0);
        assert_eq!(storage.sessions(), vec![(t - 5 * MINUTE, t)]);
        assert_eq!(storage.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_each_selector_opens_one_session() {
        let storage = MemoryStorage::with_series(vec![counter("a", "x", HOUR), counter("b", "x", HOUR)]);
        let t = HOUR;

        instant(&storage, "a / b", t).unwrap();
        assert_eq!(storage.sessions().len(), 2);

        let storage = MemoryStorage::default();
        let result = vector(instant(&storage, "vector(1)", t).unwrap());
        assert_eq!(result, vec![(Labels::new(), 1.0)]);
        assert!(storage.sessions().is_empty());
    }

    #[test]
    fn test_session_windows() {
        let t = 100 * HOUR;
        let cases: Vec<(&str, (i64, i64))> = vec![
            ("rate(x[2h])", (t - 2 * HOUR, t)),
            ("x offset 1h", (t - HOUR - 5 * MINUTE, t - HOUR)),
            ("x @ 3600", (HOUR - 5 * MINUTE, HOUR)),
            ("max_over_time(x[10m:1m])", (t - 10 * MINUTE - 5 * MINUTE, t)),
            ("max_over_time(rate(x[5m])[1h:] offset 1d)", (t - 24 * HOUR - HOUR - 5 * MINUTE, t - 24 * HOUR)),
            ("x[1h:] @ 7200", (2 * HOUR - HOUR - 5 * MINUTE, 2 * HOUR)),
        ];

        for (query, expected) in cases {
            let storage = MemoryStorage::default();
            instant(&storage, query, t).unwrap();
            assert_eq!(storage.sessions(), vec![expected], "query {}", query);
        }
    }

    #[test]
    fn test_smoothing_and_histogram_function_windows() {
        let t = 100 * HOUR;
        let cases: Vec<(&str, (i64, i64))> = vec![
            ("holt_winters(x[1h], 0.5, 0.5)", (t - HOUR, t)),
            ("double_exponential_smoothing(x[1h], 0.3, 0.1)", (t - HOUR, t)),
            ("histogram_count(rate(x[5m]))", (t - 5 * MINUTE, t)),
            ("histogram_sum(rate(x[10m]))", (t - 10 * MINUTE, t)),
            ("histogram_fraction(0, 0.2, rate(x[1h]))", (t - HOUR, t)),
            ("histogram_stddev(x offset 1h)", (t - HOUR - 5 * MINUTE, t - HOUR)),
        ];

        for (query, expected) in cases {
            let storage = MemoryStorage::default();
            instant(&storage, query, t).unwrap();
            assert_eq!(storage.sessions(), vec![expected], "query {}", query);
        }
    }

    #[test]
    fn test_range_query_window_and_result() {
        let storage = MemoryStorage::with_series(vec![counter("up", "api", HOUR)]);
        let engine = Engine::default();
        let (start, end) = (10 * MINUTE, 12 * MINUTE);

        let mut q = engine
            .new_range_query(&storage, "up", at(start), at(end), chrono::Duration::minutes(1))
            .unwrap();
        let result = q.exec().unwrap();

        assert_eq!(storage.sessions(), vec![(start - 5 * MINUTE, end)]);
        match result {
            Value::Matrix(m) => {
                assert_eq!(m.len(), 1);
                let values: Vec<f64> = m[0].points.iter().map(|p| p.v).collect();
                assert_eq!(values, vec![40.0, 44.0, 48.0]);
            }
            other => panic!("expected matrix, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_and_aggregation() {
        let storage = MemoryStorage::with_series(vec![
            counter("requests_total", "api", HOUR),
            counter("requests_total", "db", HOUR),
        ]);

        let result = vector(instant(&storage, "sum(rate(requests_total[5m]))", HOUR).unwrap());
        assert_eq!(result.len(), 1);
        // Each counter grows by 1 every 15s
        assert!((result[0].1 - 2.0 / 15.0).abs() < 1e-9, "got {}", result[0].1);

        let result = vector(instant(&storage, "count by (job) (requests_total)", HOUR).unwrap());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, Labels::from_pairs(&[("job", "api")]));

        let result = vector(instant(&storage, r#"count_values("value", requests_total)"#, HOUR).unwrap());
        assert_eq!(result, vec![(Labels::from_pairs(&[("value", "240")]), 2.0)]);

        assert!(instant(&storage, "count_values(1, requests_total)", HOUR).is_err());
        assert!(instant(&storage, r#"count_values("0bad", requests_total)"#, HOUR).is_err());
    }

    #[test]
    fn test_subquery_evaluation() {
        let storage = MemoryStorage::with_series(vec![counter("up", "api", HOUR)]);
        let result = vector(instant(&storage, "max_over_time(up[10m:1m])", HOUR).unwrap());
        assert_eq!(result[0].1, 240.0);

        let result = vector(instant(&storage, "count_over_time(up[10m:1m])", HOUR).unwrap());
        assert_eq!(result[0].1, 10.0);
    }

    #[test]
    fn test_range_query_validation() {
        let storage = MemoryStorage::default();
        let engine = Engine::default();

        let zero_step = engine.new_range_query(&storage, "up", at(0), at(HOUR), chrono::Duration::zero());
        assert!(matches!(zero_step, Err(PromqlError::InvalidQuery(_))));

        let backwards = engine.new_range_query(&storage, "up", at(HOUR), at(0), chrono::Duration::minutes(1));
        assert!(matches!(backwards, Err(PromqlError::InvalidQuery(_))));

        let matrix = engine.new_range_query(&storage, "up[5m]", at(0), at(HOUR), chrono::Duration::minutes(1));
        assert!(matches!(matrix, Err(PromqlError::InvalidQuery(_))));

        let too_many = engine.new_range_query(&storage, "up", at(0), at(1000 * HOUR), chrono::Duration::seconds(1));
        assert!(matches!(too_many, Err(PromqlError::InvalidQuery(_))));

        assert!(storage.sessions().is_empty());
    }

    #[test]
    fn test_limits() {
        let storage = MemoryStorage::with_series(vec![counter("up", "a", HOUR), counter("up", "b", HOUR)]);

        let engine = Engine::new(EngineOpts {
            max_samples: 1,
            ..EngineOpts::default()
        });
        let mut q = engine.new_instant_query(&storage, "up", at(HOUR)).unwrap();
        assert!(matches!(q.exec(), Err(PromqlError::TooManySamples(1))));

        let engine = Engine::new(EngineOpts {
            timeout: std::time::Duration::ZERO,
            ..EngineOpts::default()
        });
        let mut q = engine.new_instant_query(&storage, "up", at(HOUR)).unwrap();
        assert!(matches!(q.exec(), Err(PromqlError::Timeout(_))));
    }

    #[test]
    fn test_storage_errors_propagate_and_sessions_close() {
        let storage = MemoryStorage {
            fail_select: true,
            ..MemoryStorage::default()
        };

        let result = instant(&storage, "up + up", HOUR);
        assert!(matches!(result, Err(PromqlError::Storage(_))));
        // Preparation stops at the first failure
        assert_eq!(storage.sessions().len(), 1);
        assert_eq!(storage.closed.load(Ordering::SeqCst), 1);
    }
}
