//! Query anonymization
//!
//! Rewrites an expression so that queries differing only in names, label
//! values, literals and window sizes print identically.

use crate::promql::ast::{AtModifier, Expr, VectorSelector};
use crate::promql::{parse_expr, PromqlResult};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Placeholder for metric names and label lists
pub const PLACEHOLDER_NAME: &str = "metric";
pub const PLACEHOLDER_LABELS: &str = "labels";

/// Anonymize `expr` in place
///
/// Offsets and `@` modifiers of selectors are kept. A subquery's `@`
/// timestamp becomes `0.123`; `@ start()` and `@ end()` are kept.
pub fn anonymize(expr: &mut Expr) {
    match expr {
        Expr::Number(v) => *v = 123.0,
        Expr::String(s) => *s = "abc".to_string(),
        Expr::Vector(sel) => anonymize_selector(sel),
        Expr::Matrix(m) => {
            m.range = MINUTE_MS;
            anonymize_selector(&mut m.selector);
        }
        Expr::Subquery(sq) => {
            if let Some(AtModifier::Timestamp(_)) = sq.at {
                sq.at = Some(AtModifier::Timestamp(123));
            }
            sq.range = HOUR_MS;
            sq.step = Some(MINUTE_MS);
            anonymize(&mut sq.expr);
        }
        Expr::Paren(inner) | Expr::Negation(inner) => anonymize(inner),
        Expr::Binary(b) => {
            anonymize(&mut b.lhs);
            anonymize(&mut b.rhs);
            if let Some(matching) = &mut b.matching {
                collapse(&mut matching.labels);
                collapse(&mut matching.include);
            }
        }
        Expr::Aggregate(a) => {
            anonymize(&mut a.expr);
            if let Some(param) = &mut a.param {
                anonymize(param);
            }
            collapse(&mut a.grouping);
        }
        Expr::Call(call) => call.args.iter_mut().for_each(anonymize),
    }
}

fn anonymize_selector(sel: &mut VectorSelector) {
    sel.name = Some(PLACEHOLDER_NAME.to_string());
    sel.matchers.clear();
}

fn collapse(labels: &mut Vec<String>) {
    if !labels.is_empty() {
        *labels = vec![PLACEHOLDER_LABELS.to_string()];
    }
}

/// Parse `query` and print its anonymized form
pub fn clean_query(query: &str) -> PromqlResult<String> {
    let mut expr = parse_expr(query)?;
    anonymize(&mut expr);
    Ok(expr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(query: &str) -> String {
        clean_query(query).unwrap()
    }

    #[test]
    fn test_selectors() {
        assert_eq!(clean(r#"http_requests_total{job="api", code=~"5.."}"#), "metric");
        assert_eq!(clean(r#"{__name__="up"}"#), "metric");
        assert_eq!(clean("up offset 1h"), "metric offset 1h");
        assert_eq!(clean("rate(errors[15m])"), "rate(metric[1m])");
        assert_eq!(clean("up @ 1700000000"), "metric @ 1700000000.000");
    }

    #[test]
    fn test_literals() {
        assert_eq!(clean("up > 0.5"), "metric > 123");
        assert_eq!(clean("topk(5, up)"), "topk(123, metric)");
        assert_eq!(clean(r#"label_replace(up, "a", "$1", "b", "(.*)")"#),
            r#"label_replace(metric, "abc", "abc", "abc", "abc")"#);
    }

    #[test]
    fn test_label_lists() {
        assert_eq!(clean("sum by (job, instance) (up)"), "sum by (labels) (metric)");
        assert_eq!(clean("sum(up)"), "sum(metric)");
        assert_eq!(clean("max without (pod) (up)"), "max without (labels) (metric)");
        assert_eq!(
            clean("a / on (instance, job) group_left (team, owner) b"),
            "metric / on (labels) group_left (labels) metric"
        );
        assert_eq!(clean("a * on () b"), "metric * on () metric");
    }

    #[test]
    fn test_subqueries() {
        assert_eq!(
            clean("max_over_time(rate(x[5m])[6h:30s])"),
            "max_over_time(rate(metric[1m])[1h:1m])"
        );
        assert_eq!(
            clean("max_over_time(deriv(x[1m])[2d:] @ 1700000000)"),
            "max_over_time(deriv(metric[1m])[1h:1m] @ 0.123)"
        );
        assert_eq!(
            clean("min_over_time(x[1d:5m] @ end() offset 1w)"),
            "min_over_time(metric[1h:1m] @ end() offset 1w)"
        );
    }

    #[test]
    fn test_same_shape() {
        assert_eq!(
            clean(r#"sum by (job) (rate(a{env="prod"}[5m])) / 60"#),
            clean(r#"sum by (namespace, pod) (rate(b[1h])) / 3600"#)
        );
    }

    #[test]
    fn test_unary_and_parens() {
        assert_eq!(clean("-(a + 2)"), "-(metric + 123)");
    }
}
