//! Binary operator semantics
//!
//! Scalar/scalar, vector/scalar and vector/vector operations, including
//! `on`/`ignoring` label matching, `group_left`/`group_right` and the set
//! operators `and`, `or`, `unless`.

use super::ast::{BinaryOp, Cardinality, VectorMatching};
use super::error::{PromqlError, PromqlResult};
use super::labels::{Labels, METRIC_NAME};
use super::value::{Sample, Vector};
use std::collections::{HashMap, HashSet};

/// Apply an operator to two values
///
/// Returns the result and whether a comparison kept the sample. Comparisons
/// yield the left-hand value when they hold.
pub fn scalar_binop(op: BinaryOp, lhs: f64, rhs: f64) -> (f64, bool) {
    match op {
        BinaryOp::Add => (lhs + rhs, true),
        BinaryOp::Sub => (lhs - rhs, true),
        BinaryOp::Mul => (lhs * rhs, true),
        BinaryOp::Div => (lhs / rhs, true),
        BinaryOp::Mod => (lhs % rhs, true),
        BinaryOp::Pow => (lhs.powf(rhs), true),
        BinaryOp::Atan2 => (lhs.atan2(rhs), true),
        BinaryOp::Eq => (lhs, lhs == rhs),
        BinaryOp::Ne => (lhs, lhs != rhs),
        BinaryOp::Gt => (lhs, lhs > rhs),
        BinaryOp::Lt => (lhs, lhs < rhs),
        BinaryOp::Gte => (lhs, lhs >= rhs),
        BinaryOp::Lte => (lhs, lhs <= rhs),
        // Set operators never reach element-wise evaluation
        BinaryOp::And | BinaryOp::Or | BinaryOp::Unless => (f64::NAN, false),
    }
}

/// Arithmetic and `bool` comparisons drop the metric name
fn drops_metric_name(op: BinaryOp, return_bool: bool) -> bool {
    !op.is_comparison() || return_bool
}

/// Value of two scalars combined; comparisons require `bool`
pub fn scalar_scalar(op: BinaryOp, lhs: f64, rhs: f64) -> f64 {
    let (value, keep) = scalar_binop(op, lhs, rhs);
    if op.is_comparison() {
        if keep {
            1.0
        } else {
            0.0
        }
    } else {
        value
    }
}

/// Apply an operator between every sample of a vector and a scalar
///
/// `scalar_on_left` marks `scalar op vector`.
pub fn vector_scalar(
    op: BinaryOp,
    vector: Vector,
    scalar: f64,
    scalar_on_left: bool,
    return_bool: bool,
    ts: i64,
) -> Vector {
    vector
        .into_iter()
        .filter_map(|sample| {
            let (lhs, rhs) = if scalar_on_left {
                (scalar, sample.v)
            } else {
                (sample.v, scalar)
            };

            let (mut value, keep) = scalar_binop(op, lhs, rhs);
            // Comparisons always yield the vector's own value
            if op.is_comparison() && scalar_on_left {
                value = sample.v;
            }
            if return_bool {
                value = if keep { 1.0 } else { 0.0 };
            } else if !keep {
                return None;
            }

            let labels = if drops_metric_name(op, return_bool) {
                sample.labels.without_metric_name()
            } else {
                sample.labels
            };
            Some(Sample { labels, t: ts, v: value })
        })
        .collect()
}

/// Label set used to pair samples from both sides
fn signature(labels: &Labels, matching: &VectorMatching) -> Labels {
    if matching.on {
        labels.keep(&matching.labels)
    } else {
        let mut names = matching.labels.clone();
        names.push(METRIC_NAME.to_string());
        labels.drop_names(&names)
    }
}

fn result_labels(many: &Labels, one: &Labels, op: BinaryOp, return_bool: bool, matching: &VectorMatching) -> Labels {
    let mut labels = if drops_metric_name(op, return_bool) {
        many.without_metric_name()
    } else {
        many.clone()
    };

    if matching.card == Cardinality::OneToOne {
        labels = if matching.on {
            labels.keep(&matching.labels)
        } else {
            labels.drop_names(&matching.labels)
        };
    }

    for name in &matching.include {
        // Empty values remove the label
        labels.set(name.clone(), one.get(name));
    }

    labels
}

/// Apply an operator between two vectors
pub fn vector_vector(
    op: BinaryOp,
    lhs: Vector,
    rhs: Vector,
    matching: &VectorMatching,
    return_bool: bool,
    ts: i64,
) -> PromqlResult<Vector> {
    match op {
        BinaryOp::And => Ok(vector_and(lhs, rhs, matching, ts)),
        BinaryOp::Or => Ok(vector_or(lhs, rhs, matching, ts)),
        BinaryOp::Unless => Ok(vector_unless(lhs, rhs, matching, ts)),
        _ => vector_arithmetic(op, lhs, rhs, matching, return_bool, ts),
    }
}

fn vector_and(lhs: Vector, rhs: Vector, matching: &VectorMatching, ts: i64) -> Vector {
    let right: HashSet<Labels> = rhs.iter().map(|s| signature(&s.labels, matching)).collect();
    lhs.into_iter()
        .filter(|s| right.contains(&signature(&s.labels, matching)))
        .map(|s| Sample { t: ts, ..s })
        .collect()
}

fn vector_or(lhs: Vector, rhs: Vector, matching: &VectorMatching, ts: i64) -> Vector {
    let left: HashSet<Labels> = lhs.iter().map(|s| signature(&s.labels, matching)).collect();
    let mut out: Vector = lhs.into_iter().map(|s| Sample { t: ts, ..s }).collect();
    out.extend(
        rhs.into_iter()
            .filter(|s| !left.contains(&signature(&s.labels, matching)))
            .map(|s| Sample { t: ts, ..s }),
    );
    out
}

fn vector_unless(lhs: Vector, rhs: Vector, matching: &VectorMatching, ts: i64) -> Vector {
    let right: HashSet<Labels> = rhs.iter().map(|s| signature(&s.labels, matching)).collect();
    lhs.into_iter()
        .filter(|s| !right.contains(&signature(&s.labels, matching)))
        .map(|s| Sample { t: ts, ..s })
        .collect()
}

fn vector_arithmetic(
    op: BinaryOp,
    lhs: Vector,
    rhs: Vector,
    matching: &VectorMatching,
    return_bool: bool,
    ts: i64,
) -> PromqlResult<Vector> {
    // For group_right the right side is the "many" side
    let swapped = matching.card == Cardinality::OneToMany;
    let (many, one) = if swapped { (rhs, lhs) } else { (lhs, rhs) };

    let mut one_side: HashMap<Labels, Sample> = HashMap::new();
    for sample in one {
        let sig = signature(&sample.labels, matching);
        if one_side.contains_key(&sig) {
            let side = if swapped { "left" } else { "right" };
            return Err(PromqlError::Execution(format!(
                "found duplicate series for the match group {} on the {} hand-side of the operation; many-to-many matching not allowed: matching labels must be unique on one side",
                sig, side
            )));
        }
        one_side.insert(sig, sample);
    }

    let mut matched_one_to_one: HashSet<Labels> = HashSet::new();
    let mut seen_outputs: HashSet<Labels> = HashSet::new();
    let mut out = Vector::new();

    for sample in many {
        let sig = signature(&sample.labels, matching);
        let Some(other) = one_side.get(&sig) else {
            continue;
        };

        let (lv, rv) = if swapped {
            (other.v, sample.v)
        } else {
            (sample.v, other.v)
        };
        let (mut value, keep) = scalar_binop(op, lv, rv);
        if return_bool {
            value = if keep { 1.0 } else { 0.0 };
        } else if !keep {
            continue;
        }

        let labels = result_labels(&sample.labels, &other.labels, op, return_bool, matching);

        if matching.card == Cardinality::OneToOne {
            if !matched_one_to_one.insert(sig) {
                return Err(PromqlError::Execution(
                    "multiple matches for labels: many-to-one matching must be explicit (group_left/group_right)"
                        .to_string(),
                ));
            }
        } else if !seen_outputs.insert(labels.clone()) {
            return Err(PromqlError::Execution(format!(
                "multiple matches for labels: grouping labels must ensure unique matches ({})",
                labels
            )));
        }

        out.push(Sample { labels, t: ts, v: value });
    }

    Ok(out)
}
