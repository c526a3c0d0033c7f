//! Static type checking of parsed expressions

use super::ast::{BinaryExpr, Cardinality, Expr, ValueType};
use super::error::{PromqlError, PromqlResult};
use super::labels::METRIC_NAME;

fn type_error(message: impl Into<String>) -> PromqlError {
    PromqlError::Type(message.into())
}

/// Check an expression tree bottom-up
pub fn check(expr: &Expr) -> PromqlResult<()> {
    match expr {
        Expr::Number(_) | Expr::String(_) => Ok(()),

        Expr::Vector(sel) => {
            if sel.name.is_some() && sel.matchers.iter().any(|m| m.name == METRIC_NAME) {
                return Err(type_error(format!(
                    "metric name must not be set twice: {:?} or {:?}",
                    sel.name.as_deref().unwrap_or_default(),
                    sel.matchers
                        .iter()
                        .find(|m| m.name == METRIC_NAME)
                        .map(|m| m.value.as_str())
                        .unwrap_or_default()
                )));
            }
            if !sel.has_non_empty_matcher() {
                return Err(type_error(
                    "vector selector must contain at least one non-empty matcher",
                ));
            }
            Ok(())
        }

        Expr::Matrix(m) => check(&Expr::Vector(m.selector.clone())),

        Expr::Subquery(sq) => {
            check(&sq.expr)?;
            let inner = sq.expr.value_type();
            if inner != ValueType::Vector {
                return Err(type_error(format!(
                    "subquery is only allowed on instant vector, got {} instead",
                    inner
                )));
            }
            Ok(())
        }

        Expr::Paren(inner) => check(inner),

        Expr::Negation(inner) => {
            check(inner)?;
            let t = inner.value_type();
            if t != ValueType::Scalar && t != ValueType::Vector {
                return Err(type_error(format!(
                    "unary expression only allowed on expressions of type scalar or instant vector, got {:?}",
                    t.to_string()
                )));
            }
            Ok(())
        }

        Expr::Binary(b) => check_binary(b),

        Expr::Aggregate(a) => {
            check(&a.expr)?;
            let t = a.expr.value_type();
            if t != ValueType::Vector {
                return Err(type_error(format!(
                    "expected type {} in aggregation expression, got {}",
                    ValueType::Vector,
                    t
                )));
            }

            match (&a.param, a.op.takes_param()) {
                (Some(param), true) => {
                    check(param)?;
                    let pt = param.value_type();
                    let expected = a.op.param_type();
                    if pt != expected {
                        return Err(type_error(format!(
                            "expected type {} in aggregation parameter, got {}",
                            expected, pt
                        )));
                    }
                    Ok(())
                }
                (None, true) => Err(type_error(format!("no parameter given to {}", a.op))),
                (Some(_), false) => Err(type_error(format!("{} does not take a parameter", a.op))),
                (None, false) => Ok(()),
            }
        }

        Expr::Call(call) => {
            let func = call.func;
            let nargs = func.arg_types.len();
            let given = call.args.len();

            if func.variadic == 0 {
                if given != nargs {
                    return Err(type_error(format!(
                        "expected {} argument(s) in call to {:?}, got {}",
                        nargs, func.name, given
                    )));
                }
            } else {
                let min = nargs.saturating_sub(1);
                if given < min {
                    return Err(type_error(format!(
                        "expected at least {} argument(s) in call to {:?}, got {}",
                        min, func.name, given
                    )));
                }
                let max = usize::try_from(func.variadic).map_or(usize::MAX, |extra| min + extra);
                if given > max {
                    return Err(type_error(format!(
                        "expected at most {} argument(s) in call to {:?}, got {}",
                        max, func.name, given
                    )));
                }
            }

            for (i, arg) in call.args.iter().enumerate() {
                check(arg)?;
                let expected = func.arg_types[i.min(nargs.saturating_sub(1))];
                let actual = arg.value_type();
                if actual != expected {
                    return Err(type_error(format!(
                        "expected type {} in call to function {:?}, got {}",
                        expected, func.name, actual
                    )));
                }
            }
            Ok(())
        }
    }
}

fn check_binary(b: &BinaryExpr) -> PromqlResult<()> {
    check(&b.lhs)?;
    check(&b.rhs)?;

    let lt = b.lhs.value_type();
    let rt = b.rhs.value_type();
    let operand_ok = |t: ValueType| t == ValueType::Scalar || t == ValueType::Vector;

    if !operand_ok(lt) || !operand_ok(rt) {
        return Err(type_error(
            "binary expression must contain only scalar and instant vector types",
        ));
    }

    if b.return_bool && !b.op.is_comparison() {
        return Err(type_error("bool modifier can only be used on comparison operators"));
    }

    if b.op.is_comparison() && !b.return_bool && lt == ValueType::Scalar && rt == ValueType::Scalar {
        return Err(type_error("comparisons between scalars must use BOOL modifier"));
    }

    let both_vectors = lt == ValueType::Vector && rt == ValueType::Vector;

    if b.op.is_set_operator() {
        if !both_vectors {
            let side = if lt == ValueType::Scalar { "left" } else { "right" };
            return Err(type_error(format!(
                "set operator {:?} not allowed in binary scalar expression ({} operand)",
                b.op.to_string(),
                side
            )));
        }
        if let Some(m) = &b.matching {
            if m.card != Cardinality::OneToOne {
                return Err(type_error(format!(
                    "no grouping allowed for {:?} operation",
                    b.op.to_string()
                )));
            }
        }
    }

    if let Some(m) = &b.matching {
        let explicit = m.on || !m.labels.is_empty() || m.card != Cardinality::OneToOne;
        if explicit && !both_vectors {
            return Err(type_error("vector matching only allowed between instant vectors"));
        }
        if m.card != Cardinality::OneToOne && m.on {
            if let Some(label) = m.include.iter().find(|l| m.labels.contains(l)) {
                return Err(type_error(format!(
                    "label {:?} must not occur in ON and GROUP clause at once",
                    label
                )));
            }
        }
    }

    Ok(())
}
