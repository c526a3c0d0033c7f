//! PromQL Parser
//!
//! Parses PromQL strings into an [`Expr`] tree and type-checks the result.
//!
//! # Supported Syntax
//!
//! ```text
//! http_requests_total{job="api", code=~"5.."}[5m] offset 1h @ 1609459200
//! sum by (job) (rate(http_requests_total[5m]))
//! max_over_time(rate(x[1m])[1h:30s])
//! a / on (instance) group_left (team) b
//! -x ^ 2 > bool 3
//! ```
//!
//! Binary operators bind in the usual PromQL order, loosest first: `or`,
//! `and`/`unless`, comparisons, `+`/`-`, `*`/`/`/`%`/`atan2`, `^`. Only `^`
//! is right-associative. Unary minus binds tighter than `*` and looser than `^`.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, hex_digit1, multispace1, not_line_ending},
    combinator::{map, map_res, opt, recognize, value},
    error::{ErrorKind, FromExternalError, ParseError},
    multi::many0,
    number::complete::recognize_float,
    sequence::{pair, preceded},
    IResult,
};

use super::ast::*;
use super::check::check;
use super::duration::duration_ms;
use super::error::{PromqlError, PromqlResult};
use super::functions::get_function;
use super::labels::{LabelMatcher, MatchOp};

/// Parser error carrying a readable message and the remaining input
#[derive(Debug, PartialEq)]
pub struct SyntaxError<'a> {
    input: &'a str,
    message: String,
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        Self {
            input,
            message: format!("unexpected input ({:?})", kind),
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a> FromExternalError<&'a str, String> for SyntaxError<'a> {
    fn from_external_error(input: &'a str, _kind: ErrorKind, message: String) -> Self {
        Self { input, message }
    }
}

type PResult<'a, T> = IResult<&'a str, T, SyntaxError<'a>>;

/// Abort parsing with a message; no alternative will be tried
fn fail<'a, T>(input: &'a str, message: impl Into<String>) -> PResult<'a, T> {
    Err(nom::Err::Failure(SyntaxError {
        input,
        message: message.into(),
    }))
}

/// Parse and type-check a PromQL expression
pub fn parse_expr(input: &str) -> PromqlResult<Expr> {
    let (rest, _) = ws(input).map_err(|e| to_error(input, e))?;
    if rest.is_empty() {
        return Err(PromqlError::Parse("no expression found in input".to_string()));
    }

    let expr = match expression(rest, 0) {
        Ok((remaining, expr)) => {
            let (remaining, _) = ws(remaining).map_err(|e| to_error(input, e))?;
            if !remaining.is_empty() {
                return Err(PromqlError::Parse(format!(
                    "unexpected {:?} at position {}",
                    truncate(remaining),
                    position(input, remaining)
                )));
            }
            expr
        }
        Err(e) => return Err(to_error(input, e)),
    };

    check(&expr)?;
    Ok(expr)
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(20) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn position(input: &str, remaining: &str) -> usize {
    input.len() - remaining.len()
}

fn to_error(input: &str, e: nom::Err<SyntaxError<'_>>) -> PromqlError {
    match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => PromqlError::Parse(format!(
            "{} at position {}",
            e.message,
            position(input, e.input)
        )),
        nom::Err::Incomplete(_) => PromqlError::Parse("unexpected end of input".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Lexical helpers
// ---------------------------------------------------------------------------

/// Skip whitespace and `#` comments
fn ws(input: &str) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            recognize(pair(char('#'), not_line_ending)),
        ))),
    )(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Metric names, function names and keywords
fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(take_while1(is_ident_start), take_while(is_ident_char)))(input)
}

fn label_name(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// A case-insensitive keyword not followed by another identifier character
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag_no_case(word)(input)?;
        match rest.chars().next() {
            Some(c) if is_ident_char(c) => Err(nom::Err::Error(SyntaxError::from_error_kind(
                input,
                ErrorKind::Tag,
            ))),
            _ => Ok((rest, matched)),
        }
    }
}

const RESERVED: &[&str] = &[
    "and",
    "or",
    "unless",
    "atan2",
    "by",
    "without",
    "on",
    "ignoring",
    "group_left",
    "group_right",
    "bool",
    "offset",
];

/// An optional duration; malformed durations such as `30m1h` still fail
fn duration<'a>(input: &'a str) -> PResult<'a, i64> {
    match duration_ms::<SyntaxError<'a>>(input) {
        Err(nom::Err::Error(e)) if !e.message.starts_with("unexpected input") => fail(input, e.message),
        other => other,
    }
}

/// A duration that must be present
fn required_duration<'a>(input: &'a str) -> PResult<'a, i64> {
    match duration(input) {
        Err(nom::Err::Error(_)) => fail(input, "expected a duration such as 5m or 1h30m"),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

fn number(input: &str) -> PResult<'_, f64> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |h: &str| {
            i64::from_str_radix(h, 16)
                .map(|v| v as f64)
                .map_err(|e| format!("invalid hex literal: {}", e))
        }),
        map_res(
            recognize(pair(
                take_while1(|c: char| c.is_ascii_digit() || c == '.'),
                recognize_float_tail,
            )),
            |s: &str| {
                s.parse::<f64>()
                    .map_err(|_| format!("invalid number literal {:?}", s))
            },
        ),
    ))(input)
}

/// Exponent part of a float literal, if any
fn recognize_float_tail(input: &str) -> PResult<'_, &str> {
    recognize(opt(pair(
        alt((char('e'), char('E'))),
        pair(
            opt(alt((char('+'), char('-')))),
            take_while1(|c: char| c.is_ascii_digit()),
        ),
    )))(input)
}

/// Signed float used by `@`, e.g. `@ 1609459200.5` or `@ -10`
fn signed_float(input: &str) -> PResult<'_, f64> {
    map_res(recognize_float, |s: &str| {
        s.parse::<f64>().map_err(|_| format!("invalid timestamp {:?}", s))
    })(input)
}

fn string_literal(input: &str) -> PResult<'_, String> {
    let quote = match input.chars().next() {
        Some(q @ ('"' | '\'' | '`')) => q,
        _ => {
            return Err(nom::Err::Error(SyntaxError::from_error_kind(
                input,
                ErrorKind::Char,
            )))
        }
    };

    let mut out = String::new();
    let mut chars = input[1..].char_indices();

    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&input[1 + i + c.len_utf8()..], out));
        }
        if c == '\\' && quote != '`' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, 'a')) => out.push('\x07'),
                Some((_, 'b')) => out.push('\x08'),
                Some((_, 'f')) => out.push('\x0c'),
                Some((_, 'v')) => out.push('\x0b'),
                Some((_, escaped @ ('\\' | '"' | '\'' | '`'))) => out.push(escaped),
                Some((_, other)) => {
                    return fail(input, format!("unknown escape sequence \\{}", other))
                }
                None => break,
            }
            continue;
        }
        if c == '\n' && quote != '`' {
            break;
        }
        out.push(c);
    }

    fail(input, "unterminated quoted string")
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

fn match_op(input: &str) -> PResult<'_, MatchOp> {
    alt((
        value(MatchOp::Regex, tag("=~")),
        value(MatchOp::NotRegex, tag("!~")),
        value(MatchOp::NotEqual, tag("!=")),
        value(MatchOp::Equal, tag("=")),
    ))(input)
}

fn label_matcher(input: &str) -> PResult<'_, LabelMatcher> {
    let (input, name) = label_name(input)?;
    let (input, _) = ws(input)?;
    let (after_op, op) = match match_op(input) {
        Ok(ok) => ok,
        Err(_) => return fail(input, format!("expected label matching operator after {:?}", name)),
    };
    let (after_ws, _) = ws(after_op)?;
    let (rest, value) = match string_literal(after_ws) {
        Ok(ok) => ok,
        Err(nom::Err::Error(_)) => return fail(after_ws, "expected string literal as label value"),
        Err(e) => return Err(e),
    };

    match LabelMatcher::new(op, name, value) {
        Ok(matcher) => Ok((rest, matcher)),
        Err(e) => fail(after_ws, e.to_string()),
    }
}

/// `{a="b", c!~"d",}`
fn label_matchers(input: &str) -> PResult<'_, Vec<LabelMatcher>> {
    let (mut input, _) = char('{')(input)?;
    let mut matchers = Vec::new();

    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = char::<_, SyntaxError>('}')(rest) {
            return Ok((rest, matchers));
        }

        let (rest, matcher) = match label_matcher(rest) {
            Ok(ok) => ok,
            Err(nom::Err::Error(_)) => return fail(rest, "expected label matcher or '}'"),
            Err(e) => return Err(e),
        };
        matchers.push(matcher);

        let (rest, _) = ws(rest)?;
        input = match char::<_, SyntaxError>(',')(rest) {
            Ok((rest, _)) => rest,
            Err(_) => match char::<_, SyntaxError>('}')(rest) {
                Ok((rest, _)) => return Ok((rest, matchers)),
                Err(_) => return fail(rest, "expected ',' or '}' in label matchers"),
            },
        };
    }
}

/// `(a, b,)`, as used by `by`, `without`, `on`, `ignoring` and `group_x`
fn label_list(input: &str) -> PResult<'_, Vec<String>> {
    let (mut input, _) = char('(')(input)?;
    let mut labels = Vec::new();

    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = char::<_, SyntaxError>(')')(rest) {
            return Ok((rest, labels));
        }

        let (rest, name) = match label_name(rest) {
            Ok(ok) => ok,
            Err(_) => return fail(rest, "expected label name in grouping list"),
        };
        labels.push(name.to_string());

        let (rest, _) = ws(rest)?;
        input = match char::<_, SyntaxError>(',')(rest) {
            Ok((rest, _)) => rest,
            Err(_) => match char::<_, SyntaxError>(')')(rest) {
                Ok((rest, _)) => return Ok((rest, labels)),
                Err(_) => return fail(rest, "expected ',' or ')' in grouping list"),
            },
        };
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn binary_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Gte, tag(">=")),
        value(BinaryOp::Lte, tag("<=")),
        value(BinaryOp::Gt, tag(">")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Add, tag("+")),
        value(BinaryOp::Sub, tag("-")),
        value(BinaryOp::Mul, tag("*")),
        value(BinaryOp::Div, tag("/")),
        value(BinaryOp::Mod, tag("%")),
        value(BinaryOp::Pow, tag("^")),
        value(BinaryOp::And, keyword("and")),
        value(BinaryOp::Or, keyword("or")),
        value(BinaryOp::Unless, keyword("unless")),
        value(BinaryOp::Atan2, keyword("atan2")),
    ))(input)
}

/// `bool`, `on(...)`/`ignoring(...)` and `group_left(...)`/`group_right(...)`
fn binary_modifiers(input: &str) -> PResult<'_, (bool, Option<VectorMatching>)> {
    let (input, _) = ws(input)?;
    let (input, return_bool) = map(opt(keyword("bool")), |b| b.is_some())(input)?;
    let (input, _) = ws(input)?;

    let (input, on) = opt(alt((value(true, keyword("on")), value(false, keyword("ignoring")))))(input)?;
    let Some(on) = on else {
        return Ok((input, (return_bool, None)));
    };

    let (input, _) = ws(input)?;
    let (input, labels) = match label_list(input) {
        Ok(ok) => ok,
        Err(nom::Err::Error(_)) => return fail(input, "expected '(' after on/ignoring"),
        Err(e) => return Err(e),
    };
    let (input, _) = ws(input)?;

    let (input, card) = opt(alt((
        value(Cardinality::ManyToOne, keyword("group_left")),
        value(Cardinality::OneToMany, keyword("group_right")),
    )))(input)?;

    let (input, card, include) = match card {
        Some(card) => {
            let (input, _) = ws(input)?;
            let (input, include) = opt(label_list)(input)?;
            (input, card, include.unwrap_or_default())
        }
        None => (input, Cardinality::OneToOne, Vec::new()),
    };

    Ok((
        input,
        (
            return_bool,
            Some(VectorMatching {
                card,
                on,
                labels,
                include,
            }),
        ),
    ))
}

/// Precedence climbing over binary operators
fn expression(input: &str, min_precedence: u8) -> PResult<'_, Expr> {
    let (mut input, mut lhs) = unary(input)?;

    loop {
        let (rest, _) = ws(input)?;
        let (rest, op) = match binary_op(rest) {
            Ok(ok) => ok,
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        };
        if op.precedence() < min_precedence {
            break;
        }

        let (rest, (return_bool, matching)) = binary_modifiers(rest)?;
        let next_min = if op.is_right_associative() {
            op.precedence()
        } else {
            op.precedence() + 1
        };

        let (rest, _) = ws(rest)?;
        let (rest, rhs) = match expression(rest, next_min) {
            Ok(ok) => ok,
            Err(nom::Err::Error(_)) => {
                return fail(rest, format!("expected expression after operator {:?}", op.to_string()))
            }
            Err(e) => return Err(e),
        };

        lhs = Expr::Binary(BinaryExpr {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            return_bool,
            matching,
        });
        input = rest;
    }

    Ok((input, lhs))
}

fn unary(input: &str) -> PResult<'_, Expr> {
    let (input, _) = ws(input)?;

    if let Ok((rest, sign)) = alt((char::<_, SyntaxError>('-'), char('+')))(input) {
        let (rest, _) = ws(rest)?;
        let (rest, operand) = expression(rest, BinaryOp::Pow.precedence())?;
        let expr = match (sign, operand) {
            ('+', operand) => operand,
            (_, Expr::Number(v)) => Expr::Number(-v),
            (_, operand) => Expr::Negation(Box::new(operand)),
        };
        return Ok((rest, expr));
    }

    postfix(input)
}

/// `name()` with optional inner whitespace
fn empty_call<'a>(name: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    recognize(pair(
        keyword(name),
        pair(pair(ws, char('(')), pair(ws, char(')'))),
    ))
}

fn at_modifier(input: &str) -> PResult<'_, AtModifier> {
    let (input, _) = ws(input)?;
    let (input, _) = char('@')(input)?;
    let (input, _) = ws(input)?;

    if let Ok((rest, _)) = empty_call("start")(input) {
        return Ok((rest, AtModifier::Start));
    }
    if let Ok((rest, _)) = empty_call("end")(input) {
        return Ok((rest, AtModifier::End));
    }

    match signed_float(input) {
        Ok((rest, secs)) if secs.is_finite() => Ok((rest, AtModifier::Timestamp((secs * 1000.0).round() as i64))),
        Ok(_) => fail(input, "timestamp out of bounds for @ modifier"),
        Err(_) => fail(input, "expected timestamp, start() or end() after @"),
    }
}

fn offset_modifier(input: &str) -> PResult<'_, i64> {
    let (input, _) = ws(input)?;
    let (input, _) = keyword("offset")(input)?;
    let (input, _) = ws(input)?;
    let (input, negative) = map(opt(char('-')), |c| c.is_some())(input)?;
    let (input, d) = required_duration(input)?;
    Ok((input, if negative { -d } else { d }))
}

/// `[range]` or `[range:step]` / `[range:]`
fn bracket(input: &str) -> PResult<'_, (i64, Option<Option<i64>>)> {
    let (input, _) = ws(input)?;
    let (input, _) = char('[')(input)?;
    let (input, _) = ws(input)?;
    let (input, range) = required_duration(input)?;
    let (input, _) = ws(input)?;

    let (input, step) = match char::<_, SyntaxError>(':')(input) {
        Ok((rest, _)) => {
            let (rest, _) = ws(rest)?;
            let (rest, step) = opt(duration)(rest)?;
            let (rest, _) = ws(rest)?;
            (rest, Some(step))
        }
        Err(_) => (input, None),
    };

    match char::<_, SyntaxError>(']')(input) {
        Ok((rest, _)) => Ok((rest, (range, step))),
        Err(_) => fail(input, "expected ']'"),
    }
}

/// Turn a recoverable error into `None`, keeping failures
fn optional<'a, T>(result: PResult<'a, T>) -> Result<Option<(&'a str, T)>, nom::Err<SyntaxError<'a>>> {
    match result {
        Ok(ok) => Ok(Some(ok)),
        Err(nom::Err::Error(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// A primary expression followed by any `[...]`, `offset` and `@` modifiers
fn postfix(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = primary(input)?;

    loop {
        if let Some((rest, (range, step))) = optional(bracket(input))? {
            expr = match (expr, step) {
                (Expr::Vector(sel), None) if sel.offset == 0 && sel.at.is_none() => {
                    Expr::Matrix(MatrixSelector { selector: sel, range })
                }
                (Expr::Vector(_), None) => {
                    return fail(input, "no offset or @ modifiers allowed before range")
                }
                (_, None) => {
                    return fail(input, "ranges only allowed for vector selectors")
                }
                (inner, Some(step)) => Expr::Subquery(SubqueryExpr {
                    expr: Box::new(inner),
                    range,
                    step,
                    offset: 0,
                    at: None,
                }),
            };
            input = rest;
            continue;
        }

        if let Some((rest, offset)) = optional(offset_modifier(input))? {
            let slot = match &mut expr {
                Expr::Vector(sel) => &mut sel.offset,
                Expr::Matrix(m) => &mut m.selector.offset,
                Expr::Subquery(sq) => &mut sq.offset,
                _ => {
                    return fail(
                        input,
                        "offset modifier must be preceded by an instant vector selector or range vector selector or a subquery",
                    )
                }
            };
            if *slot != 0 {
                return fail(input, "offset may not be set multiple times");
            }
            *slot = offset;
            input = rest;
            continue;
        }

        if let Some((rest, at)) = optional(at_modifier(input))? {
            let slot = match &mut expr {
                Expr::Vector(sel) => &mut sel.at,
                Expr::Matrix(m) => &mut m.selector.at,
                Expr::Subquery(sq) => &mut sq.at,
                _ => {
                    return fail(
                        input,
                        "@ modifier must be preceded by an instant vector selector or range vector selector or a subquery",
                    )
                }
            };
            if slot.is_some() {
                return fail(input, "@ <timestamp> may not be set multiple times");
            }
            *slot = Some(at);
            input = rest;
            continue;
        }

        return Ok((input, expr));
    }
}

fn primary(input: &str) -> PResult<'_, Expr> {
    let (input, _) = ws(input)?;

    match input.chars().next() {
        None => fail(input, "unexpected end of input"),
        Some('(') => paren(input),
        Some('"' | '\'' | '`') => map(string_literal, Expr::String)(input),
        Some('{') => {
            let (rest, matchers) = label_matchers(input)?;
            Ok((rest, Expr::Vector(VectorSelector::new(None, matchers))))
        }
        Some(c) if c.is_ascii_digit() || c == '.' => map(number, Expr::Number)(input),
        Some(c) if is_ident_start(c) => identifier_expr(input),
        Some(c) => fail(input, format!("unexpected character {:?}", c)),
    }
}

fn paren(input: &str) -> PResult<'_, Expr> {
    let (input, _) = char('(')(input)?;
    let (input, inner) = expression(input, 0)?;
    let (input, _) = ws(input)?;
    match char::<_, SyntaxError>(')')(input) {
        Ok((rest, _)) => Ok((rest, Expr::Paren(Box::new(inner)))),
        Err(_) => fail(input, "unclosed left parenthesis"),
    }
}

/// Aggregation, function call, Inf/NaN, or metric selector
fn identifier_expr(input: &str) -> PResult<'_, Expr> {
    let (rest, ident) = identifier(input)?;
    let (after_ws, _) = ws(rest)?;
    let lower = ident.to_lowercase();

    if let Some(op) = AggregateOp::from_keyword(ident) {
        let starts_body = after_ws.starts_with('(')
            || keyword("by")(after_ws).is_ok()
            || keyword("without")(after_ws).is_ok();
        if starts_body {
            return aggregation(op, after_ws);
        }
    }

    if after_ws.starts_with('(') {
        let Some(func) = get_function(ident) else {
            return fail(input, format!("unknown function with name {:?}", ident));
        };
        let (rest, args) = call_args(after_ws)?;
        return Ok((rest, Expr::Call(Call { func, args })));
    }

    if lower == "inf" {
        return Ok((rest, Expr::Number(f64::INFINITY)));
    }
    if lower == "nan" {
        return Ok((rest, Expr::Number(f64::NAN)));
    }
    if RESERVED.contains(&lower.as_str()) || AggregateOp::from_keyword(ident).is_some() {
        return fail(input, format!("unexpected keyword {:?}", ident));
    }

    let (rest_after_matchers, matchers) = match label_matchers(after_ws) {
        Ok((r, m)) => (r, m),
        Err(nom::Err::Error(_)) => (rest, Vec::new()),
        Err(e) => return Err(e),
    };

    Ok((
        rest_after_matchers,
        Expr::Vector(VectorSelector::new(Some(ident.to_string()), matchers)),
    ))
}

/// `(expr, expr, ...)`
fn call_args(input: &str) -> PResult<'_, Vec<Expr>> {
    let (mut input, _) = char('(')(input)?;
    let mut args = Vec::new();

    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = char::<_, SyntaxError>(')')(rest) {
            return Ok((rest, args));
        }

        let (rest, arg) = expression(rest, 0)?;
        args.push(arg);

        let (rest, _) = ws(rest)?;
        input = match char::<_, SyntaxError>(',')(rest) {
            Ok((rest, _)) => rest,
            Err(_) => match char::<_, SyntaxError>(')')(rest) {
                Ok((rest, _)) => return Ok((rest, args)),
                Err(_) => return fail(rest, "expected ',' or ')' in function call"),
            },
        };
    }
}

fn grouping(input: &str) -> PResult<'_, (bool, Vec<String>)> {
    let (input, without) = alt((value(false, keyword("by")), value(true, keyword("without"))))(input)?;
    let (input, _) = ws(input)?;
    match label_list(input) {
        Ok((rest, labels)) => Ok((rest, (without, labels))),
        Err(nom::Err::Error(_)) => fail(input, "expected '(' after by/without"),
        Err(e) => Err(e),
    }
}

/// `op [by|without (...)] ([param,] expr) [by|without (...)]`
fn aggregation(op: AggregateOp, input: &str) -> PResult<'_, Expr> {
    let (input, leading) = opt(grouping)(input)?;
    let (input, _) = ws(input)?;

    let (input, mut args) = match call_args(input) {
        Ok(ok) => ok,
        Err(nom::Err::Error(_)) => return fail(input, format!("expected '(' in aggregation {}", op)),
        Err(e) => return Err(e),
    };

    let (input, trailing) = if leading.is_none() {
        let (after_ws, _) = ws(input)?;
        match opt(grouping)(after_ws)? {
            (rest, Some(g)) => (rest, Some(g)),
            (_, None) => (input, None),
        }
    } else {
        (input, None)
    };

    let expected = if op.takes_param() { 2 } else { 1 };
    if args.len() != expected {
        return fail(
            input,
            format!("wrong number of arguments for aggregate expression provided, expected {}, got {}", expected, args.len()),
        );
    }

    let expr = args.pop().map(Box::new);
    let param = args.pop().map(Box::new);
    let (without, grouping) = leading.or(trailing).unwrap_or((false, Vec::new()));

    match expr {
        Some(expr) => Ok((
            input,
            Expr::Aggregate(AggregateExpr {
                op,
                expr,
                param,
                grouping,
                without,
            }),
        )),
        None => fail(input, "aggregation without an expression"),
    }
}
