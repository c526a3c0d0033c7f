//! PromQL Abstract Syntax Tree
//!
//! Expression nodes produced by the parser. `Display` renders an expression
//! back into canonical PromQL, e.g. `sum by (job) (rate(http_requests_total[5m]))`.

use super::duration::format_duration;
use super::functions::Function;
use super::labels::{LabelMatcher, MatchOp, METRIC_NAME};
use super::value::Series;
use std::fmt;

/// Static type of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Scalar,
    String,
    Vector,
    Matrix,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::String => write!(f, "string"),
            Self::Vector => write!(f, "instant vector"),
            Self::Matrix => write!(f, "range vector"),
        }
    }
}

/// Target of an `@` modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtModifier {
    /// Fixed Unix timestamp in milliseconds
    Timestamp(i64),
    /// `@ start()`
    Start,
    /// `@ end()`
    End,
}

impl fmt::Display for AtModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(ms) => write!(f, "@ {:.3}", *ms as f64 / 1000.0),
            Self::Start => write!(f, "@ start()"),
            Self::End => write!(f, "@ end()"),
        }
    }
}

/// An instant vector selector such as `http_requests_total{job="api"} offset 5m`
#[derive(Debug, Clone)]
pub struct VectorSelector {
    /// Metric name given before the braces, if any
    pub name: Option<String>,
    /// Matchers given inside the braces
    pub matchers: Vec<LabelMatcher>,
    /// Offset in milliseconds
    pub offset: i64,
    pub at: Option<AtModifier>,
    /// Series fetched for this selector while preparing a query
    pub(crate) series: Vec<Series>,
}

impl VectorSelector {
    pub fn new(name: Option<String>, matchers: Vec<LabelMatcher>) -> Self {
        Self {
            name,
            matchers,
            offset: 0,
            at: None,
            series: Vec::new(),
        }
    }

    /// All matchers including the implicit metric name matcher
    pub fn all_matchers(&self) -> Vec<LabelMatcher> {
        let mut matchers = Vec::with_capacity(self.matchers.len() + 1);
        if let Some(name) = &self.name {
            matchers.push(LabelMatcher::equal(METRIC_NAME, name.clone()));
        }
        matchers.extend(self.matchers.iter().cloned());
        matchers
    }

    /// Whether at least one matcher rejects the empty string
    pub fn has_non_empty_matcher(&self) -> bool {
        self.name.is_some() || self.matchers.iter().any(|m| !m.matches(""))
    }

    fn fmt_base(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}", name)?;
        }
        if !self.matchers.is_empty() || self.name.is_none() {
            write!(f, "{{")?;
            for (i, m) in self.matchers.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", m)?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}

fn fmt_modifiers(f: &mut fmt::Formatter<'_>, offset: i64, at: Option<AtModifier>) -> fmt::Result {
    if let Some(at) = at {
        write!(f, " {}", at)?;
    }
    if offset != 0 {
        write!(f, " offset {}", format_duration(offset))?;
    }
    Ok(())
}

/// A range vector selector such as `http_requests_total[5m]`
#[derive(Debug, Clone)]
pub struct MatrixSelector {
    pub selector: VectorSelector,
    /// Range in milliseconds
    pub range: i64,
}

/// A subquery such as `rate(x[5m])[1h:1m]`
#[derive(Debug, Clone)]
pub struct SubqueryExpr {
    pub expr: Box<Expr>,
    /// Range in milliseconds
    pub range: i64,
    /// Step in milliseconds; `None` uses the engine default
    pub step: Option<i64>,
    /// Offset in milliseconds
    pub offset: i64,
    pub at: Option<AtModifier>,
}

/// Binary operators, in PromQL spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Atan2,
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    And,
    Or,
    Unless,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And | Self::Unless => 2,
            Self::Eq | Self::Ne | Self::Gt | Self::Lt | Self::Gte | Self::Lte => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::Mod | Self::Atan2 => 5,
            Self::Pow => 6,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, Self::Pow)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Gt | Self::Lt | Self::Gte | Self::Lte
        )
    }

    pub fn is_set_operator(&self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Unless)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Atan2 => "atan2",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::And => "and",
            Self::Or => "or",
            Self::Unless => "unless",
        };
        write!(f, "{}", s)
    }
}

/// How samples of two vectors are paired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
}

/// `on`/`ignoring` and `group_left`/`group_right` modifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMatching {
    pub card: Cardinality,
    /// `true` for `on(...)`, `false` for `ignoring(...)`
    pub on: bool,
    pub labels: Vec<String>,
    /// Extra labels copied from the "one" side by `group_x(...)`
    pub include: Vec<String>,
}

impl Default for VectorMatching {
    fn default() -> Self {
        Self {
            card: Cardinality::OneToOne,
            on: false,
            labels: Vec::new(),
            include: Vec::new(),
        }
    }
}

/// A binary operation
#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    /// `bool` modifier on a comparison
    pub return_bool: bool,
    pub matching: Option<VectorMatching>,
}

/// Aggregation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountValues,
    Group,
    Stddev,
    Stdvar,
    Topk,
    Bottomk,
    Quantile,
}

impl AggregateOp {
    /// Look up an aggregation keyword (case-insensitive)
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "count" => Some(Self::Count),
            "count_values" => Some(Self::CountValues),
            "group" => Some(Self::Group),
            "stddev" => Some(Self::Stddev),
            "stdvar" => Some(Self::Stdvar),
            "topk" => Some(Self::Topk),
            "bottomk" => Some(Self::Bottomk),
            "quantile" => Some(Self::Quantile),
            _ => None,
        }
    }

    /// Whether the aggregation takes a leading parameter
    pub fn takes_param(&self) -> bool {
        matches!(self, Self::Topk | Self::Bottomk | Self::Quantile | Self::CountValues)
    }

    /// Type the leading parameter must have
    pub fn param_type(&self) -> ValueType {
        match self {
            Self::CountValues => ValueType::String,
            _ => ValueType::Scalar,
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::CountValues => "count_values",
            Self::Group => "group",
            Self::Stddev => "stddev",
            Self::Stdvar => "stdvar",
            Self::Topk => "topk",
            Self::Bottomk => "bottomk",
            Self::Quantile => "quantile",
        };
        write!(f, "{}", s)
    }
}

/// An aggregation such as `sum by (job) (x)`
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub op: AggregateOp,
    pub expr: Box<Expr>,
    pub param: Option<Box<Expr>>,
    pub grouping: Vec<String>,
    pub without: bool,
}

/// A function call
#[derive(Debug, Clone)]
pub struct Call {
    pub func: &'static Function,
    pub args: Vec<Expr>,
}

/// A PromQL expression
#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    String(String),
    Vector(VectorSelector),
    Matrix(MatrixSelector),
    Subquery(SubqueryExpr),
    Paren(Box<Expr>),
    /// Unary minus
    Negation(Box<Expr>),
    Binary(BinaryExpr),
    Aggregate(AggregateExpr),
    Call(Call),
}

impl Expr {
    /// Static result type of the expression
    pub fn value_type(&self) -> ValueType {
        match self {
            Expr::Number(_) => ValueType::Scalar,
            Expr::String(_) => ValueType::String,
            Expr::Vector(_) => ValueType::Vector,
            Expr::Matrix(_) | Expr::Subquery(_) => ValueType::Matrix,
            Expr::Paren(inner) | Expr::Negation(inner) => inner.value_type(),
            Expr::Binary(b) => {
                if b.lhs.value_type() == ValueType::Scalar && b.rhs.value_type() == ValueType::Scalar {
                    ValueType::Scalar
                } else {
                    ValueType::Vector
                }
            }
            Expr::Aggregate(_) => ValueType::Vector,
            Expr::Call(call) => call.func.return_type,
        }
    }

    /// Strip any number of enclosing parentheses
    pub fn unparen(&self) -> &Expr {
        match self {
            Expr::Paren(inner) => inner.unparen(),
            other => other,
        }
    }
}

fn fmt_number(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        write!(f, "NaN")
    } else if v.is_infinite() {
        write!(f, "{}Inf", if v > 0.0 { "+" } else { "-" })
    } else {
        write!(f, "{}", v)
    }
}

fn join(labels: &[String]) -> String {
    labels.join(", ")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => fmt_number(f, *v),
            Expr::String(s) => write!(f, "{:?}", s),
            Expr::Vector(sel) => {
                sel.fmt_base(f)?;
                fmt_modifiers(f, sel.offset, sel.at)
            }
            Expr::Matrix(m) => {
                m.selector.fmt_base(f)?;
                write!(f, "[{}]", format_duration(m.range))?;
                fmt_modifiers(f, m.selector.offset, m.selector.at)
            }
            Expr::Subquery(s) => {
                write!(f, "{}[{}:", s.expr, format_duration(s.range))?;
                if let Some(step) = s.step {
                    write!(f, "{}", format_duration(step))?;
                }
                write!(f, "]")?;
                fmt_modifiers(f, s.offset, s.at)
            }
            Expr::Paren(inner) => write!(f, "({})", inner),
            Expr::Negation(inner) => write!(f, "-{}", inner),
            Expr::Binary(b) => {
                write!(f, "{} {}", b.lhs, b.op)?;
                if b.return_bool {
                    write!(f, " bool")?;
                }
                if let Some(m) = &b.matching {
                    if m.on || !m.labels.is_empty() {
                        let tag = if m.on { "on" } else { "ignoring" };
                        write!(f, " {} ({})", tag, join(&m.labels))?;
                    }
                    match m.card {
                        Cardinality::ManyToOne => write!(f, " group_left ({})", join(&m.include))?,
                        Cardinality::OneToMany => write!(f, " group_right ({})", join(&m.include))?,
                        Cardinality::OneToOne => {}
                    }
                }
                write!(f, " {}", b.rhs)
            }
            Expr::Aggregate(a) => {
                write!(f, "{}", a.op)?;
                if a.without {
                    write!(f, " without ({}) ", join(&a.grouping))?;
                } else if !a.grouping.is_empty() {
                    write!(f, " by ({}) ", join(&a.grouping))?;
                }
                write!(f, "(")?;
                if let Some(param) = &a.param {
                    write!(f, "{}, ", param)?;
                }
                write!(f, "{})", a.expr)
            }
            Expr::Call(call) => {
                write!(f, "{}(", call.func.name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for VectorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_base(f)?;
        fmt_modifiers(f, self.offset, self.at)
    }
}

/// Used by `absent()`: the labels a missing series would have carried
pub(crate) fn equality_labels(matchers: &[LabelMatcher]) -> Vec<(String, String)> {
    let mut seen: Vec<&str> = Vec::new();
    let mut duplicated: Vec<&str> = Vec::new();

    for m in matchers {
        if m.op == MatchOp::Equal && m.name != METRIC_NAME {
            if seen.contains(&m.name.as_str()) {
                duplicated.push(&m.name);
            } else {
                seen.push(&m.name);
            }
        }
    }

    matchers
        .iter()
        .filter(|m| m.op == MatchOp::Equal && m.name != METRIC_NAME)
        .filter(|m| !duplicated.contains(&m.name.as_str()))
        .map(|m| (m.name.clone(), m.value.clone()))
        .collect()
}
