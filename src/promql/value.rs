//! Query result values

use super::labels::Labels;

/// One timestamped value. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub t: i64,
    pub v: f64,
}

/// A labelled sample of an instant vector
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub t: i64,
    pub v: f64,
}

/// A labelled series of points
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: Labels,
    pub points: Vec<Point>,
}

impl Series {
    pub fn new(labels: Labels, points: Vec<Point>) -> Self {
        Self { labels, points }
    }
}

pub type Vector = Vec<Sample>;
pub type Matrix = Vec<Series>;

/// The result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar { t: i64, v: f64 },
    String { t: i64, s: String },
    Vector(Vector),
    Matrix(Matrix),
}

impl Value {
    /// Number of samples/points held, for sample limits
    pub fn sample_count(&self) -> usize {
        match self {
            Value::Scalar { .. } | Value::String { .. } => 1,
            Value::Vector(v) => v.len(),
            Value::Matrix(m) => m.iter().map(|s| s.points.len()).sum(),
        }
    }

    /// Whether the result holds no samples at all
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar { .. } | Value::String { .. } => false,
            Value::Vector(v) => v.is_empty(),
            Value::Matrix(m) => m.is_empty(),
        }
    }
}
