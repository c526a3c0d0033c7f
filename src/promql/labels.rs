//! Label sets and label matchers

use super::error::{PromqlError, PromqlResult};
use regex::Regex;
use std::collections::BTreeMap;

/// Label holding the metric name
pub const METRIC_NAME: &str = "__name__";

/// Whether `name` matches `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A sorted set of label name/value pairs identifying a series
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    /// Create an empty label set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a label set from name/value pairs
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Value of a label, or `""` when absent (PromQL treats both alike)
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or("")
    }

    /// Set a label; an empty value removes it
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let name = name.into();
        if value.is_empty() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy without the metric name
    pub fn without_metric_name(&self) -> Self {
        let mut labels = self.clone();
        labels.remove(METRIC_NAME);
        labels
    }

    /// Copy keeping only the given names
    pub fn keep(&self, names: &[String]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| names.iter().any(|n| n == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Copy dropping the given names
    pub fn drop_names(&self, names: &[String]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !names.iter().any(|n| n == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Whether every matcher accepts this label set
    pub fn matches(&self, matchers: &[LabelMatcher]) -> bool {
        matchers.iter().all(|m| m.matches(self.get(&m.name)))
    }
}

impl std::fmt::Display for Labels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Label matching operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `=~`
    Regex,
    /// `!~`
    NotRegex,
}

impl std::fmt::Display for MatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::Regex => write!(f, "=~"),
            Self::NotRegex => write!(f, "!~"),
        }
    }
}

/// A single `name op "value"` condition of a selector
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
    regex: Option<Regex>,
}

impl LabelMatcher {
    /// Create a matcher. Regex values are anchored at both ends.
    pub fn new(op: MatchOp, name: impl Into<String>, value: impl Into<String>) -> PromqlResult<Self> {
        let value = value.into();
        let regex = match op {
            MatchOp::Regex | MatchOp::NotRegex => Some(
                Regex::new(&format!("^(?:{})$", value))
                    .map_err(|e| PromqlError::Parse(format!("invalid regular expression {:?}: {}", value, e)))?,
            ),
            MatchOp::Equal | MatchOp::NotEqual => None,
        };

        Ok(Self {
            name: name.into(),
            op,
            value,
            regex,
        })
    }

    /// Equality matcher, which cannot fail
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: MatchOp::Equal,
            value: value.into(),
            regex: None,
        }
    }

    /// Whether a label value satisfies this matcher
    pub fn matches(&self, value: &str) -> bool {
        match (self.op, &self.regex) {
            (MatchOp::Equal, _) => value == self.value,
            (MatchOp::NotEqual, _) => value != self.value,
            (MatchOp::Regex, Some(re)) => re.is_match(value),
            (MatchOp::NotRegex, Some(re)) => !re.is_match(value),
            (MatchOp::Regex | MatchOp::NotRegex, None) => false,
        }
    }
}

impl PartialEq for LabelMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.op == other.op && self.value == other.value
    }
}

impl std::fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.op, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchers() {
        let labels = Labels::from_pairs(&[("__name__", "up"), ("job", "api")]);

        assert!(labels.matches(&[LabelMatcher::equal("job", "api")]));
        assert!(!labels.matches(&[LabelMatcher::equal("job", "db")]));
        assert!(labels.matches(&[LabelMatcher::new(MatchOp::Regex, "job", "a.*").unwrap()]));
        assert!(!labels.matches(&[LabelMatcher::new(MatchOp::Regex, "job", "p.*").unwrap()]));
        assert!(labels.matches(&[LabelMatcher::new(MatchOp::NotEqual, "env", "prod").unwrap()]));
        // Absent labels compare as empty strings
        assert!(labels.matches(&[LabelMatcher::equal("env", "")]));
    }

    #[test]
    fn test_regex_is_anchored() {
        let matcher = LabelMatcher::new(MatchOp::Regex, "job", "api").unwrap();
        assert!(matcher.matches("api"));
        assert!(!matcher.matches("api-server"));
    }

    #[test]
    fn test_invalid_regex() {
        let result = LabelMatcher::new(MatchOp::Regex, "job", "(unclosed");
        assert!(matches!(result, Err(PromqlError::Parse(_))));
    }

    #[test]
    fn test_keep_and_drop() {
        let labels = Labels::from_pairs(&[("__name__", "up"), ("job", "api"), ("instance", "a")]);

        assert_eq!(labels.keep(&["job".to_string()]), Labels::from_pairs(&[("job", "api")]));
        assert_eq!(
            labels.drop_names(&["job".to_string()]).without_metric_name(),
            Labels::from_pairs(&[("instance", "a")])
        );
        assert_eq!(labels.to_string(), r#"{__name__="up", instance="a", job="api"}"#);
    }
}
