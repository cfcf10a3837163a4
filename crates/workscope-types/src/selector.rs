//! Kubernetes label selectors
//!
//! Supports the equality-based (`a=b`, `a==b`, `a!=b`) and set-based
//! (`a in (x,y)`, `a notin (x)`, `a`, `!a`) forms accepted by the API server.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty requirement in selector '{0}'")]
    EmptyRequirement(String),
    #[error("invalid label key '{0}'")]
    InvalidKey(String),
    #[error("invalid label value '{0}'")]
    InvalidValue(String),
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("unbalanced parentheses in selector '{0}'")]
    Unbalanced(String),
}

/// A single selector requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::NotEquals(key, value) => labels.get(key) != Some(value),
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::NotIn(key, values) => !labels.get(key).is_some_and(|v| values.contains(v)),
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            Self::Equals(key, value) => write!(f, "{}={}", key, value),
            Self::NotEquals(key, value) => write!(f, "{}!={}", key, value),
            Self::In(key, values) => write!(f, "{} in ({})", key, join(values)),
            Self::NotIn(key, values) => write!(f, "{} notin ({})", key, join(values)),
            Self::Exists(key) => write!(f, "{}", key),
            Self::DoesNotExist(key) => write!(f, "!{}", key),
        }
    }
}

/// A conjunction of label requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Selector that matches every label set
    pub fn everything() -> Self {
        Self::default()
    }

    /// Equality selector built from a label set, as used for pod templates
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        Self {
            requirements: labels
                .iter()
                .map(|(k, v)| Requirement::Equals(k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Parse a selector string such as `app=reviews,version in (v1,v2)`
    pub fn parse(s: &str) -> Result<Self, SelectorError> {
        if s.trim().is_empty() {
            return Ok(Self::everything());
        }

        let requirements = split_terms(s)?
            .into_iter()
            .map(|term| parse_requirement(term, s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms = self
            .requirements
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>();
        f.write_str(&terms.join(","))
    }
}

/// Split on commas that are not inside a value set
fn split_terms(s: &str) -> Result<Vec<&str>, SelectorError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectorError::Unbalanced(s.to_string()))?;
            }
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SelectorError::Unbalanced(s.to_string()));
    }
    terms.push(&s[start..]);
    Ok(terms)
}

fn parse_requirement(term: &str, selector: &str) -> Result<Requirement, SelectorError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(SelectorError::EmptyRequirement(selector.to_string()));
    }

    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(valid_key(key.trim())?));
    }

    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Requirement::NotEquals(
            valid_key(key.trim())?,
            valid_value(value.trim())?,
        ));
    }

    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Requirement::Equals(
            valid_key(key.trim())?,
            valid_value(value.trim())?,
        ));
    }

    if let Some((head, rest)) = term.split_once('(') {
        let values = rest
            .strip_suffix(')')
            .ok_or_else(|| SelectorError::Unbalanced(selector.to_string()))?
            .split(',')
            .map(|v| valid_value(v.trim()))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let mut parts = head.split_whitespace();
        let key = parts
            .next()
            .ok_or_else(|| SelectorError::InvalidKey(head.to_string()))?;
        let op = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(SelectorError::UnknownOperator(head.trim().to_string()));
        }

        return match op {
            "in" => Ok(Requirement::In(valid_key(key)?, values)),
            "notin" => Ok(Requirement::NotIn(valid_key(key)?, values)),
            other => Err(SelectorError::UnknownOperator(other.to_string())),
        };
    }

    Ok(Requirement::Exists(valid_key(term)?))
}

fn valid_key(key: &str) -> Result<String, SelectorError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if ok {
        Ok(key.to_string())
    } else {
        Err(SelectorError::InvalidKey(key.to_string()))
    }
}

fn valid_value(value: &str) -> Result<String, SelectorError> {
    let ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(value.to_string())
    } else {
        Err(SelectorError::InvalidValue(value.to_string()))
    }
}
