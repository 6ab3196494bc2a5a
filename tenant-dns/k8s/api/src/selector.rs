//! Label selectors, as configured by operators to whitelist services and namespaces.
//!
//! A [`Selector`] has the same shape as a Kubernetes `LabelSelector`: a set of exact
//! `matchLabels` and a list of `matchExpressions`, all of which must hold for the selector to
//! match. Selectors are usually read from the command line in the label-selector string syntax,
//! e.g. `env=prod,tier in (web,api),!legacy`.

use crate::labels::{Labels, Map};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

pub type Expressions = Vec<Expression>;

/// Selects objects by their labels.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_labels: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Expression {
    key: String,
    operator: Operator,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty clause in selector")]
    EmptyClause,

    #[error("invalid label key: {0:?}")]
    InvalidKey(String),

    #[error("invalid label value: {0:?}")]
    InvalidValue(String),

    #[error("unknown set operator: {0:?}")]
    UnknownOperator(String),

    #[error("unterminated value set in clause {0:?}")]
    UnterminatedSet(String),

    #[error("unbalanced parentheses in selector")]
    Unbalanced,

    #[error("empty value set for key {0:?}")]
    EmptySet(String),
}

// === impl Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.get(k) != Some(v.as_str()) {
                    return false;
                }
            }
        }

        true
    }
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut match_labels = Map::new();
        let mut exprs = Expressions::new();
        for clause in split_clauses(s)? {
            match parse_clause(clause.trim())? {
                Clause::Equals(k, v) => {
                    match_labels.insert(k, v);
                }
                Clause::Expression(expr) => exprs.push(expr),
            }
        }

        Ok(Self {
            match_labels: Some(match_labels).filter(|m| !m.is_empty()),
            match_expressions: Some(exprs).filter(|e| !e.is_empty()),
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| {
            if std::mem::take(&mut first) {
                Ok(())
            } else {
                f.write_str(",")
            }
        };

        for (k, v) in self.match_labels.iter().flatten() {
            sep(f)?;
            write!(f, "{k}={v}")?;
        }
        for expr in self.match_expressions.iter().flatten() {
            sep(f)?;
            write!(f, "{expr}")?;
        }
        Ok(())
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === impl Expression ===

impl Expression {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, labels: &Labels) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .map(|v| self.values.contains(v))
                .unwrap_or(false),
            Operator::NotIn => labels
                .get(&self.key)
                .map(|v| !self.values.contains(v))
                .unwrap_or(true),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::In => write!(f, "{} in ({})", self.key, values()),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, values()),
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

// === parsing ===

enum Clause {
    Equals(String, String),
    Expression(Expression),
}

/// Splits a selector on the commas that are not part of a value set.
fn split_clauses(s: &str) -> Result<Vec<&str>, ParseError> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or(ParseError::Unbalanced)?,
            ',' if depth == 0 => {
                clauses.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced);
    }
    clauses.push(&s[start..]);
    Ok(clauses)
}

fn parse_clause(clause: &str) -> Result<Clause, ParseError> {
    if clause.is_empty() {
        return Err(ParseError::EmptyClause);
    }

    if let Some(key) = clause.strip_prefix('!') {
        let key = parse_key(key.trim())?;
        return Ok(Clause::Expression(Expression::new(
            key,
            Operator::DoesNotExist,
            None::<String>,
        )));
    }

    if let Some(open) = clause.find('(') {
        let set = clause[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| ParseError::UnterminatedSet(clause.to_string()))?;
        let mut head = clause[..open].split_whitespace();
        let key = parse_key(head.next().unwrap_or_default())?;
        let operator = match head.next() {
            Some("in") => Operator::In,
            Some("notin") => Operator::NotIn,
            op => return Err(ParseError::UnknownOperator(op.unwrap_or_default().to_string())),
        };
        if let Some(extra) = head.next() {
            return Err(ParseError::UnknownOperator(extra.to_string()));
        }
        let values = set
            .split(',')
            .map(|v| parse_value(v.trim()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if set.trim().is_empty() {
            return Err(ParseError::EmptySet(key));
        }
        return Ok(Clause::Expression(Expression {
            key,
            operator,
            values,
        }));
    }

    if let Some((key, value)) = clause.split_once("!=") {
        return Ok(Clause::Expression(Expression::new(
            parse_key(key.trim())?,
            Operator::NotIn,
            Some(parse_value(value.trim())?),
        )));
    }

    if let Some((key, value)) = clause.split_once('=') {
        let value = value.strip_prefix('=').unwrap_or(value);
        return Ok(Clause::Equals(
            parse_key(key.trim())?,
            parse_value(value.trim())?,
        ));
    }

    let key = parse_key(clause)?;
    Ok(Clause::Expression(Expression::new(
        key,
        Operator::Exists,
        None::<String>,
    )))
}

fn parse_key(key: &str) -> Result<String, ParseError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if !valid {
        return Err(ParseError::InvalidKey(key.to_string()));
    }
    Ok(key.to_string())
}

fn parse_value(value: &str) -> Result<String, ParseError> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(ParseError::InvalidValue(value.to_string()));
    }
    Ok(value.to_string())
}
