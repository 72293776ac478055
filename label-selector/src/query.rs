//! The label-query syntax accepted by Kubernetes list requests, e.g.
//! `app=web,tier in (api,db),!legacy`.

use crate::{conjunct::Operator, selector::Selector};
use std::{fmt, str::FromStr};

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty requirement")]
    EmptyRequirement,

    #[error("invalid label key: {0:?}")]
    InvalidKey(String),

    #[error("invalid label value: {0:?}")]
    InvalidValue(String),

    #[error("{0:?} requires at least one value")]
    MissingValues(String),

    #[error("unexpected {0:?}")]
    Unexpected(String),

    #[error("unbalanced parentheses")]
    Unbalanced,
}

const RESERVED: &[char] = &['=', '!', '(', ')', ','];

/// Parses a label query. The empty string is an empty selector.
impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = Selector::default();
        if s.trim().is_empty() {
            return Ok(selector);
        }

        for requirement in split_requirements(s)? {
            let (key, operator, values) = parse_requirement(requirement.trim())?;
            selector
                .add_conjunct(key, operator, values)
                .map_err(|_| ParseError::MissingValues(requirement.trim().to_string()))?;
        }
        Ok(selector)
    }
}

impl Selector {
    /// Renders the selector as a label query, failing if a key or value can't
    /// be expressed in the query syntax.
    ///
    /// A successful rendering parses back to an equal selector.
    pub fn to_query(&self) -> Result<String, ParseError> {
        for c in self.iter() {
            parse_key(c.key())?;
            for value in c.values() {
                parse_value(value)?;
            }
        }
        Ok(self.to_string())
    }
}

/// Renders the selector in label-query form.
///
/// Keys and values containing whitespace, `=`, `!`, `,` or parentheses are
/// written as-is, so the output may not parse back; use
/// [`Selector::to_query`] when it must.
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match (c.operator(), c.values()) {
                (Operator::In, [value]) => write!(f, "{}={}", c.key(), value)?,
                (Operator::NotIn, [value]) => write!(f, "{}!={}", c.key(), value)?,
                (Operator::In, values) => write!(f, "{} in ({})", c.key(), values.join(","))?,
                (Operator::NotIn, values) => {
                    write!(f, "{} notin ({})", c.key(), values.join(","))?
                }
                (Operator::Exists, _) => f.write_str(c.key())?,
                (Operator::DoesNotExist, _) => write!(f, "!{}", c.key())?,
            }
        }
        Ok(())
    }
}

/// Splits on commas outside of parentheses.
fn split_requirements(s: &str) -> Result<Vec<&str>, ParseError> {
    let mut requirements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or(ParseError::Unbalanced)?,
            ',' if depth == 0 => {
                requirements.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced);
    }
    requirements.push(&s[start..]);
    Ok(requirements)
}

fn parse_requirement(s: &str) -> Result<(String, Operator, Vec<String>), ParseError> {
    if s.is_empty() {
        return Err(ParseError::EmptyRequirement);
    }

    if let Some(key) = s.strip_prefix('!') {
        return Ok((parse_key(key.trim())?, Operator::DoesNotExist, vec![]));
    }

    let key_end = s
        .find(|c: char| c.is_whitespace() || RESERVED.contains(&c))
        .unwrap_or(s.len());
    let (key, rest) = s.split_at(key_end);
    let key = parse_key(key)?;
    let rest = rest.trim_start();

    if rest.is_empty() {
        return Ok((key, Operator::Exists, vec![]));
    }

    if let Some(value) = rest.strip_prefix("!=") {
        return Ok((key, Operator::NotIn, vec![parse_value(value.trim())?]));
    }
    if let Some(value) = rest
        .strip_prefix("==")
        .or_else(|| rest.strip_prefix('='))
    {
        return Ok((key, Operator::In, vec![parse_value(value.trim())?]));
    }

    let (operator, set) = if let Some(set) = strip_keyword(rest, "notin") {
        (Operator::NotIn, set)
    } else if let Some(set) = strip_keyword(rest, "in") {
        (Operator::In, set)
    } else {
        return Err(ParseError::Unexpected(rest.to_string()));
    };

    let values = parse_set(set.trim())?;
    if values.is_empty() {
        return Err(ParseError::MissingValues(s.to_string()));
    }
    Ok((key, operator, values))
}

fn strip_keyword<'s>(s: &'s str, keyword: &str) -> Option<&'s str> {
    let rest = s.strip_prefix(keyword)?;
    match rest.chars().next() {
        Some(c) if c.is_whitespace() || c == '(' => Some(rest),
        _ => None,
    }
}

fn parse_set(s: &str) -> Result<Vec<String>, ParseError> {
    let inner = s
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| ParseError::Unexpected(s.to_string()))?;
    if inner.trim().is_empty() {
        return Ok(vec![]);
    }
    inner
        .split(',')
        .map(|v| parse_value(v.trim()))
        .collect()
}

fn parse_key(key: &str) -> Result<String, ParseError> {
    if key.is_empty() || key.contains(|c: char| c.is_whitespace() || RESERVED.contains(&c)) {
        return Err(ParseError::InvalidKey(key.to_string()));
    }
    Ok(key.to_string())
}

fn parse_value(value: &str) -> Result<String, ParseError> {
    if value.contains(|c: char| c.is_whitespace() || RESERVED.contains(&c)) {
        return Err(ParseError::InvalidValue(value.to_string()));
    }
    Ok(value.to_string())
}
