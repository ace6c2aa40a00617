//! Search criterion expressions.
//!
//! The CRM search endpoint takes criteria as a string:
//! `(Field:comparator:value)` for a single condition and
//! `((A:equals:1)and(B:starts_with:x))` for groups. `(`, `)`, `,` and `\`
//! inside values are escaped with a backslash. Expressions can be built
//! programmatically or parsed from text; both produce the same tree and
//! render to the same string.

use crate::error::{CrmError, CrmResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The CRM rejects expressions with more conditions than this
pub const MAX_CONDITIONS: usize = 10;

/// Deepest parenthesis nesting accepted by the parser
const MAX_NESTING: usize = 2 * MAX_CONDITIONS;

static FIELD_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z$][A-Za-z0-9_$]*(\.[A-Za-z0-9_$]+)?$").expect("valid field name pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Equals,
    NotEqual,
    Contains,
    StartsWith,
    EndsWith,
    In,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Between,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Equals => "equals",
            Comparator::NotEqual => "not_equal",
            Comparator::Contains => "contains",
            Comparator::StartsWith => "starts_with",
            Comparator::EndsWith => "ends_with",
            Comparator::In => "in",
            Comparator::GreaterThan => "greater_than",
            Comparator::GreaterEqual => "greater_equal",
            Comparator::LessThan => "less_than",
            Comparator::LessEqual => "less_equal",
            Comparator::Between => "between",
        }
    }

    /// Comparators whose right-hand side is a comma separated list
    fn takes_list(&self) -> bool {
        matches!(self, Comparator::In | Comparator::Between)
    }

    fn check_arity(&self, field: &str, count: usize) -> CrmResult<()> {
        let ok = match self {
            Comparator::Between => count == 2,
            Comparator::In => count >= 1,
            _ => count == 1,
        };
        if ok {
            return Ok(());
        }
        let expected = match self {
            Comparator::Between => "exactly two values",
            Comparator::In => "at least one value",
            _ => "exactly one value",
        };
        Err(CrmError::InvalidCriterion(format!(
            "'{}' on field '{}' takes {}, got {}",
            self.as_str(),
            field,
            expected,
            count
        )))
    }
}

impl FromStr for Comparator {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let comparator = match s.trim().to_ascii_lowercase().as_str() {
            "equals" => Comparator::Equals,
            "not_equal" => Comparator::NotEqual,
            "contains" => Comparator::Contains,
            "starts_with" => Comparator::StartsWith,
            "ends_with" => Comparator::EndsWith,
            "in" => Comparator::In,
            "greater_than" => Comparator::GreaterThan,
            "greater_equal" => Comparator::GreaterEqual,
            "less_than" => Comparator::LessThan,
            "less_equal" => Comparator::LessEqual,
            "between" => Comparator::Between,
            other => {
                return Err(CrmError::InvalidCriterion(format!(
                    "unknown comparator '{}'",
                    other
                )))
            }
        };
        Ok(comparator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        }
    }
}

impl FromStr for BoolOp {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(BoolOp::And),
            "or" => Ok(BoolOp::Or),
            other => Err(CrmError::InvalidCriterion(format!(
                "expected 'and' or 'or', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Condition {
        field: String,
        comparator: Comparator,
        values: Vec<String>,
    },
    Group {
        op: BoolOp,
        terms: Vec<Criterion>,
    },
}

impl Criterion {
    pub fn condition<I, S>(field: impl Into<String>, comparator: Comparator, values: I) -> CrmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field = field.into().trim().to_string();
        validate_field(&field)?;
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        comparator.check_arity(&field, values.len())?;
        Ok(Criterion::Condition {
            field,
            comparator,
            values,
        })
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> CrmResult<Self> {
        Self::condition(field, Comparator::Equals, [value.into()])
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> CrmResult<Self> {
        Self::condition(field, Comparator::StartsWith, [value.into()])
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> CrmResult<Self> {
        Self::condition(field, Comparator::Contains, [value.into()])
    }

    pub fn between(
        field: impl Into<String>,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> CrmResult<Self> {
        Self::condition(field, Comparator::Between, [low.into(), high.into()])
    }

    /// Combine with `and`, flattening nested `and` groups
    pub fn and(self, other: Criterion) -> Criterion {
        Self::combine(BoolOp::And, vec![self, other])
    }

    /// Combine with `or`, flattening nested `or` groups
    pub fn or(self, other: Criterion) -> Criterion {
        Self::combine(BoolOp::Or, vec![self, other])
    }

    pub fn all(terms: Vec<Criterion>) -> CrmResult<Criterion> {
        Self::non_empty(BoolOp::And, terms)
    }

    pub fn any(terms: Vec<Criterion>) -> CrmResult<Criterion> {
        Self::non_empty(BoolOp::Or, terms)
    }

    fn non_empty(op: BoolOp, terms: Vec<Criterion>) -> CrmResult<Criterion> {
        if terms.is_empty() {
            return Err(CrmError::InvalidCriterion(
                "at least one condition is required".to_string(),
            ));
        }
        Ok(Self::combine(op, terms))
    }

    fn combine(op: BoolOp, terms: Vec<Criterion>) -> Criterion {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Criterion::Group { op: inner, terms } if inner == op => flat.extend(terms),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        Criterion::Group { op, terms: flat }
    }

    /// Number of leaf conditions in the expression
    pub fn condition_count(&self) -> usize {
        match self {
            Criterion::Condition { .. } => 1,
            Criterion::Group { terms, .. } => terms.iter().map(Criterion::condition_count).sum(),
        }
    }

    /// Check the whole tree against the local rules (field syntax, arity, size)
    pub fn validate(&self) -> CrmResult<()> {
        match self {
            Criterion::Condition {
                field,
                comparator,
                values,
            } => {
                validate_field(field)?;
                comparator.check_arity(field, values.len())?;
            }
            Criterion::Group { terms, .. } => {
                if terms.is_empty() {
                    return Err(CrmError::InvalidCriterion("empty group".to_string()));
                }
                for term in terms {
                    term.validate()?;
                }
            }
        }
        let count = self.condition_count();
        if count > MAX_CONDITIONS {
            return Err(CrmError::InvalidCriterion(format!(
                "at most {} conditions are allowed, got {}",
                MAX_CONDITIONS, count
            )));
        }
        Ok(())
    }

    /// Render in the syntax the search endpoint expects
    pub fn to_expression(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            Criterion::Condition {
                field,
                comparator,
                values,
            } => {
                out.push('(');
                out.push_str(field);
                out.push(':');
                out.push_str(comparator.as_str());
                out.push(':');
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    escape_into(value, out);
                }
                out.push(')');
            }
            Criterion::Group { op, terms } => {
                out.push('(');
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        out.push_str(op.as_str());
                    }
                    term.render(out);
                }
                out.push(')');
            }
        }
    }

    /// Parse a textual expression. A bare `Field:comparator:value` without
    /// parentheses is accepted as a single condition.
    pub fn parse(expression: &str) -> CrmResult<Criterion> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(CrmError::InvalidCriterion(
                "criteria expression is empty".to_string(),
            ));
        }
        let criterion = if trimmed.starts_with('(') {
            let mut parser = Parser::new(trimmed);
            parser.parse_sequence(false)?
        } else {
            parse_condition(trimmed)?
        };
        criterion.validate()?;
        Ok(criterion)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_expression())
    }
}

impl FromStr for Criterion {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Criterion::parse(s)
    }
}

fn validate_field(field: &str) -> CrmResult<()> {
    if FIELD_NAME_RE.is_match(field) {
        Ok(())
    } else {
        Err(CrmError::InvalidCriterion(format!(
            "'{}' is not a valid field API name",
            field
        )))
    }
}

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        if matches!(c, '(' | ')' | ',' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split on `sep` outside of backslash escapes, into at most `limit` raw pieces
fn split_unescaped(input: &str, sep: char, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep && pieces.len() + 1 < limit {
            pieces.push(&input[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    pieces.push(&input[start..]);
    pieces
}

fn parse_condition(text: &str) -> CrmResult<Criterion> {
    let parts = split_unescaped(text, ':', 3);
    if parts.len() != 3 {
        return Err(CrmError::InvalidCriterion(format!(
            "'{}' is not of the form field:comparator:value",
            text
        )));
    }
    let field = parts[0].trim();
    let comparator: Comparator = parts[1].parse()?;
    let values: Vec<String> = if comparator.takes_list() {
        split_unescaped(parts[2], ',', usize::MAX)
            .into_iter()
            .map(|v| unescape(v.trim()))
            .collect()
    } else {
        vec![unescape(parts[2])]
    };
    if values.iter().all(|v| v.is_empty()) {
        return Err(CrmError::InvalidCriterion(format!(
            "condition on '{}' has no value",
            field
        )));
    }
    Criterion::condition(field, comparator, values)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, message: &str) -> CrmError {
        CrmError::InvalidCriterion(format!("{} at position {}", message, self.pos))
    }

    /// Terms joined by a single operator; `nested` sequences end at `)`.
    fn parse_sequence(&mut self, nested: bool) -> CrmResult<Criterion> {
        let mut terms = Vec::new();
        let mut op: Option<BoolOp> = None;
        loop {
            self.skip_ws();
            terms.push(self.parse_term()?);
            self.skip_ws();
            match self.peek() {
                None if nested => return Err(self.error("unbalanced parentheses")),
                None => break,
                Some(')') if nested => {
                    self.bump();
                    break;
                }
                Some(')') => return Err(self.error("unexpected ')'")),
                Some(_) => {
                    let next = self.parse_operator()?;
                    match op {
                        Some(existing) if existing != next => {
                            return Err(self.error(
                                "mixed 'and'/'or' in one group, add parentheses",
                            ))
                        }
                        _ => op = Some(next),
                    }
                }
            }
        }
        if terms.len() == 1 {
            return Ok(terms.remove(0));
        }
        Ok(Criterion::Group {
            op: op.unwrap_or(BoolOp::And),
            terms,
        })
    }

    fn parse_term(&mut self) -> CrmResult<Criterion> {
        if self.bump() != Some('(') {
            return Err(self.error("expected '('"));
        }
        self.skip_ws();
        if self.peek() == Some('(') {
            if self.depth >= MAX_NESTING {
                return Err(self.error("parentheses nested too deeply"));
            }
            self.depth += 1;
            let group = self.parse_sequence(true);
            self.depth -= 1;
            return group;
        }
        let start = self.pos;
        let mut escaped = false;
        loop {
            match self.bump() {
                None => return Err(self.error("unbalanced parentheses")),
                Some(_) if escaped => escaped = false,
                Some('\\') => escaped = true,
                Some('(') => return Err(self.error("unescaped '(' inside a condition")),
                Some(')') => break,
                Some(_) => {}
            }
        }
        let text = &self.input[start..self.pos - 1];
        parse_condition(text.trim())
    }

    fn parse_operator(&mut self) -> CrmResult<BoolOp> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.bump();
        }
        let word = &self.input[start..self.pos];
        if word.is_empty() {
            return Err(self.error("expected 'and' or 'or'"));
        }
        word.parse()
    }
}
