//! Range converter.
//!
//! Text grammar: `[lower,upper)` where `[`/`]` are inclusive and `(`/`)`
//! exclusive bounds. A blank bound is unbounded, `-infinity` and `infinity`
//! are kept as sentinels, and the literal `empty` is the empty range.
//! Bounds holding a delimiter, bracket, quote, backslash or whitespace are
//! double quoted.

use std::collections::HashMap;

use crate::error::{FoundationError, Result};
use crate::pg::types::{PgValue, Range, RangeBound};
use crate::session::Session;

use super::{null_literal, unexpected_value, Converter};

/// Converter for range types, delegating bounds to the element type.
pub struct RangeConverter {
    element_types: HashMap<String, String>,
}

impl Default for RangeConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeConverter {
    /// Knows the built-in range types.
    pub fn new() -> Self {
        let element_types = [
            ("int4range", "int4"),
            ("int8range", "int8"),
            ("numrange", "numeric"),
            ("tsrange", "timestamp"),
            ("tstzrange", "timestamptz"),
            ("daterange", "date"),
        ]
        .into_iter()
        .flat_map(|(range, element)| {
            [
                (range.to_string(), element.to_string()),
                (format!("pg_catalog.{}", range), element.to_string()),
            ]
        })
        .collect();
        Self { element_types }
    }

    /// Declare the element type of a custom range type.
    pub fn with_element_type(mut self, range_type: &str, element_type: &str) -> Self {
        self.element_types
            .insert(range_type.to_string(), element_type.to_string());
        self
    }

    fn element_type(&self, type_name: &str) -> Result<&str> {
        self.element_types
            .get(type_name)
            .map(String::as_str)
            .ok_or_else(|| {
                FoundationError::Configuration(format!(
                    "Range type '{}' has no declared element type.",
                    type_name
                ))
            })
    }

    /// Only unquoted tokens can be sentinels: `"infinity"` is a value.
    fn decode_bound(
        &self,
        token: Option<BoundToken>,
        element_type: &str,
        session: &Session,
    ) -> Result<RangeBound> {
        let Some(token) = token else {
            return Ok(RangeBound::Unbounded);
        };
        Ok(match (token.quoted, token.text.as_str()) {
            (false, "-infinity") => RangeBound::NegInfinity,
            (false, "infinity") => RangeBound::Infinity,
            (_, text) => RangeBound::Value(
                session
                    .converter(element_type)?
                    .decode(Some(text), Some(element_type), session)?,
            ),
        })
    }

    fn push_bound(&self, out: &mut String, bound: &RangeBound, element_type: &str, session: &Session) -> Result<()> {
        match bound {
            RangeBound::Unbounded | RangeBound::Value(PgValue::Null) => {}
            RangeBound::NegInfinity => out.push_str("-infinity"),
            RangeBound::Infinity => out.push_str("infinity"),
            RangeBound::Value(value) => {
                let text = session
                    .converter(element_type)?
                    .encode_wire(value, Some(element_type), session)?;
                if let Some(text) = text {
                    push_quoted_bound(out, &text);
                }
            }
        }
        Ok(())
    }

    fn wire(&self, range: &Range, type_name: &str, session: &Session) -> Result<String> {
        let Range::Bounds {
            lower,
            upper,
            lower_inclusive,
            upper_inclusive,
        } = range
        else {
            return Ok("empty".to_string());
        };
        let element_type = self.element_type(type_name)?;
        let mut out = String::new();
        out.push(if *lower_inclusive { '[' } else { '(' });
        self.push_bound(&mut out, lower, element_type, session)?;
        out.push(',');
        self.push_bound(&mut out, upper, element_type, session)?;
        out.push(if *upper_inclusive { ']' } else { ')' });
        Ok(out)
    }
}

impl Converter for RangeConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, session: &Session) -> Result<PgValue> {
        let Some(raw) = data else {
            return Ok(PgValue::Null);
        };
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("empty") {
            return Ok(PgValue::from(Range::Empty));
        }
        let (lower_inclusive, upper_inclusive, lower, upper) =
            split_range(trimmed).map_err(|reason| FoundationError::conversion(type_name, raw, reason))?;
        let element_type = self.element_type(type_name)?;
        Ok(PgValue::from(Range::Bounds {
            lower: self.decode_bound(lower, element_type, session)?,
            upper: self.decode_bound(upper, element_type, session)?,
            lower_inclusive,
            upper_inclusive,
        }))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match value {
            PgValue::Null => Ok(null_literal(type_name)),
            PgValue::Range(range) => {
                let wire = self.wire(range, type_name, session)?;
                let escaped = session.connection()?.escape_literal(&wire);
                Ok(format!("{}({})", type_name, escaped))
            }
            other => Err(unexpected_value(type_name, other, "a range")),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<Option<String>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Range(range) => self.wire(range, type_name, session).map(Some),
            other => Err(unexpected_value(type_name, other, "a range")),
        }
    }
}

fn push_quoted_bound(out: &mut String, text: &str) {
    let needs_quotes = text.is_empty()
        || text == "infinity"
        || text == "-infinity"
        || text
            .chars()
            .any(|c| matches!(c, ',' | '(' | ')' | '[' | ']' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// A raw bound and whether any part of it was quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BoundToken {
    text: String,
    quoted: bool,
}

type SplitRange = (bool, bool, Option<BoundToken>, Option<BoundToken>);

/// Brackets and raw bound tokens of a non-empty range literal.
fn split_range(input: &str) -> std::result::Result<SplitRange, String> {
    let mut chars = input.chars();
    let lower_inclusive = match chars.next() {
        Some('[') => true,
        Some('(') => false,
        _ => return Err("a range must start with '[' or '('".to_string()),
    };
    let upper_inclusive = match chars.next_back() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err("a range must end with ']' or ')'".to_string()),
    };
    let inner = chars.as_str();

    let mut bounds: Vec<Option<BoundToken>> = Vec::with_capacity(2);
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut iter = inner.chars().peekable();
    while let Some(c) = iter.next() {
        match c {
            '\\' => match iter.next() {
                Some(escaped) => current.push(escaped),
                None => return Err("unterminated escape".to_string()),
            },
            '"' if in_quotes && iter.peek() == Some(&'"') => {
                iter.next();
                current.push('"');
            }
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            ',' if !in_quotes => {
                bounds.push(finish_bound(&mut current, quoted));
                quoted = false;
            }
            _ => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted bound".to_string());
    }
    bounds.push(finish_bound(&mut current, quoted));

    match <[Option<BoundToken>; 2]>::try_from(bounds) {
        Ok([lower, upper]) => Ok((lower_inclusive, upper_inclusive, lower, upper)),
        Err(bounds) => Err(format!("expected 2 bounds, found {}", bounds.len())),
    }
}

/// Unquoted tokens are trimmed and blank means unbounded.
fn finish_bound(current: &mut String, quoted: bool) -> Option<BoundToken> {
    let text = std::mem::take(current);
    if quoted {
        return Some(BoundToken { text, quoted });
    }
    let text = text.trim();
    (!text.is_empty()).then(|| BoundToken {
        text: text.to_string(),
        quoted,
    })
}
