//! Composite (row) converter.
//!
//! A composite converter is declared with the ordered field structure of
//! one row type, e.g. `[("a", "int4"), ("b", "varchar[]"), ("c", "text")]`.
//!
//! Text grammar: `(v1,v2,...)`. An empty position is NULL, `""` is the empty
//! string. Fields holding a comma, parenthesis, quote, backslash or
//! whitespace are double quoted, with `"` and `\` doubled inside.

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::session::Session;

use super::{null_literal, unexpected_value, Converter};

static NULL_FIELD: PgValue = PgValue::Null;

pub struct CompositeConverter {
    structure: Vec<(String, String)>,
}

impl CompositeConverter {
    /// Build from `(field name, field type)` pairs in column order.
    pub fn new<I, N, T>(structure: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            structure: structure
                .into_iter()
                .map(|(n, t)| (n.into(), t.into()))
                .collect(),
        }
    }

    pub fn structure(&self) -> &[(String, String)] {
        &self.structure
    }

    /// Field values in structure order; absent fields are NULL.
    fn ordered_fields<'a>(
        &self,
        fields: &'a [(String, PgValue)],
        type_name: &str,
    ) -> Result<Vec<&'a PgValue>> {
        if let Some((unknown, _)) = fields
            .iter()
            .find(|(name, _)| !self.structure.iter().any(|(n, _)| n == name))
        {
            return Err(FoundationError::conversion(
                type_name,
                unknown.as_str(),
                "field is not part of the composite type",
            ));
        }
        Ok(self
            .structure
            .iter()
            .map(|(name, _)| {
                fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .map_or(&NULL_FIELD, |(_, v)| v)
            })
            .collect())
    }
}

impl Converter for CompositeConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, session: &Session) -> Result<PgValue> {
        let Some(raw) = data else {
            return Ok(PgValue::Null);
        };
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| FoundationError::conversion(type_name, raw, "a row must be enclosed in parentheses"))?;
        let values = split_record(inner)
            .map_err(|reason| FoundationError::conversion(type_name, raw, reason))?;
        if values.len() != self.structure.len() {
            return Err(FoundationError::conversion(
                type_name,
                raw,
                format!("expected {} fields, found {}", self.structure.len(), values.len()),
            ));
        }

        let mut fields = Vec::with_capacity(values.len());
        for ((name, sub_type), text) in self.structure.iter().zip(values) {
            let value = session
                .converter(sub_type)?
                .decode(text.as_deref(), Some(sub_type.as_str()), session)?;
            fields.push((name.clone(), value));
        }
        Ok(PgValue::Composite(fields))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        let fields = match value {
            PgValue::Null => return Ok(null_literal(type_name)),
            PgValue::Composite(fields) => fields,
            other => return Err(unexpected_value(type_name, other, "a composite value")),
        };
        let values = self.ordered_fields(fields, type_name)?;
        let parts = self
            .structure
            .iter()
            .zip(values)
            .map(|((_, sub_type), value)| {
                if value.is_null() {
                    Ok(null_literal(sub_type))
                } else {
                    session.converter(sub_type)?.encode(value, Some(sub_type.as_str()), session)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("ROW({})::{}", parts.join(","), type_name))
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<Option<String>> {
        let fields = match value {
            PgValue::Null => return Ok(None),
            PgValue::Composite(fields) => fields,
            other => return Err(unexpected_value(type_name, other, "a composite value")),
        };
        let values = self.ordered_fields(fields, type_name)?;
        let mut out = String::from("(");
        for (i, ((_, sub_type), value)) in self.structure.iter().zip(values).enumerate() {
            if i > 0 {
                out.push(',');
            }
            if value.is_null() {
                continue;
            }
            if let Some(text) = session
                .converter(sub_type)?
                .encode_wire(value, Some(sub_type.as_str()), session)?
            {
                push_field(&mut out, &text);
            }
        }
        out.push(')');
        Ok(Some(out))
    }
}

fn push_field(out: &mut String, text: &str) {
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push(c);
        }
        out.push(c);
    }
    out.push('"');
}

/// Split the inside of a row literal into fields. `None` is a NULL field.
///
/// Inside quotes `""` is a quote; a backslash escapes the next character
/// anywhere.
pub(crate) fn split_record(inner: &str) -> std::result::Result<Vec<Option<String>>, String> {
    let mut fields = Vec::new();
    let mut chars = inner.chars().peekable();
    let mut current = String::new();
    let mut seen_content = false;
    let mut in_quotes = false;

    loop {
        let Some(c) = chars.next() else {
            if in_quotes {
                return Err("unterminated quoted field".to_string());
            }
            fields.push(seen_content.then_some(current));
            return Ok(fields);
        };
        match c {
            '\\' => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    seen_content = true;
                }
                None => return Err("unterminated escape".to_string()),
            },
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => {
                in_quotes = true;
                seen_content = true;
            }
            ',' if !in_quotes => {
                fields.push(seen_content.then(|| std::mem::take(&mut current)));
                current.clear();
                seen_content = false;
            }
            _ => {
                current.push(c);
                seen_content = true;
            }
        }
    }
}
