//! `ltree` converter: dotted label paths as arrays of labels.

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::session::Session;

use super::{null_literal, typed_literal, unexpected_value, Converter};

pub struct LtreeConverter;

impl LtreeConverter {
    fn path(value: &PgValue, type_name: &str) -> Result<Option<String>> {
        let labels = match value {
            PgValue::Null => return Ok(None),
            PgValue::Text(path) => return Ok(Some(path.clone())),
            PgValue::Array(labels) => labels,
            other => return Err(unexpected_value(type_name, other, "a list of labels")),
        };
        let mut parts = Vec::with_capacity(labels.len());
        for label in labels {
            match label.as_str() {
                Some(text) if !text.is_empty() && !text.contains('.') => parts.push(text),
                _ => {
                    return Err(FoundationError::conversion(
                        type_name,
                        format!("{:?}", label),
                        "ltree labels must be non empty text without dots",
                    ))
                }
            }
        }
        Ok(Some(parts.join(".")))
    }
}

impl Converter for LtreeConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = data else {
            return Ok(PgValue::Null);
        };
        if raw.is_empty() {
            return Ok(PgValue::Array(Vec::new()));
        }
        if raw.split('.').any(str::is_empty) {
            return Err(FoundationError::conversion(type_name, raw, "empty label in path"));
        }
        Ok(PgValue::Array(raw.split('.').map(PgValue::from).collect()))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match Self::path(value, type_name)? {
            Some(path) => typed_literal(type_name, &path, session),
            None => Ok(null_literal(type_name)),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Self::path(value, type_name)
    }
}
