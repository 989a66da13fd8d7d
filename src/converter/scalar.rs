//! Scalar converters: booleans, integers, floats, strings and uuids.

use uuid::Uuid;

use crate::error::{FoundationError, Result};
use crate::pg::types::{format_float, PgValue};
use crate::session::Session;

use super::{non_blank, null_literal, typed_literal, unexpected_value, Converter};

// ============================================================================
// Boolean
// ============================================================================

/// `bool`: the server sends `t` / `f`.
pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        match raw {
            "t" | "true" | "TRUE" => Ok(PgValue::Bool(true)),
            "f" | "false" | "FALSE" => Ok(PgValue::Bool(false)),
            _ => Err(FoundationError::conversion(type_name, raw, "Unknown bool data")),
        }
    }

    fn encode(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<String> {
        match value {
            PgValue::Null => Ok(null_literal(type_name)),
            PgValue::Bool(b) => Ok(format!("{} '{}'", type_name, b)),
            other => Err(unexpected_value(type_name, other, "a boolean")),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Bool(b) => Ok(Some(if *b { "t" } else { "f" }.to_string())),
            other => Err(unexpected_value(type_name, other, "a boolean")),
        }
    }
}

// ============================================================================
// Integer
// ============================================================================

/// `int2`, `int4`, `int8`, `oid`. Always encoded as the signed decimal value.
pub struct IntegerConverter;

impl IntegerConverter {
    fn integer(value: &PgValue, type_name: &str) -> Result<Option<i64>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Int(i) => Ok(Some(*i)),
            other => Err(unexpected_value(type_name, other, "an integer")),
        }
    }
}

impl Converter for IntegerConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        raw.parse::<i64>()
            .map(PgValue::Int)
            .map_err(|e| FoundationError::conversion(type_name, raw, e.to_string()))
    }

    fn encode(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<String> {
        Ok(match Self::integer(value, type_name)? {
            Some(i) => format!("{} '{}'", type_name, i),
            None => null_literal(type_name),
        })
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Ok(Self::integer(value, type_name)?.map(|i| i.to_string()))
    }
}

// ============================================================================
// Float
// ============================================================================

/// `float4`, `float8`, `numeric`. Numeric values are read as `f64`, so only
/// the precision of a double survives.
pub struct FloatConverter;

impl FloatConverter {
    fn float(value: &PgValue, type_name: &str) -> Result<Option<f64>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Float(f) => Ok(Some(*f)),
            PgValue::Int(i) => Ok(Some(*i as f64)),
            other => Err(unexpected_value(type_name, other, "a number")),
        }
    }
}

impl Converter for FloatConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        raw.parse::<f64>()
            .map(PgValue::Float)
            .map_err(|e| FoundationError::conversion(type_name, raw, e.to_string()))
    }

    fn encode(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<String> {
        Ok(match Self::float(value, type_name)? {
            Some(f) => format!("{} '{}'", type_name, format_float(f)),
            None => null_literal(type_name),
        })
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Ok(Self::float(value, type_name)?.map(format_float))
    }
}

// ============================================================================
// String
// ============================================================================

/// Text-like types. Text is passed through untouched in both directions.
pub struct StringConverter;

impl StringConverter {
    fn text(value: &PgValue, type_name: &str) -> Result<Option<String>> {
        match value {
            PgValue::Text(s) | PgValue::Enum(s) => Ok(Some(s.clone())),
            PgValue::Array(_) | PgValue::Composite(_) | PgValue::Hstore(_) | PgValue::Range(_) => {
                Err(unexpected_value(type_name, value, "a string"))
            }
            other => other.to_plain_text(),
        }
    }
}

impl Converter for StringConverter {
    fn decode(&self, data: Option<&str>, _type_name: &str, _session: &Session) -> Result<PgValue> {
        Ok(data.map_or(PgValue::Null, |s| PgValue::Text(s.to_string())))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match Self::text(value, type_name)? {
            Some(text) => typed_literal(type_name, &text, session),
            None => Ok(null_literal(type_name)),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Self::text(value, type_name)
    }
}

// ============================================================================
// UUID
// ============================================================================

pub struct UuidConverter;

impl UuidConverter {
    fn uuid(value: &PgValue, type_name: &str) -> Result<Option<Uuid>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Uuid(u) => Ok(Some(*u)),
            PgValue::Text(s) => Uuid::parse_str(s)
                .map(Some)
                .map_err(|e| FoundationError::conversion(type_name, s.as_str(), e.to_string())),
            other => Err(unexpected_value(type_name, other, "a uuid")),
        }
    }
}

impl Converter for UuidConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        Uuid::parse_str(raw)
            .map(PgValue::Uuid)
            .map_err(|e| FoundationError::conversion(type_name, raw, e.to_string()))
    }

    fn encode(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<String> {
        Ok(match Self::uuid(value, type_name)? {
            Some(u) => format!("{} '{}'", type_name, u),
            None => null_literal(type_name),
        })
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Ok(Self::uuid(value, type_name)?.map(|u| u.to_string()))
    }
}
