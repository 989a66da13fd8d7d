//! `json` / `jsonb` converter backed by serde_json.

use serde_json::Value as JsonValue;

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::session::Session;

use super::{non_blank, null_literal, Converter};

/// How decoded JSON is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonRepresentation {
    /// The parsed tree as `PgValue::Json`.
    #[default]
    Document,
    /// Native values: objects become ordered `Composite` fields, arrays
    /// become `Array`, scalars their matching variant.
    Associative,
}

pub struct JsonConverter {
    representation: JsonRepresentation,
}

impl JsonConverter {
    pub fn new(representation: JsonRepresentation) -> Self {
        Self { representation }
    }

    pub fn representation(&self) -> JsonRepresentation {
        self.representation
    }

    fn to_text(value: &PgValue, type_name: &str) -> Result<Option<String>> {
        let json = match value {
            PgValue::Null => return Ok(None),
            PgValue::Json(j) => j.clone(),
            other => other.to_json(),
        };
        serde_json::to_string(&json)
            .map(Some)
            .map_err(|e| FoundationError::conversion(type_name, format!("{:?}", value), e.to_string()))
    }
}

impl Default for JsonConverter {
    fn default() -> Self {
        Self::new(JsonRepresentation::default())
    }
}

fn associative(json: JsonValue) -> PgValue {
    match json {
        JsonValue::Null => PgValue::Null,
        JsonValue::Bool(b) => PgValue::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => PgValue::Int(i),
            None => PgValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => PgValue::Text(s),
        JsonValue::Array(items) => PgValue::Array(items.into_iter().map(associative).collect()),
        JsonValue::Object(map) => {
            PgValue::Composite(map.into_iter().map(|(k, v)| (k, associative(v))).collect())
        }
    }
}

impl Converter for JsonConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        let json: JsonValue = serde_json::from_str(raw)
            .map_err(|e| FoundationError::conversion(type_name, raw, e.to_string()))?;
        Ok(match self.representation {
            JsonRepresentation::Document => PgValue::Json(json),
            JsonRepresentation::Associative => associative(json),
        })
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match Self::to_text(value, type_name)? {
            Some(text) => {
                let escaped = session.connection()?.escape_literal(&text);
                Ok(format!("{} {}", type_name, escaped))
            }
            None => Ok(null_literal(type_name)),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Self::to_text(value, type_name)
    }
}
