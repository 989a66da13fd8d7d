//! Type converters.
//!
//! This module provides:
//! - `Converter`: text-format codec for one family of PostgreSQL types
//! - `ConverterClient`: a converter pooled under the type it serves
//! - `ConverterPooler`: resolves type names through a `TypeRegistry`
//!
//! Every converter works on PostgreSQL's text representation. `decode`
//! reads what the server sends, `encode` produces a typed SQL literal
//! (`int4 '1'`, `ARRAY[..]::int4[]`) and `encode_wire` produces the bare
//! text form used for bound parameters and COPY.

pub mod array;
pub mod bytea;
pub mod composite;
pub mod datetime;
pub mod enumeration;
pub mod geometry;
pub mod hstore;
pub mod json;
pub mod ltree;
pub mod range;
pub mod registry;
pub mod scalar;

use std::any::Any;
use std::sync::Arc;

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::pool::Client;
use crate::pooler::{Pooler, PoolerState};
use crate::session::{ClientKind, Session};

pub use array::ArrayConverter;
pub use bytea::ByteaConverter;
pub use composite::CompositeConverter;
pub use datetime::{IntervalConverter, TimestampConverter};
pub use enumeration::{BackedEnum, EnumConverter};
pub use geometry::{BoxConverter, CircleConverter, PointConverter};
pub use hstore::HstoreConverter;
pub use json::{JsonConverter, JsonRepresentation};
pub use ltree::LtreeConverter;
pub use range::RangeConverter;
pub use registry::TypeRegistry;
pub use scalar::{BooleanConverter, FloatConverter, IntegerConverter, StringConverter, UuidConverter};

/// Text-format codec for a family of PostgreSQL types.
///
/// `type_name` is the concrete type being converted (`int4`, `int4[]`,
/// `my_schema.my_type`...), so one converter can serve several types.
/// Container converters resolve their element converters through `session`.
pub trait Converter: Send + Sync + 'static {
    /// Server text to value. `None` is an SQL NULL.
    fn decode(&self, data: Option<&str>, type_name: &str, session: &Session) -> Result<PgValue>;

    /// Value to a typed SQL literal.
    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String>;

    /// Value to bare text. `None` is an SQL NULL.
    fn encode_wire(&self, value: &PgValue, type_name: &str, session: &Session)
        -> Result<Option<String>>;
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Error for a value of the wrong shape handed to a converter.
pub(crate) fn unexpected_value(type_name: &str, value: &PgValue, expected: &str) -> FoundationError {
    FoundationError::conversion(
        type_name,
        format!("{:?}", value),
        format!("expected {}, got {}", expected, value.kind_name()),
    )
}

/// `NULL::type`
pub(crate) fn null_literal(type_name: &str) -> String {
    format!("NULL::{}", type_name)
}

/// `type 'text'` with the text escaped by the connection.
pub(crate) fn typed_literal(type_name: &str, text: &str, session: &Session) -> Result<String> {
    let escaped = session.connection()?.escape_literal(text);
    Ok(format!("{} {}", type_name, escaped))
}

/// Trimmed server text, with blank text read as NULL.
pub(crate) fn non_blank(data: Option<&str>) -> Option<&str> {
    data.map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Converter Client
// ============================================================================

/// A converter pooled under the type name it was resolved for.
pub struct ConverterClient {
    identifier: String,
    converter: Arc<dyn Converter>,
}

impl ConverterClient {
    pub fn new(identifier: impl Into<String>, converter: Arc<dyn Converter>) -> Self {
        Self {
            identifier: identifier.into(),
            converter,
        }
    }

    pub fn converter(&self) -> &Arc<dyn Converter> {
        &self.converter
    }

    /// Decode as `type_name`, defaulting to the client's identifier.
    pub fn decode(&self, data: Option<&str>, type_name: Option<&str>, session: &Session) -> Result<PgValue> {
        self.converter
            .decode(data, type_name.unwrap_or(&self.identifier), session)
    }

    pub fn encode(&self, value: &PgValue, type_name: Option<&str>, session: &Session) -> Result<String> {
        self.converter
            .encode(value, type_name.unwrap_or(&self.identifier), session)
    }

    pub fn encode_wire(
        &self,
        value: &PgValue,
        type_name: Option<&str>,
        session: &Session,
    ) -> Result<Option<String>> {
        self.converter
            .encode_wire(value, type_name.unwrap_or(&self.identifier), session)
    }
}

impl std::fmt::Debug for ConverterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterClient")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl Client for ConverterClient {
    fn client_type(&self) -> &str {
        ClientKind::Converter.as_str()
    }

    fn client_identifier(&self) -> &str {
        &self.identifier
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Converter Pooler
// ============================================================================

/// Pooler building converter clients from the session's type registry.
///
/// Every array type (`foo[]`, `_foo`) is pooled under `array`: one array
/// converter serves all element types.
pub struct ConverterPooler {
    state: PoolerState,
    registry: TypeRegistry,
}

impl ConverterPooler {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            state: PoolerState::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }
}

impl Pooler for ConverterPooler {
    fn pooler_type(&self) -> &str {
        ClientKind::Converter.as_str()
    }

    fn state(&self) -> &PoolerState {
        &self.state
    }

    fn pool_identifier(&self, identifier: &str) -> String {
        if array::sub_type(identifier) != identifier {
            "array".to_string()
        } else {
            identifier.to_string()
        }
    }

    fn create_client(&self, _session: &Session, identifier: &str) -> Result<Arc<dyn Client>> {
        let identifier = self.pool_identifier(identifier);
        if !self.registry.has_type(&identifier) {
            return Err(FoundationError::Configuration(format!(
                "No converter registered for type '{}'.",
                identifier
            )));
        }
        let converter = self.registry.converter_for_type(&identifier)?;
        Ok(Arc::new(ConverterClient::new(identifier, converter)))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
