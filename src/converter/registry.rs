//! Type registry: which converter handles which PostgreSQL type.
//!
//! Converters are registered under a unique name together with the type
//! names they serve. Several types can share one converter (`int4`, `int8`
//! and `oid` all go through the integer converter). The registry is built
//! before a session starts and cloned into it; clones share the converter
//! instances, which are stateless.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{FoundationError, Result};

use super::json::JsonRepresentation;
use super::{
    ArrayConverter, BooleanConverter, BoxConverter, ByteaConverter, CircleConverter, Converter,
    FloatConverter, HstoreConverter, IntegerConverter, IntervalConverter, JsonConverter,
    LtreeConverter, PointConverter, RangeConverter, StringConverter, TimestampConverter,
    UuidConverter,
};

#[derive(Clone, Default)]
pub struct TypeRegistry {
    /// converter name -> converter
    converters: HashMap<String, Arc<dyn Converter>>,
    /// type name -> converter name
    types: BTreeMap<String, String>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the converters for PostgreSQL's built-in types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register `converter` under `name` for `types`.
    ///
    /// With `strict`, reusing a converter name is a configuration error;
    /// without it the new converter replaces the old one, and types already
    /// bound to `name` now resolve to the new converter.
    pub fn register(
        &mut self,
        name: &str,
        converter: Arc<dyn Converter>,
        types: &[&str],
        strict: bool,
    ) -> Result<&mut Self> {
        if strict && self.converters.contains_key(name) {
            return Err(FoundationError::Configuration(format!(
                "A converter named '{}' already exists. (Known converters are {{{}}}).",
                name,
                self.converter_names().join(", ")
            )));
        }
        self.converters.insert(name.to_string(), converter);
        for type_name in types {
            self.add_type_to_converter(name, type_name)?;
        }
        Ok(self)
    }

    /// Bind one more type name to an already registered converter.
    pub fn add_type_to_converter(&mut self, name: &str, type_name: &str) -> Result<&mut Self> {
        if !self.converters.contains_key(name) {
            return Err(FoundationError::Configuration(format!(
                "No such converter name '{}'. Registered converters are {{{}}}.",
                name,
                self.converter_names().join(", ")
            )));
        }
        self.types.insert(type_name.to_string(), name.to_string());
        Ok(self)
    }

    /// Converter registered under `name`.
    pub fn converter(&self, name: &str) -> Option<Arc<dyn Converter>> {
        self.converters.get(name).map(Arc::clone)
    }

    pub fn converter_for_type(&self, type_name: &str) -> Result<Arc<dyn Converter>> {
        self.types
            .get(type_name)
            .and_then(|name| self.converter(name))
            .ok_or_else(|| {
                FoundationError::Configuration(format!(
                    "No converters associated with type '{}'. Handled types are {{{}}}.",
                    type_name,
                    self.types().join(", ")
                ))
            })
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn has_converter_name(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Registered converter names, sorted.
    pub fn converter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Type name to converter name bindings.
    pub fn types_with_converter_name(&self) -> &BTreeMap<String, String> {
        &self.types
    }

    fn register_defaults(&mut self) {
        self.insert_default("Array", Arc::new(ArrayConverter), &["array"]);
        self.insert_default("Boolean", Arc::new(BooleanConverter), &["bool", "pg_catalog.bool", "boolean"]);
        self.insert_default(
            "Integer",
            Arc::new(IntegerConverter),
            &[
                "int2", "pg_catalog.int2", "int4", "pg_catalog.int4", "int8", "pg_catalog.int8",
                "int", "integer", "smallint", "bigint", "oid", "pg_catalog.oid",
            ],
        );
        self.insert_default(
            "Float",
            Arc::new(FloatConverter),
            &[
                "numeric", "pg_catalog.numeric", "float4", "pg_catalog.float4", "float", "float8",
                "pg_catalog.float8", "real", "double precision",
            ],
        );
        self.insert_default(
            "String",
            Arc::new(StringConverter),
            &[
                "varchar", "pg_catalog.varchar", "char", "pg_catalog.char", "text",
                "pg_catalog.text", "bpchar", "pg_catalog.bpchar", "name", "pg_catalog.name",
                "character", "character varying", "citext", "public.citext", "xml",
                "pg_catalog.xml", "tsvector", "pg_catalog.tsvector", "tsquery", "regclass",
                "regproc", "regprocedure", "regoper", "regoperator", "regtype", "regconfig",
                "regdictionary", "inet", "cidr", "macaddr", "macaddr8",
            ],
        );
        self.insert_default("Uuid", Arc::new(UuidConverter), &["uuid", "pg_catalog.uuid"]);
        self.insert_default(
            "Timestamp",
            Arc::new(TimestampConverter),
            &[
                "timestamp", "pg_catalog.timestamp", "timestamptz", "pg_catalog.timestamptz",
                "date", "pg_catalog.date", "time", "pg_catalog.time",
            ],
        );
        self.insert_default("Interval", Arc::new(IntervalConverter), &["interval", "pg_catalog.interval"]);
        self.insert_default("Binary", Arc::new(ByteaConverter), &["bytea", "pg_catalog.bytea"]);
        self.insert_default("Point", Arc::new(PointConverter), &["point", "pg_catalog.point"]);
        self.insert_default("Circle", Arc::new(CircleConverter), &["circle", "pg_catalog.circle"]);
        self.insert_default("Box", Arc::new(BoxConverter), &["box", "pg_catalog.box"]);
        self.insert_default(
            "JSON",
            Arc::new(JsonConverter::new(JsonRepresentation::Document)),
            &["json", "pg_catalog.json", "jsonb", "pg_catalog.jsonb"],
        );
        self.insert_default(
            "NumberRange",
            Arc::new(RangeConverter::new()),
            &[
                "int4range", "pg_catalog.int4range", "int8range", "pg_catalog.int8range",
                "numrange", "pg_catalog.numrange",
            ],
        );
        self.insert_default(
            "TsRange",
            Arc::new(RangeConverter::new()),
            &[
                "tsrange", "pg_catalog.tsrange", "tstzrange", "pg_catalog.tstzrange",
                "daterange", "pg_catalog.daterange",
            ],
        );
        self.insert_default("HStore", Arc::new(HstoreConverter), &["hstore", "public.hstore"]);
        self.insert_default("Ltree", Arc::new(LtreeConverter), &["ltree", "public.ltree"]);
    }

    fn insert_default(&mut self, name: &str, converter: Arc<dyn Converter>, types: &[&str]) {
        self.converters.insert(name.to_string(), converter);
        for type_name in types {
            self.types.insert(type_name.to_string(), name.to_string());
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("converters", &self.converter_names())
            .field("types", &self.types)
            .finish()
    }
}
