//! Enumerated type converter.
//!
//! An enum converter serves one PostgreSQL `CREATE TYPE .. AS ENUM` type
//! with a closed set of labels fixed at construction.

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::session::Session;

use super::{null_literal, typed_literal, unexpected_value, Converter};

/// A Rust enum mirroring a PostgreSQL enum type.
///
/// ```ignore
/// enum Mood { Sad, Ok, Happy }
///
/// impl BackedEnum for Mood {
///     const NAME: &'static str = "mood";
///     const LABELS: &'static [&'static str] = &["sad", "ok", "happy"];
/// }
///
/// let converter = EnumConverter::backed::<Mood>()?;
/// ```
pub trait BackedEnum {
    const NAME: &'static str;
    const LABELS: &'static [&'static str];
}

#[derive(Debug)]
pub struct EnumConverter {
    name: String,
    labels: Vec<String>,
}

impl EnumConverter {
    /// Fails when `labels` is empty or holds a duplicate.
    pub fn new<I, S>(name: impl Into<String>, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(FoundationError::Configuration(format!(
                "Enum '{}' must declare at least one value.",
                name
            )));
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(FoundationError::Configuration(format!(
                    "Enum '{}' declares value '{}' twice.",
                    name, label
                )));
            }
        }
        Ok(Self { name, labels })
    }

    pub fn backed<E: BackedEnum>() -> Result<Self> {
        Self::new(E::NAME, E::LABELS.iter().copied())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn check(&self, label: &str, type_name: &str) -> Result<()> {
        if self.labels.iter().any(|l| l == label) {
            Ok(())
        } else {
            Err(FoundationError::conversion(
                type_name,
                label,
                format!("Value \"{}\" not found in enum \"{}\"", label, self.name),
            ))
        }
    }

    fn label<'a>(&self, value: &'a PgValue, type_name: &str) -> Result<Option<&'a str>> {
        let label = match value {
            PgValue::Null => return Ok(None),
            PgValue::Enum(s) | PgValue::Text(s) => s.as_str(),
            other => return Err(unexpected_value(type_name, other, "an enum label")),
        };
        self.check(label, type_name)?;
        Ok(Some(label))
    }
}

impl Converter for EnumConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = data else {
            return Ok(PgValue::Null);
        };
        self.check(raw, type_name)?;
        Ok(PgValue::Enum(raw.to_string()))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match self.label(value, type_name)? {
            Some(label) => typed_literal(type_name, label, session),
            None => Ok(null_literal(type_name)),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Ok(self.label(value, type_name)?.map(str::to_string))
    }
}
