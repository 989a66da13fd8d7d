//! Converted query results.
//!
//! A `ConvertedResult` keeps the raw text rows of a `ResultSet` and decodes
//! a row only when it is read, through the converter of each column's type.
//! Columns whose type the driver could not name are read as `text`.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use smallvec::SmallVec;

use crate::converter::ConverterClient;
use crate::error::{FoundationError, Result};
use crate::pg::connection::{ResultSet, SharedColumns};
use crate::pg::types::PgValue;
use crate::session::Session;

const DEFAULT_COLUMN_TYPE: &str = "text";

/// Decoded values of one row. Inline for rows of up to 16 columns.
pub type RowValues = SmallVec<[PgValue; 16]>;

/// One decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRow {
    columns: SharedColumns,
    values: RowValues,
}

impl ConvertedRow {
    /// Value of the column named `name`.
    pub fn get(&self, name: &str) -> Option<&PgValue> {
        let position = self.columns.iter().position(|c| c.name == name)?;
        self.values.get(position)
    }

    pub fn get_index(&self, index: usize) -> Option<&PgValue> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[PgValue] {
        &self.values
    }

    pub fn into_values(self) -> RowValues {
        self.values
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The row as a JSON object keyed by column name.
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::new();
        for (column, value) in self.columns.iter().zip(self.values.iter()) {
            object.insert(column.name.clone(), value.to_json());
        }
        JsonValue::Object(object)
    }
}

/// Rows of a query, decoded on access.
pub struct ConvertedResult<'s> {
    session: &'s Session,
    result: ResultSet,
    /// Type name and converter of each column.
    converters: Vec<(String, Arc<ConverterClient>)>,
}

impl<'s> ConvertedResult<'s> {
    /// Resolve a converter for every column of `result`.
    pub fn new(session: &'s Session, result: ResultSet) -> Result<Self> {
        let converters = result
            .columns
            .iter()
            .map(|column| {
                let type_name = column
                    .type_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COLUMN_TYPE.to_string());
                let converter = session.converter(&type_name)?;
                Ok((type_name, converter))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            session,
            result,
            converters,
        })
    }

    pub fn len(&self) -> usize {
        self.result.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn result_set(&self) -> &ResultSet {
        &self.result
    }

    pub fn command_tag(&self) -> &str {
        &self.result.command_tag
    }

    pub fn affected_rows(&self) -> u64 {
        self.result.affected_rows()
    }

    /// Type name used for each column.
    pub fn column_types(&self) -> impl Iterator<Item = &str> {
        self.converters.iter().map(|(t, _)| t.as_str())
    }

    /// Decode row `index`. `None` past the last row.
    pub fn get(&self, index: usize) -> Result<Option<ConvertedRow>> {
        let Some(raw) = self.result.rows.get(index) else {
            return Ok(None);
        };
        let mut values = RowValues::with_capacity(raw.len());
        for (cell, (type_name, converter)) in raw.iter().zip(&self.converters) {
            values.push(converter.decode(cell.as_deref(), Some(type_name.as_str()), self.session)?);
        }
        Ok(Some(ConvertedRow {
            columns: Arc::clone(&self.result.columns),
            values,
        }))
    }

    pub fn first(&self) -> Result<Option<ConvertedRow>> {
        self.get(0)
    }

    /// Decode rows one by one.
    pub fn iter(&self) -> impl Iterator<Item = Result<ConvertedRow>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i).transpose())
    }

    /// Decode every row.
    pub fn all(&self) -> Result<Vec<ConvertedRow>> {
        self.iter().collect()
    }

    /// Decoded values of one column across all rows.
    pub fn slice(&self, field: &str) -> Result<Vec<PgValue>> {
        let position = self.result.field_position(field).ok_or_else(|| {
            FoundationError::PoolUsage(format!(
                "Could not find field '{}' in the result. Fields are {{{}}}.",
                field,
                self.result
                    .columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        let (type_name, converter) = &self.converters[position];
        self.result
            .rows
            .iter()
            .map(|row| {
                let cell = row.get(position).and_then(|c| c.as_deref());
                converter.decode(cell, Some(type_name.as_str()), self.session)
            })
            .collect()
    }
}

impl std::fmt::Debug for ConvertedResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertedResult")
            .field("columns", &self.column_types().collect::<Vec<_>>())
            .field("rows", &self.len())
            .field("command_tag", &self.result.command_tag)
            .finish()
    }
}
