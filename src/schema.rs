//! Table schema
//!
//! An immutable, ordered list of typed, uniquely named columns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::types::{Datum, DatumType};

/// One named, typed column of a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub datum_type: DatumType,
}

/// Ordered list of fields; validated at construction, immutable afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
    row_byte_width: usize,
}

impl Schema {
    /// Build a schema from `(name, type)` pairs
    ///
    /// At least one field; names must be non-empty, lower case and unique.
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = (S, DatumType)>) -> Result<Self> {
        let fields: Vec<Field> = fields
            .into_iter()
            .map(|(name, datum_type)| Field {
                name: name.into(),
                datum_type,
            })
            .collect();

        if fields.is_empty() {
            return Err(StoreError::SchemaMismatch(
                "schema needs at least one field".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.is_empty() {
                return Err(StoreError::InvalidName(
                    "field names must not be empty".to_string(),
                ));
            }
            if field.name != field.name.to_lowercase() {
                return Err(StoreError::InvalidName(format!(
                    "field name {:?} must be lower case",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::InvalidName(format!(
                    "duplicate field name {:?}",
                    field.name
                )));
            }
        }

        let row_byte_width = fields.iter().map(|f| f.datum_type.width()).sum();
        Ok(Self {
            fields,
            row_byte_width,
        })
    }

    /// Build a schema from parallel name and type lists
    pub fn from_parts<S: Into<String>>(names: Vec<S>, types: Vec<DatumType>) -> Result<Self> {
        if names.len() != types.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "{} names but {} types",
                names.len(),
                types.len()
            )));
        }
        Self::new(names.into_iter().zip(types))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Panics if `rank` is not a field of this schema
    pub fn type_of(&self, rank: usize) -> DatumType {
        self.fields[rank].datum_type
    }

    /// Panics if `rank` is not a field of this schema
    pub fn name_of(&self, rank: usize) -> &str {
        &self.fields[rank].name
    }

    /// Encoded width of one row in bytes
    pub fn row_byte_width(&self) -> usize {
        self.row_byte_width
    }

    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Check a row's arity and field types against this schema
    pub fn check_row(&self, row: &[Datum]) -> Result<()> {
        if row.len() != self.fields.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "row has {} fields, schema has {}",
                row.len(),
                self.fields.len()
            )));
        }
        for (field, datum) in self.fields.iter().zip(row) {
            if datum.datum_type() != field.datum_type {
                return Err(StoreError::SchemaMismatch(format!(
                    "field {:?} expects {}, got {}",
                    field.name,
                    field.datum_type,
                    datum.datum_type()
                )));
            }
        }
        Ok(())
    }
}
