//! Destination table schemas and typed column values.
//!
//! A schema describes a destination table at one version. Writers are built
//! against a specific version and must be rebuilt when the version changes;
//! the lease machinery in [`crate::registry`] enforces that.

use crate::{SchemaVersion, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column types supported by the row codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Timestamp,
    /// Arbitrary nested JSON
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Nanoseconds since the Unix epoch
    Timestamp(u64),
    Json(serde_json::Value),
}

impl Datum {
    /// The field type of this value, or `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(FieldType::Bool),
            Datum::Int(_) => Some(FieldType::Int),
            Datum::Float(_) => Some(FieldType::Float),
            Datum::String(_) => Some(FieldType::String),
            Datum::Timestamp(_) => Some(FieldType::Timestamp),
            Datum::Json(_) => Some(FieldType::Json),
        }
    }
}

/// Definition of a column in a destination table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Column type
    pub field_type: FieldType,
    /// Whether the column admits nulls
    pub nullable: bool,
    /// Whether the column is computed rather than stored as written
    pub is_virtual: bool,
    /// Whether the column participates in the primary index key
    pub in_primary_key: bool,
}

impl ColumnDef {
    /// Create a stored, nullable, non-key column.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            is_virtual: false,
            in_primary_key: false,
        }
    }

    /// Mark the column as part of the primary index key.
    pub fn primary_key(mut self) -> Self {
        self.in_primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark the column as computed/virtual.
    pub fn computed_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Mark the column as non-nullable.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A destination table descriptor at one schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Destination table identifier
    pub id: TableId,
    /// Table name, for diagnostics
    pub name: String,
    /// Schema version; bumped on any DDL against the table
    pub version: SchemaVersion,
    /// Ordered columns; decoded row values align with this order
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Create a schema at version 1.
    pub fn new(id: TableId, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            id,
            name: name.into(),
            version: 1,
            columns,
        }
    }

    /// Return a copy of this schema at a different version.
    pub fn at_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    /// Indices of the columns stored in the primary index.
    ///
    /// These are the writable columns: all non-virtual columns, plus virtual
    /// columns that participate in the primary index key. Virtual columns
    /// stored only in secondary indexes are assumed disallowed upstream, so
    /// they are simply skipped here.
    pub fn writable_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_virtual || c.in_primary_key)
            .map(|(i, _)| i)
            .collect()
    }
}
