//! Row codec seams.
//!
//! Decoding raw change-stream values into typed rows and encoding typed
//! rows back into storage bytes are jobs for the surrounding system; the
//! engine only depends on these traits. `relay-store` ships a JSON
//! reference codec.

use crate::record::{DecodedRow, RowPart, RowValue};
use crate::schema::{Datum, TableSchema};
use crate::TableId;
use thiserror::Error;

/// Errors from decoding a change record into a typed row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("malformed {part:?} row value: {reason}")]
    MalformedValue { part: RowPart, reason: String },

    #[error("tenant prefix marker without a full tenant id")]
    TruncatedTenantPrefix,

    #[error("no source schema known for table {0}")]
    UnknownTable(TableId),
}

/// Errors from encoding a typed row into storage bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("table {table} expects {expected} writable columns, got {got}")]
    ColumnCountMismatch {
        table: TableId,
        expected: usize,
        got: usize,
    },

    #[error("unencodable column value: {0}")]
    Unencodable(String),
}

/// Decodes one side of a change record into typed column values.
pub trait RowDecoder: Send + Sync {
    /// Decode `value` (keyed by the already prefix-stripped `key`) into a
    /// typed row. `part` says whether this is the event's current or
    /// previous value; an empty value decodes as a delete.
    fn decode(&self, key: &[u8], value: &RowValue, part: RowPart)
        -> Result<DecodedRow, DecodeError>;
}

/// Encodes a writable-column vector into the destination storage bytes.
pub trait RowEncoder: Send + Sync {
    fn encode_row(&self, table: &TableSchema, values: &[Datum]) -> Result<Vec<u8>, EncodeError>;
}
