//! Change records and decoded rows.
//!
//! A [`ChangeRecord`] is one event captured from the source cluster's change
//! stream: a key, the row's current wire value (empty for a delete), and the
//! wire value it replaced. The row decoder turns either side into a
//! [`DecodedRow`] of typed column values.

use crate::codec::DecodeError;
use crate::schema::Datum;
use crate::{RowKey, TableId, Timestamp};
use serde::{Deserialize, Serialize};

/// Marker byte that introduces a multi-tenant key prefix.
pub const TENANT_PREFIX: u8 = 0xfe;

/// The wire form of one row version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowValue {
    /// Encoded row bytes; empty means the row is absent (a delete)
    pub raw: Vec<u8>,
    /// Commit timestamp the source assigned to this version
    pub timestamp: Timestamp,
}

impl RowValue {
    /// Create a value from encoded bytes and its source commit timestamp.
    pub fn new(raw: Vec<u8>, timestamp: Timestamp) -> Self {
        Self { raw, timestamp }
    }

    /// A value representing an absent row.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Whether the value carries row bytes.
    pub fn present(&self) -> bool {
        !self.raw.is_empty()
    }
}

/// One event from the source change stream. Identity is the key; the record
/// itself is immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Destination primary-key bytes, possibly tenant-prefixed
    pub key: RowKey,
    /// The row version this event produced; empty raw bytes for a delete
    pub value: RowValue,
    /// The row version this event replaced, as seen by the source stream
    pub prev_value: RowValue,
}

impl ChangeRecord {
    /// Create a change record.
    pub fn new(key: RowKey, value: RowValue, prev_value: RowValue) -> Self {
        Self {
            key,
            value,
            prev_value,
        }
    }
}

/// Which side of a change record is being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPart {
    /// The value the event produced
    Current,
    /// The value the event replaced
    Previous,
}

/// The typed form of one row version, produced by the row decoder.
///
/// Re-produced on every refresh retry, since the previous value may have
/// been replaced by what the store actually holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedRow {
    /// Source table the row belongs to
    pub source_table: TableId,
    /// Column values, aligned with the source table's column order
    pub values: Vec<Datum>,
    /// Whether this version is a delete
    pub is_deleted: bool,
    /// Commit timestamp of this version at its source of truth
    pub origin: Timestamp,
}

/// Prepend a tenant prefix to a key.
pub fn prefix_tenant(tenant: u64, key: &[u8]) -> RowKey {
    let mut out = Vec::with_capacity(9 + key.len());
    out.push(TENANT_PREFIX);
    out.extend_from_slice(&tenant.to_be_bytes());
    out.extend_from_slice(key);
    out
}

/// Strip a tenant prefix from a key, if one is present.
///
/// Keys from single-tenant sources pass through unchanged. A marker byte
/// without the full 8-byte tenant id behind it is a malformed key.
pub fn strip_tenant_prefix(key: &[u8]) -> Result<&[u8], DecodeError> {
    match key.first() {
        Some(&TENANT_PREFIX) => {
            if key.len() < 9 {
                return Err(DecodeError::TruncatedTenantPrefix);
            }
            Ok(&key[9..])
        }
        _ => Ok(key),
    }
}
