//! The origin-timestamp conditional-write protocol.
//!
//! Every mutation the engine stages says "apply this only if it is newer
//! than what is stored, and only if what is stored is what I assumed". A
//! failed condition comes back as structured [`ConditionFailed`] metadata
//! with explicit tags; the applier branches on the tags, never on error
//! shape.

use crate::record::RowValue;
use crate::{OriginTimestamp, RowKey, TableId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The primitive storage operation a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

/// One conditional write against the destination's primary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Destination table
    pub table: TableId,
    /// Primary-key bytes (tenant prefix already stripped)
    pub key: RowKey,
    pub kind: MutationKind,
    /// Encoded bytes we expect the store to currently hold for the key;
    /// empty means we expect no live row
    pub expected: Vec<u8>,
    /// Encoded bytes to store; empty for a delete
    pub new: Vec<u8>,
    /// Origin stamp of the row version being applied
    pub origin: OriginTimestamp,
    /// For deletes: whether the version being replaced was itself a delete,
    /// which disambiguates delete-after-delete from delete-after-insert
    pub prev_was_tombstone: bool,
}

impl Mutation {
    /// A conditional insert: expects no live row at the key.
    pub fn insert(table: TableId, key: RowKey, new: Vec<u8>, origin: OriginTimestamp) -> Self {
        Self {
            table,
            key,
            kind: MutationKind::Insert,
            expected: Vec::new(),
            new,
            origin,
            prev_was_tombstone: false,
        }
    }

    /// A conditional update: expects `expected` to be stored at the key.
    pub fn update(
        table: TableId,
        key: RowKey,
        expected: Vec<u8>,
        new: Vec<u8>,
        origin: OriginTimestamp,
    ) -> Self {
        Self {
            table,
            key,
            kind: MutationKind::Update,
            expected,
            new,
            origin,
            prev_was_tombstone: false,
        }
    }

    /// A conditional delete: expects `expected` (empty when replacing a
    /// tombstone) and leaves a tombstone carrying `origin`.
    pub fn delete(
        table: TableId,
        key: RowKey,
        expected: Vec<u8>,
        origin: OriginTimestamp,
        prev_was_tombstone: bool,
    ) -> Self {
        Self {
            table,
            key,
            kind: MutationKind::Delete,
            expected,
            new: Vec::new(),
            origin,
            prev_was_tombstone,
        }
    }
}

/// Structured metadata for a failed conditional write.
///
/// Exactly one of the two flags is set by a well-behaved store; neither
/// flag set means the failure was not a timestamp condition at all and is
/// surfaced by the applier as a uniqueness violation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionFailed {
    /// The destination already holds a version at or after the write's
    /// origin timestamp: the write lost the last-writer-wins race.
    pub lost_to_newer_timestamp: bool,
    /// The write is the rightful winner, but the stored value differs from
    /// the assumed previous value; retry with `actual_value` as the new
    /// previous value.
    pub had_stale_precondition: bool,
    /// What the store actually holds, where available; absent raw bytes
    /// mean the key holds no live row.
    pub actual_value: Option<RowValue>,
}

impl fmt::Display for ConditionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lost_to_newer_timestamp={}, had_stale_precondition={}, actual_value={}",
            self.lost_to_newer_timestamp,
            self.had_stale_precondition,
            match &self.actual_value {
                Some(v) if v.present() => "present",
                Some(_) => "absent",
                None => "none",
            }
        )
    }
}

/// Errors from the destination storage layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("conditional write failed: {0}")]
    Condition(ConditionFailed),

    #[error("commit deadline exceeded: deadline {deadline}, commit attempted at {commit_ts}")]
    DeadlineExceeded {
        deadline: Timestamp,
        commit_ts: Timestamp,
    },

    #[error("transaction cancelled")]
    Cancelled,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// One short-lived, single-record unit of work against the store.
///
/// Mutations are staged and then committed atomically; a failed commit
/// applies nothing.
pub trait StorageTxn: Send {
    /// The timestamp this transaction will commit at if nothing intervenes.
    /// Writers are validated against it before staging.
    fn provisional_commit_ts(&self) -> Timestamp;

    /// Tighten the commit deadline; a later call can only move it earlier.
    fn update_deadline(&mut self, deadline: Timestamp);

    /// Stage one conditional mutation.
    fn stage(&mut self, mutation: Mutation);

    /// Commit everything staged, evaluating conditions atomically.
    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// The destination storage layer.
pub trait DestinationStore: Send + Sync {
    fn begin(&self) -> Box<dyn StorageTxn>;
}
