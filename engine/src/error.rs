//! Error types for the relay engine.
//!
//! Only two conflict outcomes are recovered inside the engine: losing the
//! last-writer-wins race and refreshing a stale precondition. Everything
//! here propagates to the caller, which owns retry-splitting, dead-letter
//! routing, and job failure.

use crate::codec::{DecodeError, EncodeError};
use crate::lease::LeaseError;
use crate::storage::{ConditionFailed, StorageError};
use crate::TableId;
use thiserror::Error;

/// All fatal errors from the relay engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("decoding change record: {0}")]
    Decode(#[from] DecodeError),

    #[error("encoding row: {0}")]
    Encode(#[from] EncodeError),

    /// A decoded row referenced a source table with no configured
    /// destination. This is a setup bug, not a data problem.
    #[error("replication configuration missing for source table {0}")]
    MissingMapping(TableId),

    #[error("acquiring schema lease: {0}")]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A conditional-write failure carrying neither timestamp signal;
    /// persistent, so the caller should dead-letter the record rather than
    /// retry it.
    #[error("duplicate key value violates unique constraint: {0}")]
    UniqueViolation(ConditionFailed),

    /// The stale-precondition refresh loop failed to converge.
    #[error("max refresh count ({max}) reached")]
    RefreshLimitExceeded { max: u32 },

    #[error("operation cancelled")]
    Cancelled,

    /// More than one change record per invocation; multi-row transactions
    /// are deliberately unimplemented.
    #[error("multi-row batches not supported: got {0} records")]
    UnsupportedBatch(usize),

    #[error("synthetic failure injected")]
    SyntheticFailure,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MissingMapping(42);
        assert_eq!(
            err.to_string(),
            "replication configuration missing for source table 42"
        );

        let err = Error::RefreshLimitExceeded { max: 10 };
        assert_eq!(err.to_string(), "max refresh count (10) reached");

        let err = Error::UnsupportedBatch(3);
        assert_eq!(
            err.to_string(),
            "multi-row batches not supported: got 3 records"
        );
    }

    #[test]
    fn storage_error_is_transparent() {
        let err: Error = StorageError::Backend("disk full".into()).into();
        assert_eq!(err.to_string(), "storage backend error: disk full");
    }

    #[test]
    fn unique_violation_names_the_condition() {
        let err = Error::UniqueViolation(ConditionFailed::default());
        assert!(err
            .to_string()
            .starts_with("duplicate key value violates unique constraint"));
    }
}
