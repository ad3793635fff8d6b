//! Schema leases.
//!
//! A lease is a time-bounded right to encode writes against one version of
//! a destination table's schema. Every mutation staged under a lease must
//! commit strictly before the lease expires; the writer registry couples
//! transaction deadlines to lease expirations to enforce that.

use crate::schema::TableSchema;
use crate::{SchemaVersion, TableId, Timestamp};
use std::sync::Arc;
use thiserror::Error;

/// An exclusively-owned handle on one table's schema at one version.
#[derive(Debug, Clone)]
pub struct SchemaLease {
    /// The leased table descriptor
    pub table: Arc<TableSchema>,
    /// Schema version the lease covers
    pub version: SchemaVersion,
    /// Instant after which the lease must not back any commit
    pub expiration: Timestamp,
}

impl SchemaLease {
    /// Create a lease on `table` expiring at `expiration`.
    pub fn new(table: Arc<TableSchema>, expiration: Timestamp) -> Self {
        let version = table.version;
        Self {
            table,
            version,
            expiration,
        }
    }

    /// Whether a write at `ts` may still be encoded under this lease.
    pub fn valid_at(&self, ts: Timestamp) -> bool {
        self.expiration > ts
    }
}

/// Errors from lease acquisition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaseError {
    #[error("no schema published for destination table {0}")]
    UnknownTable(TableId),

    #[error("lease acquisition cancelled")]
    Cancelled,
}

/// Grants and reclaims schema leases.
///
/// Leases are exclusively owned: the engine releases a lease exactly once,
/// before or at the moment it is replaced, and releases every held lease on
/// shutdown.
pub trait LeaseManager: Send + Sync {
    /// Acquire a lease on `table` valid for a write at `ts`.
    fn acquire(&self, ts: Timestamp, table: TableId) -> Result<SchemaLease, LeaseError>;

    /// Return a lease. Acquisition and release are paired one-to-one.
    fn release(&self, lease: SchemaLease);
}
