//! Per-table conditional writers.
//!
//! A [`TableWriter`] turns decoded rows into conditional mutations for one
//! destination table. It is built against one schema lease and must not
//! outlive it: batches it populates have to commit before the lease
//! expires, which the caller enforces by tightening the transaction
//! deadline to the lease expiration before staging.

use crate::codec::RowEncoder;
use crate::error::Result;
use crate::lease::SchemaLease;
use crate::record::DecodedRow;
use crate::schema::{Datum, TableSchema};
use crate::storage::{Mutation, StorageTxn};
use crate::{OriginTimestamp, SchemaVersion, Timestamp};
use std::sync::Arc;

/// Reserved inputs for partial-index maintenance. Carries nothing yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialIndexUpdate {}

/// Reserved inputs for vector-index maintenance. Carries nothing yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorIndexUpdate {}

/// Extension points threaded through every write. Secondary-index upkeep
/// is not required for the primary-index path, so these are pass-throughs
/// for now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceHooks {
    pub partial_index: PartialIndexUpdate,
    pub vector_index: VectorIndexUpdate,
}

/// Writes row changes for one destination table under a schema lease.
pub struct TableWriter {
    lease: Option<SchemaLease>,
    table: Arc<TableSchema>,
    version: SchemaVersion,
    expiration: Timestamp,
    encoder: Arc<dyn RowEncoder>,
    /// Indices of the primary-index-stored columns
    writable: Vec<usize>,
    old_vals: Vec<Datum>,
    new_vals: Vec<Datum>,
    /// Mutations applied through this writer that have not yet been flushed
    /// to the statistics refresher
    unreported_mutations: u64,
}

impl TableWriter {
    /// Build a writer from a freshly acquired lease.
    pub fn new(lease: SchemaLease, encoder: Arc<dyn RowEncoder>) -> Self {
        let table = Arc::clone(&lease.table);
        let version = lease.version;
        let expiration = lease.expiration;
        let writable = table.writable_indices();
        let cols = writable.len();
        Self {
            lease: Some(lease),
            table,
            version,
            expiration,
            encoder,
            writable,
            old_vals: Vec::with_capacity(cols),
            new_vals: Vec::with_capacity(cols),
            unreported_mutations: 0,
        }
    }

    /// The lease currently backing this writer, if it still holds one.
    pub fn lease(&self) -> Option<&SchemaLease> {
        self.lease.as_ref()
    }

    /// Take the lease out for release, leaving the writer unusable until
    /// [`put_lease`](Self::put_lease) restores one.
    pub fn take_lease(&mut self) -> Option<SchemaLease> {
        self.lease.take()
    }

    /// Install a replacement lease at the same schema version, keeping the
    /// existing encoding machinery.
    pub fn put_lease(&mut self, lease: SchemaLease) {
        debug_assert_eq!(lease.version, self.version);
        self.expiration = lease.expiration;
        self.lease = Some(lease);
    }

    /// Schema version the writer's machinery was built from.
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Expiration of the backing lease.
    pub fn expiration(&self) -> Timestamp {
        self.expiration
    }

    /// The leased table descriptor.
    pub fn table(&self) -> &TableSchema {
        &self.table
    }

    /// Count one applied mutation for later stats reporting.
    pub fn record_mutation(&mut self) {
        self.unreported_mutations += 1;
    }

    /// Applied mutations not yet flushed to the statistics refresher.
    pub fn unreported(&self) -> u64 {
        self.unreported_mutations
    }

    /// Drain the unreported count, zeroing it so a later flush cannot
    /// double-count.
    pub fn take_unreported(&mut self) -> u64 {
        std::mem::take(&mut self.unreported_mutations)
    }

    /// Fold unreported mutations carried over from a writer this one
    /// replaces, so rebuilds do not lose pending stats.
    pub fn carry_unreported(&mut self, count: u64) {
        self.unreported_mutations += count;
    }

    /// Stage a conditional insert of `after`, expecting no live row.
    pub fn insert_row(
        &mut self,
        txn: &mut dyn StorageTxn,
        key: &[u8],
        after: &DecodedRow,
        origin: OriginTimestamp,
        _hooks: MaintenanceHooks,
    ) -> Result<()> {
        self.fill_new(after);
        let new = self.encoder.encode_row(&self.table, &self.new_vals)?;
        txn.stage(Mutation::insert(self.table.id, key.to_vec(), new, origin));
        Ok(())
    }

    /// Stage a conditional update from `before` to `after`.
    pub fn update_row(
        &mut self,
        txn: &mut dyn StorageTxn,
        key: &[u8],
        before: &DecodedRow,
        after: &DecodedRow,
        origin: OriginTimestamp,
        _hooks: MaintenanceHooks,
    ) -> Result<()> {
        self.fill_old(before);
        self.fill_new(after);
        let expected = self.encoder.encode_row(&self.table, &self.old_vals)?;
        let new = self.encoder.encode_row(&self.table, &self.new_vals)?;
        txn.stage(Mutation::update(
            self.table.id,
            key.to_vec(),
            expected,
            new,
            origin,
        ));
        Ok(())
    }

    /// Stage a conditional delete of the version described by `before`.
    pub fn delete_row(
        &mut self,
        txn: &mut dyn StorageTxn,
        key: &[u8],
        before: &DecodedRow,
        origin: OriginTimestamp,
        _hooks: MaintenanceHooks,
    ) -> Result<()> {
        let expected = if before.is_deleted {
            // Replacing a tombstone: there is no stored value to match.
            Vec::new()
        } else {
            self.fill_old(before);
            self.encoder.encode_row(&self.table, &self.old_vals)?
        };
        txn.stage(Mutation::delete(
            self.table.id,
            key.to_vec(),
            expected,
            origin,
            before.is_deleted,
        ));
        Ok(())
    }

    fn fill_old(&mut self, row: &DecodedRow) {
        self.old_vals.clear();
        for &i in &self.writable {
            self.old_vals
                .push(row.values.get(i).cloned().unwrap_or(Datum::Null));
        }
    }

    fn fill_new(&mut self, row: &DecodedRow) {
        self.new_vals.clear();
        for &i in &self.writable {
            self.new_vals
                .push(row.values.get(i).cloned().unwrap_or(Datum::Null));
        }
    }
}
