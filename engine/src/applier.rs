//! The conflict-resolution engine.
//!
//! [`RowApplier`] takes one change record at a time and applies it to the
//! destination store under the origin-timestamp conditional-write protocol:
//! decode, resolve the destination table, obtain a leased writer, commit a
//! single-row transaction, and interpret conditional failures. Losing the
//! last-writer-wins race is the expected steady state under bidirectional
//! replication and is counted, not raised; a stale previous-value
//! assumption is refreshed from what the store reports and retried, up to
//! [`MAX_REFRESH_COUNT`] times.

use crate::cancel::CancelToken;
use crate::codec::{RowDecoder, RowEncoder};
use crate::error::{Error, Result};
use crate::fault::FailureInjector;
use crate::lease::LeaseManager;
use crate::record::{strip_tenant_prefix, ChangeRecord, DecodedRow, RowPart, RowValue};
use crate::registry::WriterRegistry;
use crate::stats::{BatchStats, StatsRefresher};
use crate::storage::{DestinationStore, StorageError, StorageTxn};
use crate::writer::MaintenanceHooks;
use crate::{OriginTimestamp, ReplicaId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum number of times one record's write is retried after a
/// conditional failure reported a stale precondition. Intervening writes at
/// higher origin timestamps surface as LWW losses instead of further
/// refreshes, so a chain this long means the loop is not converging.
pub const MAX_REFRESH_COUNT: u32 = 10;

/// Which incoming events to drop instead of applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscardMode {
    /// Apply everything
    #[default]
    DiscardNothing,
    /// Drop delete events instead of replicating them
    DiscardAllDeletes,
}

/// Replication configuration for one destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Table identifier on the source cluster
    pub source: TableId,
    /// Table identifier on the destination cluster
    pub destination: TableId,
}

/// Source-to-destination table resolution, fixed for the applier's life.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableMapping {
    dst_by_src: HashMap<TableId, TableId>,
}

impl TableMapping {
    /// Build the mapping from per-destination-table configuration.
    pub fn new(configs: impl IntoIterator<Item = TableConfig>) -> Self {
        Self {
            dst_by_src: configs
                .into_iter()
                .map(|c| (c.source, c.destination))
                .collect(),
        }
    }

    /// Resolve a source table to its destination table.
    pub fn destination(&self, source: TableId) -> Option<TableId> {
        self.dst_by_src.get(&source).copied()
    }

    /// Number of mapped tables.
    pub fn len(&self) -> usize {
        self.dst_by_src.len()
    }

    /// Whether no tables are mapped.
    pub fn is_empty(&self) -> bool {
        self.dst_by_src.is_empty()
    }
}

/// Applier configuration.
#[derive(Debug, Clone)]
pub struct ApplierConfig {
    /// Replica id stamped onto every write from this stream; also the
    /// tie-break identity for equal origin timestamps
    pub replica: ReplicaId,
    /// Which events to drop instead of applying
    pub discard: DiscardMode,
    /// Seed for the synthetic failure injector
    pub fault_seed: u64,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            replica: 1,
            discard: DiscardMode::DiscardNothing,
            fault_seed: 0,
        }
    }
}

/// Applies change records directly to the destination storage layer,
/// bypassing any query execution.
pub struct RowApplier {
    config: ApplierConfig,
    mapping: TableMapping,
    registry: WriterRegistry,
    decoder: Arc<dyn RowDecoder>,
    encoder: Arc<dyn RowEncoder>,
    store: Arc<dyn DestinationStore>,
    leases: Arc<dyn LeaseManager>,
    /// Last decoded row, kept for dead-letter diagnostics
    last_row: Option<DecodedRow>,
    injector: FailureInjector,
}

impl RowApplier {
    /// Create an applier. The registry is passed in explicitly: one
    /// registry per applier, owned for its whole life.
    pub fn new(
        config: ApplierConfig,
        mapping: TableMapping,
        registry: WriterRegistry,
        decoder: Arc<dyn RowDecoder>,
        encoder: Arc<dyn RowEncoder>,
        store: Arc<dyn DestinationStore>,
        leases: Arc<dyn LeaseManager>,
    ) -> Self {
        let injector = FailureInjector::new(config.fault_seed);
        Self {
            config,
            mapping,
            registry,
            decoder,
            encoder,
            store,
            leases,
            last_row: None,
            injector,
        }
    }

    /// The number of change records one invocation accepts.
    pub fn batch_size(&self) -> usize {
        1
    }

    /// The last row this applier decoded, whatever the outcome of applying
    /// it. Callers use it to build dead-letter entries.
    pub fn last_row(&self) -> Option<&DecodedRow> {
        self.last_row.as_ref()
    }

    /// Set the synthetic failure rate, checked once per record before any
    /// mutation.
    pub fn set_synthetic_failure_percent(&mut self, rate: u8) {
        self.injector.set_rate(rate);
    }

    /// Apply an ordered sequence of change records.
    ///
    /// Multi-row transactions are not supported: associating a refreshed
    /// previous value from a conditional failure with the row that produced
    /// it requires per-row error attribution the protocol does not carry
    /// yet, so anything other than exactly one record fails outright.
    pub fn handle_batch(
        &mut self,
        batch: &[ChangeRecord],
        cancel: &CancelToken,
    ) -> Result<BatchStats> {
        match batch {
            [record] => {
                let mut stats = BatchStats::default();
                if self.config.discard == DiscardMode::DiscardAllDeletes
                    && !record.value.present()
                    && !record.prev_value.present()
                {
                    return Ok(stats);
                }
                stats.add(self.process_record(record, cancel)?);
                Ok(stats)
            }
            _ => Err(Error::UnsupportedBatch(batch.len())),
        }
    }

    /// Flush pending per-writer mutation counts to `refresher`.
    pub fn report_mutations(&mut self, refresher: &dyn StatsRefresher) {
        self.registry.report_mutations(refresher);
    }

    /// Release all held schema leases.
    pub fn release_leases(&mut self) {
        self.registry.release_all(self.leases.as_ref());
    }

    /// Shut the applier down, releasing every held lease.
    pub fn close(&mut self) {
        self.release_leases();
    }

    fn process_record(&mut self, record: &ChangeRecord, cancel: &CancelToken) -> Result<BatchStats> {
        let key = strip_tenant_prefix(&record.key)?;

        let row = match self.decoder.decode(key, &record.value, RowPart::Current) {
            Ok(row) => row,
            Err(err) => {
                self.last_row = None;
                return Err(Error::Decode(err));
            }
        };

        let dst = self
            .mapping
            .destination(row.source_table)
            .ok_or(Error::MissingMapping(row.source_table))?;

        self.last_row = Some(row.clone());

        if self.injector.should_fail() {
            return Err(Error::SyntheticFailure);
        }

        let mut stats = BatchStats::default();
        let key = key.to_vec();
        self.apply_one_row(dst, &row, &key, record.prev_value.clone(), &mut stats, cancel)?;
        Ok(stats)
    }

    /// Apply one decoded row inside its own single-row transaction,
    /// refreshing the previous value and retrying on stale preconditions.
    ///
    /// This is an explicit loop carrying `(refresh_count, prev)` so that
    /// the bound and the cancellation check sit in one obvious place.
    fn apply_one_row(
        &mut self,
        dst: TableId,
        row: &DecodedRow,
        key: &[u8],
        mut prev: RowValue,
        stats: &mut BatchStats,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut refresh_count: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut txn = self.store.begin();
            self.stage_row(txn.as_mut(), dst, row, key, &prev)?;

            let cond = match txn.commit() {
                Ok(()) => {
                    self.registry.record_mutation(dst);
                    return Ok(());
                }
                Err(StorageError::Condition(cond)) => cond,
                Err(StorageError::Cancelled) => return Err(Error::Cancelled),
                Err(err) => return Err(Error::Storage(err)),
            };

            if cond.lost_to_newer_timestamp {
                // The destination already holds a version at or after this
                // write's origin timestamp: drop it and move on.
                tracing::debug!(table = dst, "write lost last-writer-wins race");
                stats.kv_write_too_old += 1;
                return Ok(());
            }

            if cond.had_stale_precondition {
                // This write is the rightful winner, but the previous value
                // from the change stream no longer matches the store. Retry
                // immediately with what the store reports; any intervening
                // newer write would have produced an LWW loss instead.
                if refresh_count >= MAX_REFRESH_COUNT {
                    return Err(Error::RefreshLimitExceeded {
                        max: MAX_REFRESH_COUNT,
                    });
                }
                refresh_count += 1;
                stats.kv_write_value_refreshes += 1;
                tracing::debug!(
                    table = dst,
                    refresh_count,
                    "stale precondition; refreshing previous value"
                );
                prev = cond.actual_value.unwrap_or_else(RowValue::absent);
                continue;
            }

            // Neither timestamp signal: a persistent constraint conflict,
            // surfaced distinctly so the caller can dead-letter the record.
            return Err(Error::UniqueViolation(cond));
        }
    }

    /// Stage one row's mutation into `txn`, binding the transaction
    /// deadline to the writer's lease expiration.
    fn stage_row(
        &mut self,
        txn: &mut dyn StorageTxn,
        dst: TableId,
        row: &DecodedRow,
        key: &[u8],
        prev: &RowValue,
    ) -> Result<()> {
        let ts = txn.provisional_commit_ts();
        let writer = self
            .registry
            .writer_for(self.leases.as_ref(), &self.encoder, dst, ts)?;

        // This transaction must only commit while the lease backing the
        // writer's encoding is still live.
        txn.update_deadline(writer.expiration());

        let origin = OriginTimestamp::new(row.origin, self.config.replica);
        let hooks = MaintenanceHooks::default();

        if row.is_deleted {
            let before = self.decoder.decode(key, prev, RowPart::Previous)?;
            writer.delete_row(txn, key, &before, origin, hooks)?;
        } else if prev.present() {
            let before = self.decoder.decode(key, prev, RowPart::Previous)?;
            writer.update_row(txn, key, &before, row, origin, hooks)?;
        } else {
            writer.insert_row(txn, key, row, origin, hooks)?;
        }
        Ok(())
    }
}
