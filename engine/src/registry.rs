//! The writer registry.
//!
//! One live [`TableWriter`] per destination table, for the lifetime of the
//! applier that owns the registry. The registry enforces the lease rules: a
//! cached writer is only reused while its lease expiration is strictly
//! after the pending write's timestamp, a stale lease is released before
//! its replacement is acquired, and a version change rebuilds the writer
//! wholesale rather than partially mutating it.

use crate::codec::RowEncoder;
use crate::lease::{LeaseError, LeaseManager};
use crate::stats::StatsRefresher;
use crate::writer::TableWriter;
use crate::{TableId, Timestamp};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache of per-table writers, owned by exactly one applier.
#[derive(Default)]
pub struct WriterRegistry {
    writers: HashMap<TableId, TableWriter>,
}

impl WriterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached writers.
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Whether the registry holds no writers.
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Return a writer for `table` valid for a write at `ts`, acquiring or
    /// refreshing its schema lease as needed.
    pub fn writer_for(
        &mut self,
        leases: &dyn LeaseManager,
        encoder: &Arc<dyn RowEncoder>,
        table: TableId,
        ts: Timestamp,
    ) -> Result<&mut TableWriter, LeaseError> {
        let entry = match self.writers.entry(table) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(entry) => {
                let lease = leases.acquire(ts, table)?;
                return Ok(entry.insert(TableWriter::new(lease, Arc::clone(encoder))));
            }
        };

        let w = entry.into_mut();
        if w.lease().is_some_and(|l| l.valid_at(ts)) {
            return Ok(w);
        }

        // The lease is missing or too old for this write; give it back
        // before acquiring its replacement.
        if let Some(old) = w.take_lease() {
            leases.release(old);
        }
        let lease = leases.acquire(ts, table)?;

        if w.version() == lease.version {
            // Same schema version: swap only the lease and keep the
            // encoding machinery.
            w.put_lease(lease);
        } else {
            // New schema version: rebuild from scratch, keeping any
            // not-yet-reported mutation count.
            let carried = w.take_unreported();
            *w = TableWriter::new(lease, Arc::clone(encoder));
            w.carry_unreported(carried);
        }
        Ok(w)
    }

    /// Count one applied mutation against `table`'s writer.
    pub fn record_mutation(&mut self, table: TableId) {
        if let Some(w) = self.writers.get_mut(&table) {
            w.record_mutation();
        }
    }

    /// Flush every writer's pending mutation count to `refresher`, zeroing
    /// each as it is reported so a later flush cannot double-count.
    pub fn report_mutations(&mut self, refresher: &dyn StatsRefresher) {
        for w in self.writers.values_mut() {
            if w.unreported() > 0 {
                let table = w.table().id;
                refresher.notify_mutation(table, w.take_unreported());
            }
        }
    }

    /// Release every held lease. Safe to call more than once; each lease is
    /// released exactly once.
    pub fn release_all(&mut self, leases: &dyn LeaseManager) {
        for w in self.writers.values_mut() {
            if let Some(lease) = w.take_lease() {
                leases.release(lease);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncodeError;
    use crate::lease::SchemaLease;
    use crate::schema::{ColumnDef, Datum, FieldType, TableSchema};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct JsonEncoder;

    impl RowEncoder for JsonEncoder {
        fn encode_row(
            &self,
            _table: &TableSchema,
            values: &[Datum],
        ) -> Result<Vec<u8>, EncodeError> {
            serde_json::to_vec(values).map_err(|e| EncodeError::Unencodable(e.to_string()))
        }
    }

    struct StubLeases {
        schema: Mutex<Arc<TableSchema>>,
        lease_nanos: u64,
        acquires: AtomicUsize,
        releases: AtomicUsize,
    }

    impl StubLeases {
        fn new(schema: TableSchema, lease_nanos: u64) -> Self {
            Self {
                schema: Mutex::new(Arc::new(schema)),
                lease_nanos,
                acquires: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
            }
        }

        fn publish(&self, schema: TableSchema) {
            *self.schema.lock().unwrap() = Arc::new(schema);
        }

        fn acquires(&self) -> usize {
            self.acquires.load(Ordering::SeqCst)
        }

        fn releases(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    impl LeaseManager for StubLeases {
        fn acquire(&self, ts: Timestamp, _table: TableId) -> Result<SchemaLease, LeaseError> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            let schema = Arc::clone(&self.schema.lock().unwrap());
            Ok(SchemaLease::new(schema, ts.add_nanos(self.lease_nanos)))
        }

        fn release(&self, _lease: SchemaLease) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CollectStats {
        notified: Mutex<Vec<(TableId, u64)>>,
    }

    impl CollectStats {
        fn new() -> Self {
            Self {
                notified: Mutex::new(Vec::new()),
            }
        }
    }

    impl StatsRefresher for CollectStats {
        fn notify_mutation(&self, table: TableId, count: u64) {
            self.notified.lock().unwrap().push((table, count));
        }
    }

    fn test_schema() -> TableSchema {
        TableSchema::new(
            9,
            "orders",
            vec![
                ColumnDef::new("id", FieldType::Int).primary_key(),
                ColumnDef::new("total", FieldType::Float),
            ],
        )
    }

    fn encoder() -> Arc<dyn RowEncoder> {
        Arc::new(JsonEncoder)
    }

    #[test]
    fn first_use_acquires_a_lease() {
        let leases = StubLeases::new(test_schema(), 1_000);
        let mut reg = WriterRegistry::new();

        let w = reg
            .writer_for(&leases, &encoder(), 9, Timestamp::new(10, 0))
            .unwrap();
        assert_eq!(w.version(), 1);
        assert_eq!(leases.acquires(), 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn valid_lease_is_reused() {
        let leases = StubLeases::new(test_schema(), 1_000);
        let mut reg = WriterRegistry::new();
        let enc = encoder();

        reg.writer_for(&leases, &enc, 9, Timestamp::new(10, 0)).unwrap();
        reg.writer_for(&leases, &enc, 9, Timestamp::new(500, 0)).unwrap();

        assert_eq!(leases.acquires(), 1);
        assert_eq!(leases.releases(), 0);
    }

    #[test]
    fn expired_lease_is_released_and_swapped() {
        let leases = StubLeases::new(test_schema(), 1_000);
        let mut reg = WriterRegistry::new();
        let enc = encoder();

        reg.writer_for(&leases, &enc, 9, Timestamp::new(10, 0)).unwrap();
        // Write at the lease expiration: strictly-after rule forbids reuse.
        let w = reg
            .writer_for(&leases, &enc, 9, Timestamp::new(1_010, 0))
            .unwrap();

        assert_eq!(leases.acquires(), 2);
        assert_eq!(leases.releases(), 1);
        // Same schema version, so the machinery survived the swap.
        assert_eq!(w.version(), 1);
        assert_eq!(w.expiration(), Timestamp::new(2_010, 0));
    }

    #[test]
    fn version_bump_rebuilds_the_writer() {
        let leases = StubLeases::new(test_schema(), 1_000);
        let mut reg = WriterRegistry::new();
        let enc = encoder();

        reg.writer_for(&leases, &enc, 9, Timestamp::new(10, 0)).unwrap();
        reg.record_mutation(9);

        leases.publish(test_schema().at_version(2));
        let w = reg
            .writer_for(&leases, &enc, 9, Timestamp::new(5_000, 0))
            .unwrap();

        assert_eq!(w.version(), 2);
        // Pending stats survive the rebuild.
        assert_eq!(w.unreported(), 1);
    }

    #[test]
    fn release_all_releases_each_lease_once() {
        let leases = StubLeases::new(test_schema(), 1_000);
        let mut reg = WriterRegistry::new();
        let enc = encoder();

        reg.writer_for(&leases, &enc, 9, Timestamp::new(10, 0)).unwrap();
        reg.release_all(&leases);
        reg.release_all(&leases);

        assert_eq!(leases.releases(), 1);
    }

    #[test]
    fn report_mutations_flushes_and_resets() {
        let leases = StubLeases::new(test_schema(), 1_000);
        let mut reg = WriterRegistry::new();
        let enc = encoder();
        let stats = CollectStats::new();

        reg.writer_for(&leases, &enc, 9, Timestamp::new(10, 0)).unwrap();
        reg.record_mutation(9);
        reg.record_mutation(9);

        reg.report_mutations(&stats);
        reg.report_mutations(&stats);

        let notified = stats.notified.lock().unwrap();
        assert_eq!(*notified, vec![(9, 2)]);
    }

    #[test]
    fn record_mutation_for_unknown_table_is_a_noop() {
        let mut reg = WriterRegistry::new();
        reg.record_mutation(1234);
        assert!(reg.is_empty());
    }
}
