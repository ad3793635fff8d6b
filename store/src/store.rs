//! In-memory destination store.
//!
//! [`MemoryStore`] implements the origin-timestamp conditional-write
//! protocol over per-table key/value maps. Commit evaluation order per
//! mutation: the last-writer-wins gate first, then the expected-value
//! precondition, then the deadline. Deletes leave tombstones carrying the
//! delete's origin stamp, so a key's applied origin timestamp is
//! monotonically non-decreasing.

use crate::clock::Clock;
use dashmap::DashMap;
use relay_engine::{
    ConditionFailed, DestinationStore, Mutation, MutationKind, OriginTimestamp, RowKey, RowValue,
    StorageError, StorageTxn, TableId, Timestamp,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone)]
struct StoredCell {
    raw: Vec<u8>,
    origin: OriginTimestamp,
    tombstone: bool,
}

struct StoreInner {
    tables: DashMap<TableId, HashMap<RowKey, StoredCell>>,
    clock: Arc<dyn Clock>,
    /// Serializes commit evaluation so condition checks and applies are
    /// atomic across transactions.
    commit_lock: Mutex<()>,
}

/// An in-memory multi-table store honoring origin-timestamp conditional
/// writes. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store on `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tables: DashMap::new(),
                clock,
                commit_lock: Mutex::new(()),
            }),
        }
    }

    /// The live (non-tombstone) row at `key`, with its origin stamp.
    pub fn live_row(&self, table: TableId, key: &[u8]) -> Option<(Vec<u8>, OriginTimestamp)> {
        self.inner.tables.get(&table).and_then(|t| {
            t.get(key)
                .filter(|c| !c.tombstone)
                .map(|c| (c.raw.clone(), c.origin))
        })
    }

    /// The origin stamp stored at `key`, tombstone included.
    pub fn stored_origin(&self, table: TableId, key: &[u8]) -> Option<OriginTimestamp> {
        self.inner
            .tables
            .get(&table)
            .and_then(|t| t.get(key).map(|c| c.origin))
    }

    /// Whether `key` currently holds a tombstone.
    pub fn is_tombstone(&self, table: TableId, key: &[u8]) -> bool {
        self.inner
            .tables
            .get(&table)
            .and_then(|t| t.get(key).map(|c| c.tombstone))
            .unwrap_or(false)
    }

    /// Number of live rows in `table`.
    pub fn live_count(&self, table: TableId) -> usize {
        self.inner
            .tables
            .get(&table)
            .map(|t| t.values().filter(|c| !c.tombstone).count())
            .unwrap_or(0)
    }

    /// Write a row directly, bypassing the conditional protocol. Simulates
    /// an independent writer racing the replication stream.
    pub fn force_put(&self, table: TableId, key: RowKey, raw: Vec<u8>, origin: OriginTimestamp) {
        self.inner.tables.entry(table).or_default().insert(
            key,
            StoredCell {
                raw,
                origin,
                tombstone: false,
            },
        );
    }

    /// Delete a row directly, leaving a tombstone at `origin`.
    pub fn force_delete(&self, table: TableId, key: RowKey, origin: OriginTimestamp) {
        self.inner.tables.entry(table).or_default().insert(
            key,
            StoredCell {
                raw: Vec::new(),
                origin,
                tombstone: true,
            },
        );
    }
}

impl DestinationStore for MemoryStore {
    fn begin(&self) -> Box<dyn StorageTxn> {
        Box::new(MemoryTxn {
            start_ts: self.inner.clock.now(),
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            deadline: None,
        })
    }
}

/// One short-lived transaction against a [`MemoryStore`].
struct MemoryTxn {
    inner: Arc<StoreInner>,
    staged: Vec<Mutation>,
    deadline: Option<Timestamp>,
    start_ts: Timestamp,
}

impl StorageTxn for MemoryTxn {
    fn provisional_commit_ts(&self) -> Timestamp {
        self.start_ts
    }

    fn update_deadline(&mut self, deadline: Timestamp) {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
    }

    fn stage(&mut self, mutation: Mutation) {
        self.staged.push(mutation);
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let inner = &self.inner;
        let _guard = inner
            .commit_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let commit_ts = inner.clock.now();
        if let Some(deadline) = self.deadline {
            if commit_ts >= deadline {
                return Err(StorageError::DeadlineExceeded {
                    deadline,
                    commit_ts,
                });
            }
        }

        // Evaluate every condition before applying anything, so a failed
        // commit leaves the store untouched.
        for mutation in &self.staged {
            inner.check(mutation)?;
        }
        for mutation in self.staged {
            inner.apply(mutation);
        }
        Ok(())
    }
}

impl StoreInner {
    fn check(&self, m: &Mutation) -> Result<(), StorageError> {
        let cell = self
            .tables
            .get(&m.table)
            .and_then(|t| t.get(&m.key).cloned());

        // LWW gate: the incoming origin must be strictly newer than
        // whatever version is stored, tombstones included. Ties fall to the
        // replica-id comparison inside the origin ordering.
        if let Some(cell) = &cell {
            if m.origin <= cell.origin {
                tracing::debug!(
                    table = m.table,
                    stored = %cell.origin,
                    incoming = %m.origin,
                    "write lost last-writer-wins race"
                );
                return Err(StorageError::Condition(ConditionFailed {
                    lost_to_newer_timestamp: true,
                    had_stale_precondition: false,
                    actual_value: None,
                }));
            }
        }

        // Expected-value precondition: tombstones and absent rows both
        // present as "no stored bytes".
        let actual: &[u8] = match &cell {
            Some(c) if !c.tombstone => &c.raw,
            _ => &[],
        };
        if actual != m.expected.as_slice() {
            let actual_value = cell.as_ref().map(|c| {
                let raw = if c.tombstone { Vec::new() } else { c.raw.clone() };
                RowValue::new(raw, c.origin.at)
            });
            tracing::debug!(table = m.table, "stale precondition on conditional write");
            return Err(StorageError::Condition(ConditionFailed {
                lost_to_newer_timestamp: false,
                had_stale_precondition: true,
                actual_value,
            }));
        }
        Ok(())
    }

    fn apply(&self, m: Mutation) {
        let tombstone = m.kind == MutationKind::Delete;
        self.tables.entry(m.table).or_default().insert(
            m.key,
            StoredCell {
                raw: m.new,
                origin: m.origin,
                tombstone,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TABLE: TableId = 1;

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::new(clock.clone());
        (clock, store)
    }

    fn origin(ts: u64, replica: u32) -> OriginTimestamp {
        OriginTimestamp::new(Timestamp::new(ts, 0), replica)
    }

    fn commit_one(store: &MemoryStore, m: Mutation) -> Result<(), StorageError> {
        let mut txn = store.begin();
        txn.stage(m);
        txn.commit()
    }

    #[test]
    fn insert_into_empty_key_applies() {
        let (_clock, store) = store();
        commit_one(
            &store,
            Mutation::insert(TABLE, b"k".to_vec(), b"v1".to_vec(), origin(5, 1)),
        )
        .unwrap();

        assert_eq!(
            store.live_row(TABLE, b"k"),
            Some((b"v1".to_vec(), origin(5, 1)))
        );
    }

    #[test]
    fn older_write_loses_lww_gate() {
        let (_clock, store) = store();
        store.force_put(TABLE, b"k".to_vec(), b"v5".to_vec(), origin(5, 1));

        let err = commit_one(
            &store,
            Mutation::insert(TABLE, b"k".to_vec(), b"v3".to_vec(), origin(3, 1)),
        )
        .unwrap_err();

        match err {
            StorageError::Condition(cond) => {
                assert!(cond.lost_to_newer_timestamp);
                assert!(!cond.had_stale_precondition);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Loser left no trace.
        assert_eq!(
            store.live_row(TABLE, b"k"),
            Some((b"v5".to_vec(), origin(5, 1)))
        );
    }

    #[test]
    fn equal_origin_is_a_loss() {
        let (_clock, store) = store();
        store.force_put(TABLE, b"k".to_vec(), b"v".to_vec(), origin(5, 1));

        let err = commit_one(
            &store,
            Mutation::update(TABLE, b"k".to_vec(), b"v".to_vec(), b"w".to_vec(), origin(5, 1)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Condition(c) if c.lost_to_newer_timestamp
        ));
    }

    #[test]
    fn equal_timestamp_higher_replica_wins_tie() {
        let (_clock, store) = store();
        store.force_put(TABLE, b"k".to_vec(), b"v".to_vec(), origin(5, 1));

        commit_one(
            &store,
            Mutation::update(TABLE, b"k".to_vec(), b"v".to_vec(), b"w".to_vec(), origin(5, 2)),
        )
        .unwrap();
        assert_eq!(
            store.live_row(TABLE, b"k"),
            Some((b"w".to_vec(), origin(5, 2)))
        );
    }

    #[test]
    fn stale_precondition_reports_actual_value() {
        let (_clock, store) = store();
        store.force_put(TABLE, b"k".to_vec(), b"disk".to_vec(), origin(5, 1));

        // Winner by timestamp, but assumed the wrong previous value.
        let err = commit_one(
            &store,
            Mutation::update(
                TABLE,
                b"k".to_vec(),
                b"assumed".to_vec(),
                b"w".to_vec(),
                origin(8, 1),
            ),
        )
        .unwrap_err();

        match err {
            StorageError::Condition(cond) => {
                assert!(cond.had_stale_precondition);
                assert!(!cond.lost_to_newer_timestamp);
                assert_eq!(
                    cond.actual_value,
                    Some(RowValue::new(b"disk".to_vec(), Timestamp::new(5, 0)))
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn insert_over_absent_key_with_stale_expectation() {
        let (_clock, store) = store();
        // Update expecting bytes, but the key is empty.
        let err = commit_one(
            &store,
            Mutation::update(TABLE, b"k".to_vec(), b"old".to_vec(), b"w".to_vec(), origin(8, 1)),
        )
        .unwrap_err();

        match err {
            StorageError::Condition(cond) => {
                assert!(cond.had_stale_precondition);
                assert_eq!(cond.actual_value, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn delete_leaves_tombstone_with_delete_origin() {
        let (_clock, store) = store();
        store.force_put(TABLE, b"k".to_vec(), b"v".to_vec(), origin(5, 1));

        commit_one(
            &store,
            Mutation::delete(TABLE, b"k".to_vec(), b"v".to_vec(), origin(7, 1), false),
        )
        .unwrap();

        assert_eq!(store.live_row(TABLE, b"k"), None);
        assert!(store.is_tombstone(TABLE, b"k"));
        assert_eq!(store.stored_origin(TABLE, b"k"), Some(origin(7, 1)));
    }

    #[test]
    fn tombstone_still_guards_lww() {
        let (_clock, store) = store();
        store.force_delete(TABLE, b"k".to_vec(), origin(7, 1));

        let err = commit_one(
            &store,
            Mutation::insert(TABLE, b"k".to_vec(), b"v".to_vec(), origin(6, 1)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Condition(c) if c.lost_to_newer_timestamp
        ));

        commit_one(
            &store,
            Mutation::insert(TABLE, b"k".to_vec(), b"v".to_vec(), origin(8, 1)),
        )
        .unwrap();
        assert_eq!(
            store.live_row(TABLE, b"k"),
            Some((b"v".to_vec(), origin(8, 1)))
        );
    }

    #[test]
    fn stale_precondition_over_tombstone_reports_absent_value() {
        let (_clock, store) = store();
        store.force_delete(TABLE, b"k".to_vec(), origin(5, 1));

        let err = commit_one(
            &store,
            Mutation::update(TABLE, b"k".to_vec(), b"old".to_vec(), b"w".to_vec(), origin(8, 1)),
        )
        .unwrap_err();

        match err {
            StorageError::Condition(cond) => {
                assert!(cond.had_stale_precondition);
                let actual = cond.actual_value.unwrap();
                assert!(!actual.present());
                assert_eq!(actual.timestamp, Timestamp::new(5, 0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn commit_past_deadline_fails_without_applying() {
        let (clock, store) = store();
        let mut txn = store.begin();
        txn.stage(Mutation::insert(
            TABLE,
            b"k".to_vec(),
            b"v".to_vec(),
            origin(5, 1),
        ));
        txn.update_deadline(Timestamp::new(1_500, 0));
        clock.set(2_000);

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, StorageError::DeadlineExceeded { .. }));
        assert_eq!(store.live_row(TABLE, b"k"), None);
    }

    #[test]
    fn deadline_only_tightens() {
        let (clock, store) = store();
        let mut txn = store.begin();
        txn.update_deadline(Timestamp::new(1_500, 0));
        txn.update_deadline(Timestamp::new(9_000, 0));
        txn.stage(Mutation::insert(
            TABLE,
            b"k".to_vec(),
            b"v".to_vec(),
            origin(5, 1),
        ));
        clock.set(1_600);

        // The later, looser deadline must not have overwritten the first.
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, StorageError::DeadlineExceeded { .. }));
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let (_clock, store) = store();
        store.force_put(TABLE, b"k2".to_vec(), b"v".to_vec(), origin(9, 1));

        let mut txn = store.begin();
        txn.stage(Mutation::insert(
            TABLE,
            b"k1".to_vec(),
            b"v".to_vec(),
            origin(5, 1),
        ));
        // This one loses LWW, so the whole transaction must not apply.
        txn.stage(Mutation::insert(
            TABLE,
            b"k2".to_vec(),
            b"w".to_vec(),
            origin(5, 1),
        ));

        assert!(txn.commit().is_err());
        assert_eq!(store.live_row(TABLE, b"k1"), None);
    }
}
