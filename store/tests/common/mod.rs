//! Shared pipeline wiring for integration tests: a full applier over the
//! in-memory store, lease registry, and JSON codec.
#![allow(dead_code)]

use relay_engine::{
    ApplierConfig, BatchStats, CancelToken, ChangeRecord, ColumnDef, Datum, FieldType,
    OriginTimestamp, ReplicaId, Result, RowApplier, RowValue, TableConfig, TableMapping,
    TableSchema, Timestamp, WriterRegistry,
};
use relay_store::{JsonRowCodec, LeaseRegistry, ManualClock, MemoryStore, MutationStats};
use std::sync::Arc;

pub const SRC_TABLE: u32 = 11;
pub const DST_TABLE: u32 = 42;
pub const REPLICA: ReplicaId = 1;
pub const CLOCK_START: u64 = 1_000;
pub const LEASE_NANOS: u64 = 1_000_000;

pub struct Pipeline {
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
    pub leases: Arc<LeaseRegistry>,
    pub stats: Arc<MutationStats>,
    pub applier: RowApplier,
}

pub fn schema() -> TableSchema {
    TableSchema::new(
        DST_TABLE,
        "accounts",
        vec![
            ColumnDef::new("id", FieldType::Int).primary_key(),
            ColumnDef::new("val", FieldType::String),
        ],
    )
}

pub fn pipeline() -> Pipeline {
    build(REPLICA, LEASE_NANOS)
}

pub fn pipeline_with_replica(replica: ReplicaId) -> Pipeline {
    build(replica, LEASE_NANOS)
}

pub fn pipeline_with_lease(lease_nanos: u64) -> Pipeline {
    build(REPLICA, lease_nanos)
}

fn build(replica: ReplicaId, lease_nanos: u64) -> Pipeline {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let clock = Arc::new(ManualClock::new(CLOCK_START));
    let store = MemoryStore::new(clock.clone());
    let leases = Arc::new(LeaseRegistry::new(clock.clone(), lease_nanos));
    leases.publish(schema());
    let stats = Arc::new(MutationStats::new());
    let codec = Arc::new(JsonRowCodec::new());

    let applier = RowApplier::new(
        ApplierConfig {
            replica,
            ..Default::default()
        },
        TableMapping::new([TableConfig {
            source: SRC_TABLE,
            destination: DST_TABLE,
        }]),
        WriterRegistry::new(),
        codec.clone(),
        codec,
        Arc::new(store.clone()),
        leases.clone(),
    );

    Pipeline {
        clock,
        store,
        leases,
        stats,
        applier,
    }
}

/// A change-stream key addressing `SRC_TABLE`.
pub fn key(pk: &[u8]) -> Vec<u8> {
    JsonRowCodec::encode_key(SRC_TABLE, pk)
}

/// Encoded row bytes for the two-column test schema.
pub fn row(val: &str) -> Vec<u8> {
    serde_json::to_vec(&vec![Datum::Int(1), Datum::String(val.into())]).unwrap()
}

pub fn origin(ts: u64, replica: ReplicaId) -> OriginTimestamp {
    OriginTimestamp::new(Timestamp::new(ts, 0), replica)
}

pub fn insert_rec(pk: &[u8], val: &str, ts: u64) -> ChangeRecord {
    ChangeRecord::new(
        key(pk),
        RowValue::new(row(val), Timestamp::new(ts, 0)),
        RowValue::absent(),
    )
}

pub fn update_rec(pk: &[u8], old_val: &str, old_ts: u64, val: &str, ts: u64) -> ChangeRecord {
    ChangeRecord::new(
        key(pk),
        RowValue::new(row(val), Timestamp::new(ts, 0)),
        RowValue::new(row(old_val), Timestamp::new(old_ts, 0)),
    )
}

pub fn delete_rec(pk: &[u8], old_val: &str, old_ts: u64, ts: u64) -> ChangeRecord {
    ChangeRecord::new(
        key(pk),
        RowValue::new(Vec::new(), Timestamp::new(ts, 0)),
        RowValue::new(row(old_val), Timestamp::new(old_ts, 0)),
    )
}

pub fn delete_rec_no_prev(pk: &[u8], ts: u64) -> ChangeRecord {
    ChangeRecord::new(
        key(pk),
        RowValue::new(Vec::new(), Timestamp::new(ts, 0)),
        RowValue::absent(),
    )
}

pub fn apply(p: &mut Pipeline, record: ChangeRecord) -> Result<BatchStats> {
    p.applier.handle_batch(&[record], &CancelToken::new())
}
