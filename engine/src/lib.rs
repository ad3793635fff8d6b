//! # Relay Engine
//!
//! The conflict-resolution write path of a cross-cluster logical
//! replication pipeline.
//!
//! This crate applies rows captured from a source cluster's change stream
//! directly onto a destination store, bypassing query execution. Conflicts
//! between actively-written replicas are resolved last-writer-wins, keyed
//! on the origin timestamp each row version received at its source of
//! truth.
//!
//! ## Design Principles
//!
//! - **No IO**: decoding, lease management, and storage sit behind traits;
//!   the engine itself is pure control flow
//! - **Deterministic**: the same record against the same store state always
//!   produces the same outcome, including tie-breaks
//! - **Losing is normal**: a write beaten by a newer origin timestamp is
//!   counted and dropped, never an error
//!
//! ## Core Concepts
//!
//! ### Change records
//!
//! A [`ChangeRecord`] carries a key, the row's current wire value (empty
//! for a delete), and the value it replaced. The external row decoder turns
//! either side into a [`DecodedRow`] of typed [`Datum`]s.
//!
//! ### The conditional-write protocol
//!
//! Every staged [`Mutation`] carries the write's [`OriginTimestamp`] and
//! the bytes it expects the store to hold. A conditional failure comes back
//! as [`ConditionFailed`] with explicit tags: lost the LWW race, stale
//! precondition (retry with the store-reported actual value), or neither
//! (a uniqueness violation).
//!
//! ### Writers and leases
//!
//! A [`TableWriter`] encodes rows for one destination table under a
//! [`SchemaLease`]; the [`WriterRegistry`] caches one writer per table,
//! re-leasing or rebuilding as leases expire and schema versions change.
//! Transaction deadlines are tightened to lease expirations so no write
//! ever commits against a schema that may have changed.
//!
//! ### The applier
//!
//! [`RowApplier`] is the entry point: one change record per invocation,
//! applied in its own single-row transaction, with a bounded
//! refresh-and-retry loop for stale preconditions.
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_engine::{TableConfig, TableMapping};
//!
//! // Resolve source tables to destination tables; a decoded row whose
//! // source table is unmapped is a configuration error.
//! let mapping = TableMapping::new([TableConfig {
//!     source: 11,
//!     destination: 42,
//! }]);
//! assert_eq!(mapping.destination(11), Some(42));
//! assert_eq!(mapping.destination(12), None);
//! ```
//!
//! Wiring a full applier takes a row codec, a lease manager, and a
//! destination store; `relay-store` provides reference implementations of
//! all three.

pub mod applier;
pub mod cancel;
pub mod codec;
pub mod error;
pub mod fault;
pub mod lease;
pub mod record;
pub mod registry;
pub mod schema;
pub mod stats;
pub mod storage;
pub mod timestamp;
pub mod writer;

// Re-export main types at crate root
pub use applier::{
    ApplierConfig, DiscardMode, RowApplier, TableConfig, TableMapping, MAX_REFRESH_COUNT,
};
pub use cancel::CancelToken;
pub use codec::{DecodeError, EncodeError, RowDecoder, RowEncoder};
pub use error::{Error, Result};
pub use fault::FailureInjector;
pub use lease::{LeaseError, LeaseManager, SchemaLease};
pub use record::{
    prefix_tenant, strip_tenant_prefix, ChangeRecord, DecodedRow, RowPart, RowValue, TENANT_PREFIX,
};
pub use registry::WriterRegistry;
pub use schema::{ColumnDef, Datum, FieldType, TableSchema};
pub use stats::{BatchStats, StatsRefresher};
pub use storage::{
    ConditionFailed, DestinationStore, Mutation, MutationKind, StorageError, StorageTxn,
};
pub use timestamp::{OriginTimestamp, Timestamp};
pub use writer::{MaintenanceHooks, PartialIndexUpdate, TableWriter, VectorIndexUpdate};

/// Type aliases for clarity
pub type TableId = u32;
pub type ReplicaId = u32;
pub type SchemaVersion = u64;
pub type RowKey = Vec<u8>;
