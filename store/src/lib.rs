//! # Relay Store
//!
//! The destination storage layer for the relay replication applier.
//!
//! `relay-engine` defines the seams (row codec, lease manager, destination
//! store, stats sink); this crate provides working implementations:
//!
//! - [`MemoryStore`]: an in-memory multi-table store honoring the
//!   origin-timestamp conditional-write protocol, with tombstones and
//!   commit deadlines
//! - [`LeaseRegistry`]: publishes table schemas and grants duration-bounded
//!   schema leases from a shared [`Clock`]
//! - [`JsonRowCodec`]: the JSON reference row encoding
//! - [`MutationStats`]: a per-table mutation-count collector
//! - [`SystemClock`] / [`ManualClock`]: wall-clock and test-driven time
//!   sources
//!
//! Together with an applier these form a complete, self-contained pipeline;
//! the integration tests under `tests/` drive exactly that wiring.

pub mod clock;
pub mod codec;
pub mod lease;
pub mod stats;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::JsonRowCodec;
pub use lease::LeaseRegistry;
pub use stats::MutationStats;
pub use store::MemoryStore;
