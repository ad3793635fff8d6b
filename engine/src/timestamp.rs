//! Origin timestamps for last-writer-wins ordering.
//!
//! Every replicated row version carries the commit timestamp it received on
//! its source replica. Comparing those stamps is what decides which write
//! survives when two replicas race on the same key.

use crate::ReplicaId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A hybrid-logical commit timestamp.
///
/// Ordered by wall clock first, then by the logical component. The logical
/// component disambiguates writes that land in the same wall-clock tick.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Timestamp {
    /// Nanoseconds since the Unix epoch
    pub wall_nanos: u64,
    /// Logical tick within a wall-clock nanosecond
    pub logical: u32,
}

impl Timestamp {
    /// Create a timestamp from its components.
    pub const fn new(wall_nanos: u64, logical: u32) -> Self {
        Self { wall_nanos, logical }
    }

    /// The zero timestamp, ordered before every real commit time.
    pub const ZERO: Timestamp = Timestamp::new(0, 0);

    /// Offset the wall component forward, saturating on overflow.
    pub fn add_nanos(self, nanos: u64) -> Self {
        Self {
            wall_nanos: self.wall_nanos.saturating_add(nanos),
            logical: self.logical,
        }
    }

    /// Whether this timestamp is unset.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.wall_nanos, self.logical)
    }
}

/// The causal stamp a row version received at its source of truth.
///
/// Ordering rules:
/// 1. Higher commit timestamp wins
/// 2. If timestamps are equal, the numerically higher replica id wins
///
/// Rule 2 is the tie-break for writes committed at the same instant on
/// different replicas; it makes conflict resolution deterministic no matter
/// which replica's write arrives first. An exact duplicate (same timestamp,
/// same replica) compares equal and therefore never beats what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginTimestamp {
    /// Commit timestamp assigned by the source replica
    pub at: Timestamp,
    /// Identifier of the replica that produced this row version
    pub replica: ReplicaId,
}

impl OriginTimestamp {
    /// Create an origin stamp for a write committed at `at` on `replica`.
    pub const fn new(at: Timestamp, replica: ReplicaId) -> Self {
        Self { at, replica }
    }
}

impl Ord for OriginTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.at.cmp(&other.at) {
            Ordering::Equal => self.replica.cmp(&other.replica),
            other => other,
        }
    }
}

impl PartialOrd for OriginTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OriginTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@r{}", self.at, self.replica)
    }
}
