//! Batch statistics and the mutation-stats seam.

use crate::TableId;
use serde::{Deserialize, Serialize};

/// Counters accumulated while applying a batch of change records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Writes dropped because the destination already held a newer version
    pub kv_write_too_old: u64,
    /// Writes retried because the assumed previous value was stale
    pub kv_write_value_refreshes: u64,
}

impl BatchStats {
    /// Fold another set of counters into this one.
    pub fn add(&mut self, other: BatchStats) {
        self.kv_write_too_old += other.kv_write_too_old;
        self.kv_write_value_refreshes += other.kv_write_value_refreshes;
    }
}

/// Receives applied-mutation counts for table-statistics upkeep.
pub trait StatsRefresher: Send + Sync {
    fn notify_mutation(&self, table: TableId, count: u64);
}
