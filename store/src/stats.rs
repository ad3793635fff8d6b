//! Mutation-count collection.

use dashmap::DashMap;
use relay_engine::{StatsRefresher, TableId};

/// Accumulates applied-mutation counts per destination table. The applier
/// flushes into this through the [`StatsRefresher`] seam.
#[derive(Debug, Default)]
pub struct MutationStats {
    counts: DashMap<TableId, u64>,
}

impl MutationStats {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutations reported against `table`.
    pub fn count(&self, table: TableId) -> u64 {
        self.counts.get(&table).map(|c| *c).unwrap_or(0)
    }

    /// Mutations reported across all tables.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|e| *e.value()).sum()
    }
}

impl StatsRefresher for MutationStats {
    fn notify_mutation(&self, table: TableId, count: u64) {
        *self.counts.entry(table).or_insert(0) += count;
    }
}
