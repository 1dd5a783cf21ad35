//! Profiler Stats Source
//!
//! Exposes the per-partition counters as rows keyed by partition id. The
//! column set is fixed: `PARTITION`, `TRANSACTIONS`, then one column per
//! measurement holding its total think time. How rows are shipped or
//! rendered is up to the caller; rows only need to be serializable.

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;

use super::{Measurement, SharedProfiler};
use crate::dependency::PartitionId;

/// One snapshot row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsRow {
    /// Partition the counters belong to.
    pub partition: PartitionId,
    /// Finished transactions.
    pub transactions: u64,
    /// Total think time per measurement, in nanoseconds, in column order.
    pub timings: IndexMap<&'static str, u64>,
}

impl StatsRow {
    /// Row values aligned with [`ProfilerStats::columns`].
    pub fn values(&self) -> Vec<u64> {
        let mut values = Vec::with_capacity(2 + self.timings.len());
        values.push(u64::from(self.partition.raw()));
        values.push(self.transactions);
        values.extend(self.timings.values().copied());
        values
    }
}

/// Registry of partition profilers readable from any thread.
#[derive(Debug, Default)]
pub struct ProfilerStats {
    profilers: DashMap<PartitionId, SharedProfiler>,
}

impl ProfilerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a partition's counters visible. Replaces any earlier registration.
    pub fn register(&self, profiler: SharedProfiler) {
        let partition = profiler.lock().partition();
        self.profilers.insert(partition, profiler);
    }

    /// Stop reporting a partition.
    pub fn unregister(&self, partition: PartitionId) -> Option<SharedProfiler> {
        self.profilers.remove(&partition).map(|(_, profiler)| profiler)
    }

    /// Registered partitions in ascending order.
    pub fn partitions(&self) -> Vec<PartitionId> {
        let mut partitions: Vec<_> = self.profilers.iter().map(|entry| *entry.key()).collect();
        partitions.sort_unstable();
        partitions
    }

    /// Column names.
    pub fn columns() -> Vec<String> {
        let mut columns = vec!["PARTITION".to_string(), "TRANSACTIONS".to_string()];
        columns.extend(Measurement::ALL.iter().map(|m| m.name().to_uppercase()));
        columns
    }

    /// Snapshot one partition's counters.
    pub fn row(&self, partition: PartitionId) -> Option<StatsRow> {
        let profiler = self.profilers.get(&partition)?.value().clone();
        let profiler = profiler.lock();
        Some(StatsRow {
            partition,
            transactions: profiler.num_transactions(),
            timings: profiler
                .measurements()
                .iter()
                .map(|m| (m.name(), m.total_think_time()))
                .collect(),
        })
    }

    /// Snapshot every registered partition in ascending order.
    pub fn rows(&self) -> Vec<StatsRow> {
        self.partitions()
            .into_iter()
            .filter_map(|partition| self.row(partition))
            .collect()
    }
}
