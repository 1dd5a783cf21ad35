//! Partition Profiling
//!
//! Every partition keeps a fixed set of cumulative counters: the number of
//! transactions it finished and a handful of named timing totals. The owning
//! execution context updates them; a reporting path on another thread reads
//! them through [`ProfilerStats`].
//!
//! # Locking
//!
//! Counters sit behind a `parking_lot::Mutex` shared between the execution
//! context and the stats source. The execution context holds the lock only
//! for the duration of a counter update; the stats source holds it while
//! copying one row. Dependency states themselves are never locked.

mod measurement;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::dependency::PartitionId;

pub use measurement::ProfileMeasurement;
pub use stats::{ProfilerStats, StatsRow};

/// Named activities timed by a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    /// Waiting for work.
    Idle,
    /// Executing single-partition transactions.
    ExecTxn,
    /// Executing distributed transactions.
    ExecDtxn,
    /// Storing partial results into dependencies.
    Results,
    /// Polling dependencies and releasing blocked fragments.
    Poll,
}

impl Measurement {
    /// Number of measurements.
    pub const COUNT: usize = 5;

    /// All measurements in column order.
    pub const ALL: [Measurement; Self::COUNT] = [
        Measurement::Idle,
        Measurement::ExecTxn,
        Measurement::ExecDtxn,
        Measurement::Results,
        Measurement::Poll,
    ];

    /// Lower-case measurement name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ExecTxn => "exec_txn",
            Self::ExecDtxn => "exec_dtxn",
            Self::Results => "results",
            Self::Poll => "poll",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Cumulative counters for one partition.
#[derive(Debug, Clone)]
pub struct PartitionProfiler {
    partition: PartitionId,
    num_transactions: u64,
    measurements: [ProfileMeasurement; Measurement::COUNT],
}

/// Profiler shared between an execution context and the stats source.
pub type SharedProfiler = Arc<Mutex<PartitionProfiler>>;

impl PartitionProfiler {
    /// Create zeroed counters for `partition`.
    pub fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            num_transactions: 0,
            measurements: Measurement::ALL.map(|m| ProfileMeasurement::new(m.name())),
        }
    }

    /// Create counters wrapped for sharing.
    pub fn shared(partition: PartitionId) -> SharedProfiler {
        Arc::new(Mutex::new(Self::new(partition)))
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Count a finished (committed or aborted) transaction.
    pub fn record_transaction(&mut self) {
        self.num_transactions += 1;
    }

    pub fn num_transactions(&self) -> u64 {
        self.num_transactions
    }

    pub fn measurement(&self, which: Measurement) -> &ProfileMeasurement {
        &self.measurements[which.index()]
    }

    pub fn measurement_mut(&mut self, which: Measurement) -> &mut ProfileMeasurement {
        &mut self.measurements[which.index()]
    }

    /// Add an externally timed interval to a measurement.
    pub fn record(&mut self, which: Measurement, elapsed: Duration) {
        self.measurement_mut(which).add_think_time(elapsed);
    }

    /// All measurements in column order.
    pub fn measurements(&self) -> &[ProfileMeasurement] {
        &self.measurements
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        self.num_transactions = 0;
        for m in &mut self.measurements {
            m.reset();
        }
    }
}
