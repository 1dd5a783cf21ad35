//! Dependency Tracker
//!
//! The tracker is the execution-context side of dependency resolution for one
//! partition. It owns the pool of [`DependencyState`]s and indexes the live
//! ones by (transaction, round, dependency id).
//!
//! # Flow
//!
//! 1. When a fragment is dispatched, the partition registers its output
//!    dependency (`get_or_create`), the partitions it runs on
//!    (`add_partition`), and any fragments that consume it (`add_blocked`).
//! 2. Partial results are fed in as they arrive (`add_result`).
//! 3. On every tick of its run loop the partition calls `collect_ready`,
//!    which releases each dependency that just became complete exactly once
//!    and hands back the fragments that were waiting on it.
//! 4. At the end of a round or transaction the states go back to the pool
//!    (`finish_round`, `finish_txn`), complete or not (`abort_txn`).
//!
//! The tracker is not thread-safe; it is driven by the single thread that
//! owns the partition. Only its profiler is shared.

use std::hash::Hash;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::dependency::{
    DependencyId, DependencyKey, DependencyState, PartitionId, ResultTable, TxnId,
};
use crate::error::{Error, Result};
use crate::pool::{ObjectPool, PoolHandle, PoolStats};
use crate::profiler::{Measurement, PartitionProfiler, SharedProfiler};

/// Per-partition owner of dependency states.
pub struct DependencyTracker<W, R> {
    /// Partition this tracker runs on.
    partition: PartitionId,

    /// Recycled states.
    pool: ObjectPool<DependencyState<W, R>>,

    /// Live states, in registration order.
    index: IndexMap<DependencyKey, PoolHandle>,

    /// Counters shared with the stats source.
    profiler: SharedProfiler,

    /// Whether to time operations.
    profiling: bool,
}

impl<W, R> DependencyTracker<W, R>
where
    W: Eq + Hash,
    R: ResultTable,
{
    /// Create a tracker with fresh profiler counters.
    pub fn new(partition: PartitionId, config: &TrackerConfig) -> Self {
        Self::with_profiler(PartitionProfiler::shared(partition), config)
    }

    /// Create a tracker that reports into an existing profiler.
    pub fn with_profiler(profiler: SharedProfiler, config: &TrackerConfig) -> Self {
        let partition = profiler.lock().partition();
        Self {
            partition,
            pool: ObjectPool::with_config(&config.pool),
            index: IndexMap::new(),
            profiler,
            profiling: config.profiling,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Profiler counters, for registration with a stats source.
    pub fn profiler(&self) -> &SharedProfiler {
        &self.profiler
    }

    /// Number of live dependency states.
    pub fn active_count(&self) -> usize {
        self.index.len()
    }

    /// Keys of live dependency states, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = DependencyKey> + '_ {
        self.index.keys().copied()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Look up a dependency, taking a state from the pool on first use.
    pub fn get_or_create(
        &mut self,
        txn: TxnId,
        round: u32,
        stmt_index: u32,
        dependency: DependencyId,
    ) -> Result<DependencyKey> {
        let key = DependencyKey::new(txn, round, dependency);
        if self.index.contains_key(&key) {
            return Ok(key);
        }

        let handle = self.pool.acquire()?;
        if let Err(err) = self
            .pool
            .get_mut(handle)
            .and_then(|state| state.init(txn, round, stmt_index, dependency))
        {
            self.pool.release(handle)?;
            return Err(err);
        }
        self.index.insert(key, handle);
        Ok(key)
    }

    /// Register a dependency for a prefetched fragment.
    ///
    /// `dependency` is a placeholder until [`bind_prefetch`](Self::bind_prefetch)
    /// supplies the real binding.
    pub fn create_prefetch(
        &mut self,
        txn: TxnId,
        round: u32,
        stmt_index: u32,
        dependency: DependencyId,
    ) -> Result<DependencyKey> {
        let key = self.get_or_create(txn, round, stmt_index, dependency)?;
        self.state_mut(key)?.mark_prefetch();
        Ok(key)
    }

    /// Move a prefetch dependency to its real round and dependency id.
    ///
    /// Returns the new key. Fails if results already arrived for it, if it is
    /// not a prefetch dependency, or if the new key is taken.
    pub fn bind_prefetch(
        &mut self,
        key: DependencyKey,
        round: u32,
        dependency: DependencyId,
    ) -> Result<DependencyKey> {
        let handle = self.handle(key)?;
        let new_key = DependencyKey::new(key.txn, round, dependency);
        if new_key != key && self.index.contains_key(&new_key) {
            return Err(Error::DuplicateDependency {
                txn: key.txn,
                round,
                dependency,
            });
        }

        let state = self.pool.get_mut(handle)?;
        if !state.is_prefetch() {
            return Err(Error::NotPrefetch(key.dependency));
        }
        state.prefetch_override(round, dependency)?;

        self.index.shift_remove(&key);
        self.index.insert(new_key, handle);
        debug!(partition = %self.partition, from = %key, to = %new_key, "bound prefetch dependency");
        Ok(new_key)
    }

    /// Expect a result for `key` from `partition`.
    pub fn add_partition(&mut self, key: DependencyKey, partition: PartitionId) -> Result<bool> {
        self.state_mut(key)?.add_partition(partition)
    }

    /// Block `fragment` until `key` has all its results.
    pub fn add_blocked(&mut self, key: DependencyKey, fragment: W) -> Result<()> {
        self.state_mut(key)?.add_blocked_work_fragment(fragment)
    }

    /// Mark the result of `key` as intermediate.
    pub fn mark_internal(&mut self, key: DependencyKey) -> Result<()> {
        self.state_mut(key)?.mark_internal();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Store a partial result. Returns true if `key` is now complete.
    pub fn add_result(
        &mut self,
        key: DependencyKey,
        partition: PartitionId,
        result: R,
    ) -> Result<bool> {
        let started = self.start_timer();
        let complete = self.state_mut(key).and_then(|state| state.add_result(partition, result));
        self.stop_timer(Measurement::Results, started);
        complete
    }

    /// Release every dependency that became complete and return the fragments
    /// that were blocked on them, in registration order.
    ///
    /// A dependency is released at most once, so calling this repeatedly never
    /// returns the same fragment twice for the same dependency.
    pub fn collect_ready(&mut self) -> Result<Vec<W>>
    where
        W: Clone,
    {
        let started = self.start_timer();
        let mut ready = Vec::new();
        for (key, &handle) in &self.index {
            let state = self.pool.get_mut(handle)?;
            if !state.has_tasks_ready() {
                continue;
            }
            if let Some(blocked) = state.get_and_release_blocked_work_fragments() {
                debug!(partition = %self.partition, %key, count = blocked.len(), "releasing blocked fragments");
                ready.extend(blocked.iter().cloned());
            }
        }
        self.stop_timer(Measurement::Poll, started);
        Ok(ready)
    }

    /// Single results of the client-visible dependencies of a round, ordered
    /// by statement index.
    pub fn client_results(&self, txn: TxnId, round: u32) -> Result<Vec<&R>> {
        let mut states = Vec::new();
        for &handle in self.index.values() {
            let state = self.pool.get(handle)?;
            if state.in_same_txn_round(txn, round) && !state.is_internal() {
                states.push(state);
            }
        }
        states.sort_by_key(|state| state.stmt_index());
        states.into_iter().map(|state| state.result()).collect()
    }

    /// Read access to a live dependency.
    pub fn state(&self, key: DependencyKey) -> Result<&DependencyState<W, R>> {
        let handle = self.handle(key)?;
        self.pool.get(handle)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Return the states of one round to the pool.
    pub fn finish_round(&mut self, txn: TxnId, round: u32) -> Result<usize> {
        let released = self.release_where(|key| key.txn == txn && key.round == round)?;
        debug!(partition = %self.partition, %txn, round, released, "finished round");
        Ok(released)
    }

    /// Return every state of a finished transaction to the pool.
    pub fn finish_txn(&mut self, txn: TxnId) -> Result<usize> {
        let released = self.release_where(|key| key.txn == txn)?;
        self.profiler.lock().record_transaction();
        debug!(partition = %self.partition, %txn, released, "finished transaction");
        Ok(released)
    }

    /// Reclaim every state of an aborted transaction, complete or not.
    pub fn abort_txn(&mut self, txn: TxnId) -> Result<usize> {
        let mut incomplete = 0;
        for (key, &handle) in &self.index {
            if key.txn == txn && !self.pool.get(handle)?.has_all_results() {
                incomplete += 1;
            }
        }
        if incomplete > 0 {
            warn!(partition = %self.partition, %txn, incomplete, "aborting transaction with incomplete dependencies");
        }
        self.finish_txn(txn)
    }

    fn release_where<F>(&mut self, mut pred: F) -> Result<usize>
    where
        F: FnMut(&DependencyKey) -> bool,
    {
        let mut handles = Vec::new();
        self.index.retain(|key, handle| {
            if pred(key) {
                handles.push(*handle);
                false
            } else {
                true
            }
        });
        for &handle in &handles {
            self.pool.release(handle)?;
        }
        Ok(handles.len())
    }

    fn handle(&self, key: DependencyKey) -> Result<PoolHandle> {
        self.index
            .get(&key)
            .copied()
            .ok_or(Error::UnknownDependency {
                txn: key.txn,
                round: key.round,
                dependency: key.dependency,
            })
    }

    fn state_mut(&mut self, key: DependencyKey) -> Result<&mut DependencyState<W, R>> {
        let handle = self.handle(key)?;
        self.pool.get_mut(handle)
    }

    fn start_timer(&self) -> Option<Instant> {
        self.profiling.then(Instant::now)
    }

    fn stop_timer(&self, which: Measurement, started: Option<Instant>) {
        if let Some(started) = started {
            self.profiler.lock().record(which, started.elapsed());
        }
    }
}
