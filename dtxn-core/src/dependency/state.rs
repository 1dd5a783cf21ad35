//! Dependency State
//!
//! A `DependencyState` collects the partial results that a set of partitions
//! produce for one output dependency of one transaction round, and holds the
//! work fragments that cannot run until all of those results are in.
//!
//! # Readiness
//!
//! The status is derived from the fields rather than stored:
//!
//! - `Waiting`: results outstanding, nothing blocked on them
//! - `Blocked`: results outstanding, at least one fragment blocked
//! - `Ready`: every expected partition reported, blocked fragments not yet released
//! - `Released`: the blocked fragments were handed back (terminal)
//!
//! Completeness is a pure count comparison, so the owning loop can poll it on
//! every tick. Release is a one-shot flag, so a blocked set is handed back at
//! most once no matter how often it is polled.
//!
//! # Ownership
//!
//! States live in an [`ObjectPool`](crate::pool::ObjectPool) and are owned by
//! the execution context of a single partition. There is no internal locking.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, trace};

use super::ids::{DependencyId, DependencyIdentity, PartitionId, TxnId};
use super::partition_set::PartitionSet;
use crate::error::{Error, Result};
use crate::pool::Poolable;

/// A partial result produced by one partition.
///
/// The tracker never looks inside a result; the row count is only reported
/// in log events.
pub trait ResultTable {
    /// Number of rows in the table.
    fn row_count(&self) -> usize;
}

impl<T> ResultTable for Vec<T> {
    fn row_count(&self) -> usize {
        self.len()
    }
}

impl<T: ResultTable + ?Sized> ResultTable for Arc<T> {
    fn row_count(&self) -> usize {
        (**self).row_count()
    }
}

/// Derived readiness of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Results outstanding, nothing blocked.
    Waiting,

    /// Results outstanding, fragments blocked.
    Blocked,

    /// All results in, blocked fragments not yet released.
    Ready,

    /// Blocked fragments have been released.
    Released,
}

impl DependencyStatus {
    /// Upper-case name used in debug output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Blocked => "BLOCKED",
            Self::Ready => "READY",
            Self::Released => "RELEASED",
        }
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result aggregator for one output dependency.
///
/// # Type Parameters
///
/// - `W`: handle of a blocked work fragment. Stored and returned as-is.
/// - `R`: partial result table delivered by a partition.
#[derive(Debug)]
pub struct DependencyState<W, R> {
    /// Binding to a transaction round. `None` while pooled.
    identity: Option<DependencyIdentity>,

    /// Partitions we expect a result from.
    expected: PartitionSet,

    /// Partitions that already delivered a result.
    result_partitions: PartitionSet,

    /// Results in arrival order.
    results: Vec<R>,

    /// Fragments waiting for every result to arrive.
    blocked: IndexSet<W>,

    /// Set once the blocked fragments have been handed back.
    released: bool,

    /// The result feeds another fragment instead of the client response.
    internal: bool,

    /// Created for a prefetched query before its real binding was known.
    prefetch: bool,
}

impl<W, R> DependencyState<W, R> {
    /// Create an uninitialized state.
    pub fn new() -> Self {
        Self {
            identity: None,
            expected: PartitionSet::new(),
            result_partitions: PartitionSet::new(),
            results: Vec::new(),
            blocked: IndexSet::new(),
            released: false,
            internal: false,
            prefetch: false,
        }
    }
}

impl<W, R> Default for DependencyState<W, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, R> DependencyState<W, R>
where
    W: Eq + Hash,
    R: ResultTable,
{
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Bind this state to a transaction round.
    pub fn init(
        &mut self,
        txn: TxnId,
        round: u32,
        stmt_index: u32,
        dependency: DependencyId,
    ) -> Result<()> {
        if let Some(current) = self.identity {
            return Err(Error::AlreadyInitialized(current.txn));
        }
        debug!(%txn, round, stmt_index, %dependency, "initializing dependency");
        self.identity = Some(DependencyIdentity {
            txn,
            round,
            stmt_index,
            dependency,
        });
        Ok(())
    }

    /// Rebind the round and dependency id of a prefetched dependency.
    ///
    /// Prefetched fragments are dispatched before the plan that will consume
    /// them is bound, so their state starts out under a placeholder id.
    pub fn prefetch_override(&mut self, round: u32, dependency: DependencyId) -> Result<()> {
        let received = self.result_partitions.len();
        let identity = self.identity.as_mut().ok_or(Error::Uninitialized)?;
        if received > 0 {
            return Err(Error::PrefetchAfterResult {
                dependency: identity.dependency,
                received,
            });
        }
        debug!(
            txn = %identity.txn,
            from_round = identity.round,
            to_round = round,
            from = %identity.dependency,
            to = %dependency,
            "overriding prefetch binding"
        );
        identity.round = round;
        identity.dependency = dependency;
        Ok(())
    }

    fn bound(&self) -> Result<DependencyIdentity> {
        self.identity.ok_or(Error::Uninitialized)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Full binding, if initialized.
    pub fn identity(&self) -> Option<DependencyIdentity> {
        self.identity
    }

    /// Owning transaction.
    pub fn txn_id(&self) -> Option<TxnId> {
        self.identity.map(|id| id.txn)
    }

    /// Round number.
    pub fn round(&self) -> Option<u32> {
        self.identity.map(|id| id.round)
    }

    /// Statement index.
    pub fn stmt_index(&self) -> Option<u32> {
        self.identity.map(|id| id.stmt_index)
    }

    /// Output dependency id.
    pub fn dependency_id(&self) -> Option<DependencyId> {
        self.identity.map(|id| id.dependency)
    }

    /// Whether this state belongs to the given transaction round.
    pub fn in_same_txn_round(&self, txn: TxnId, round: u32) -> bool {
        self.identity
            .is_some_and(|id| id.txn == txn && id.round == round)
    }

    /// Mark the result as intermediate.
    pub fn mark_internal(&mut self) {
        if let Some(id) = self.identity {
            debug!(txn = %id.txn, dependency = %id.dependency, "marking dependency as internal");
        }
        self.internal = true;
    }

    /// Whether the result only feeds other fragments.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn mark_prefetch(&mut self) {
        self.prefetch = true;
    }

    pub fn reset_prefetch(&mut self) {
        self.prefetch = false;
    }

    pub fn is_prefetch(&self) -> bool {
        self.prefetch
    }

    // ------------------------------------------------------------------
    // Partitions and results
    // ------------------------------------------------------------------

    /// Expect a result from `partition`.
    ///
    /// Registering the same partition twice is harmless; the return value is
    /// false for the repeated call. Once the blocked fragments are released
    /// the expected set is frozen. A complete but unreleased dependency may
    /// still grow, which makes it incomplete again.
    pub fn add_partition(&mut self, partition: PartitionId) -> Result<bool> {
        let identity = self.bound()?;
        if self.released {
            return Err(Error::PartitionAfterRelease {
                dependency: identity.dependency,
                partition,
            });
        }
        let added = self.expected.insert(partition);
        if !added {
            trace!(txn = %identity.txn, dependency = %identity.dependency, %partition, "partition already expected");
        }
        Ok(added)
    }

    /// Partitions we expect results from.
    pub fn partitions(&self) -> &PartitionSet {
        &self.expected
    }

    /// Number of expected partitions.
    pub fn partition_count(&self) -> usize {
        self.expected.len()
    }

    /// Partitions that have reported.
    pub fn result_partitions(&self) -> &PartitionSet {
        &self.result_partitions
    }

    /// Store the result `partition` produced for this dependency.
    ///
    /// Returns true if this was the last outstanding result. On error the
    /// state is left untouched.
    pub fn add_result(&mut self, partition: PartitionId, result: R) -> Result<bool> {
        let identity = self.bound()?;
        if self.result_partitions.contains(partition) {
            return Err(Error::DuplicateResult {
                txn: Some(identity.txn),
                partition,
                dependency: identity.dependency,
            });
        }
        if !self.expected.contains(partition) {
            return Err(Error::UnexpectedPartition {
                txn: Some(identity.txn),
                partition,
                dependency: identity.dependency,
            });
        }

        debug!(
            txn = %identity.txn,
            dependency = %identity.dependency,
            %partition,
            rows = result.row_count(),
            "storing result"
        );
        self.results.push(result);
        self.result_partitions.insert(partition);

        let complete = self.has_all_results();
        if complete {
            debug!(
                txn = %identity.txn,
                dependency = %identity.dependency,
                partitions = self.expected.len(),
                "all results received"
            );
        }
        Ok(complete)
    }

    /// Whether every expected partition has reported.
    pub fn has_all_results(&self) -> bool {
        self.expected.len() == self.result_partitions.len()
    }

    /// Number of results received so far.
    pub fn results_count(&self) -> usize {
        self.result_partitions.len()
    }

    /// All results in arrival order.
    pub fn results(&self) -> &[R] {
        &self.results
    }

    /// The only result of a single-partition dependency.
    ///
    /// Used for the final table of a query that ran on one partition.
    pub fn result(&self) -> Result<&R> {
        let identity = self.bound()?;
        match (self.expected.len(), self.results.as_slice()) {
            (1, [only]) => Ok(only),
            (expected, results) => Err(Error::NoSingleResult {
                dependency: identity.dependency,
                expected,
                received: results.len(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Blocked fragments
    // ------------------------------------------------------------------

    /// Register a fragment that must wait for every result.
    pub fn add_blocked_work_fragment(&mut self, fragment: W) -> Result<()> {
        let identity = self.bound()?;
        trace!(txn = %identity.txn, dependency = %identity.dependency, "adding blocked fragment");
        self.blocked.insert(fragment);
        Ok(())
    }

    /// Fragments registered so far, in registration order.
    pub fn blocked_work_fragments(&self) -> &IndexSet<W> {
        &self.blocked
    }

    /// Hand back the blocked fragments and mark them released.
    ///
    /// Only the first call on a complete dependency returns the set. Calls
    /// before completion return `None` without consuming the release, and
    /// every call after the release returns `None`.
    pub fn get_and_release_blocked_work_fragments(&mut self) -> Option<&IndexSet<W>> {
        let identity = self.identity?;
        if self.released {
            trace!(txn = %identity.txn, dependency = %identity.dependency, "ignoring duplicate release request");
            return None;
        }
        if !self.has_all_results() {
            trace!(
                txn = %identity.txn,
                dependency = %identity.dependency,
                outstanding = self.expected.len() - self.result_partitions.len(),
                "ignoring release request for incomplete dependency"
            );
            return None;
        }
        self.released = true;
        trace!(
            txn = %identity.txn,
            dependency = %identity.dependency,
            count = self.blocked.len(),
            "unblocking fragments"
        );
        Some(&self.blocked)
    }

    /// Whether blocked fragments are ready to be released.
    pub fn has_tasks_ready(&self) -> bool {
        debug_assert!(
            self.result_partitions.len() <= self.expected.len(),
            "{} results for {} partitions",
            self.result_partitions.len(),
            self.expected.len()
        );
        !self.blocked.is_empty() && !self.released && self.has_all_results()
    }

    pub fn has_tasks_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    pub fn has_tasks_released(&self) -> bool {
        self.released
    }

    /// Derived readiness, or `None` while uninitialized.
    pub fn status(&self) -> Option<DependencyStatus> {
        self.identity?;
        let status = if self.has_all_results() {
            if self.released {
                DependencyStatus::Released
            } else {
                DependencyStatus::Ready
            }
        } else if self.blocked.is_empty() {
            DependencyStatus::Waiting
        } else {
            DependencyStatus::Blocked
        };
        Some(status)
    }
}

impl<W, R> Poolable for DependencyState<W, R> {
    fn create() -> Self {
        Self::new()
    }

    fn is_initialized(&self) -> bool {
        self.identity.is_some()
    }

    fn finish(&mut self) {
        self.identity = None;
        self.expected.clear();
        self.result_partitions.clear();
        self.results.clear();
        self.blocked.clear();
        self.released = false;
        self.internal = false;
        self.prefetch = false;
    }
}

impl<W, R> fmt::Display for DependencyState<W, R>
where
    W: Eq + Hash + fmt::Debug,
    R: ResultTable,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(identity), Some(status)) = (self.identity, self.status()) else {
            return f.write_str("<UNINITIALIZED>");
        };

        writeln!(
            f,
            "DependencyState[{}] txn {} round {} stmt {}",
            identity.dependency, identity.txn, identity.round, identity.stmt_index
        )?;
        writeln!(f, "  - Internal: {}", self.internal)?;
        writeln!(f, "  - Prefetch: {}", self.prefetch)?;
        writeln!(f, "  - Partitions: {:?}", self.expected.as_slice())?;
        writeln!(f, "  - Results:")?;
        for (i, result) in self.results.iter().enumerate() {
            writeln!(f, "      Result {:02}: {{{} tuples}}", i, result.row_count())?;
        }
        writeln!(f, "  - Blocked: {:?}", self.blocked)?;
        write!(f, "  - Status: {}", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type State = DependencyState<u32, Vec<u64>>;

    fn p(id: u32) -> PartitionId {
        PartitionId::new(id)
    }

    fn initialized(partitions: &[u32]) -> State {
        let mut state = State::create();
        state.init(TxnId::new(100), 0, 1, DependencyId::new(7)).unwrap();
        for &id in partitions {
            state.add_partition(p(id)).unwrap();
        }
        state
    }

    #[test]
    fn starts_uninitialized() {
        let state = State::create();
        assert!(!state.is_initialized());
        assert_eq!(state.txn_id(), None);
        assert_eq!(state.status(), None);
        assert_eq!(state.to_string(), "<UNINITIALIZED>");
    }

    #[test]
    fn init_twice_fails() {
        let mut state = initialized(&[]);
        let err = state
            .init(TxnId::new(101), 0, 0, DependencyId::new(1))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized(txn) if txn == TxnId::new(100)));
        assert_eq!(state.txn_id(), Some(TxnId::new(100)));
    }

    #[test]
    fn operations_on_uninitialized_fail() {
        let mut state = State::create();
        assert!(matches!(state.add_partition(p(0)), Err(Error::Uninitialized)));
        assert!(matches!(state.add_result(p(0), vec![]), Err(Error::Uninitialized)));
        assert!(matches!(state.add_blocked_work_fragment(1), Err(Error::Uninitialized)));
        assert!(matches!(state.result(), Err(Error::Uninitialized)));
        assert!(state.get_and_release_blocked_work_fragments().is_none());
        assert!(!state.has_tasks_released());
    }

    #[test]
    fn scenario_three_partitions_out_of_order() {
        let mut state = initialized(&[0, 1, 2]);
        state.add_blocked_work_fragment(10).unwrap();
        state.add_blocked_work_fragment(11).unwrap();

        assert!(!state.add_result(p(1), vec![1]).unwrap());
        assert!(!state.has_all_results());
        assert!(!state.add_result(p(0), vec![0]).unwrap());
        assert!(!state.has_all_results());
        assert!(state.add_result(p(2), vec![2, 2]).unwrap());
        assert!(state.has_all_results());

        let released: Vec<u32> = state
            .get_and_release_blocked_work_fragments()
            .unwrap()
            .iter()
            .copied()
            .collect();
        assert_eq!(released, vec![10, 11]);
        assert!(state.get_and_release_blocked_work_fragments().is_none());

        // Results keep arrival order
        assert_eq!(state.results(), &[vec![1], vec![0], vec![2, 2]]);
    }

    #[test]
    fn scenario_single_partition() {
        let mut state = initialized(&[5]);
        assert!(state.add_result(p(5), vec![42]).unwrap());
        assert_eq!(state.result().unwrap(), &vec![42]);

        let err = state.add_result(p(5), vec![43]).unwrap_err();
        assert!(matches!(err, Error::DuplicateResult { partition, .. } if partition == p(5)));
        assert_eq!(state.results_count(), 1);
        assert_eq!(state.result().unwrap(), &vec![42]);
    }

    #[test]
    fn unexpected_partition_fails_without_side_effects() {
        let mut state = initialized(&[0, 1]);
        let err = state.add_result(p(9), vec![1]).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(matches!(err, Error::UnexpectedPartition { partition, .. } if partition == p(9)));
        assert_eq!(state.results_count(), 0);
        assert!(state.results().is_empty());
    }

    #[test]
    fn single_result_requires_one_reported_partition() {
        let mut state = initialized(&[3]);
        assert!(matches!(
            state.result(),
            Err(Error::NoSingleResult { expected: 1, received: 0, .. })
        ));

        let mut multi = initialized(&[0, 1]);
        multi.add_result(p(0), vec![]).unwrap();
        multi.add_result(p(1), vec![]).unwrap();
        assert!(matches!(
            multi.result(),
            Err(Error::NoSingleResult { expected: 2, received: 2, .. })
        ));

        state.add_result(p(3), vec![7, 8]).unwrap();
        assert!(state.result().is_ok());
    }

    #[test]
    fn duplicate_partition_registration_collapses() {
        let mut state = initialized(&[]);
        assert!(state.add_partition(p(4)).unwrap());
        assert!(!state.add_partition(p(4)).unwrap());
        assert_eq!(state.partition_count(), 1);

        assert!(state.add_result(p(4), vec![]).unwrap());
    }

    #[test]
    fn release_is_one_shot_even_with_late_fragments() {
        let mut state = initialized(&[0]);
        state.add_blocked_work_fragment(1).unwrap();
        state.add_result(p(0), vec![]).unwrap();

        assert_eq!(state.get_and_release_blocked_work_fragments().map(|b| b.len()), Some(1));

        state.add_blocked_work_fragment(2).unwrap();
        assert!(state.has_tasks_blocked());
        assert!(!state.has_tasks_ready());
        assert!(state.get_and_release_blocked_work_fragments().is_none());
        assert!(state.get_and_release_blocked_work_fragments().is_none());
    }

    #[test]
    fn partitions_frozen_after_release() {
        let mut state = initialized(&[0]);
        state.add_blocked_work_fragment(1).unwrap();
        state.add_result(p(0), vec![]).unwrap();
        assert!(state.get_and_release_blocked_work_fragments().is_some());

        let err = state.add_partition(p(1)).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(matches!(
            err,
            Error::PartitionAfterRelease { partition, dependency } if partition == p(1) && dependency == DependencyId::new(7)
        ));
        assert!(state.add_partition(p(0)).is_err());

        assert_eq!(state.partition_count(), 1);
        assert!(state.has_all_results());
        assert_eq!(state.status(), Some(DependencyStatus::Released));
    }

    #[test]
    fn partition_added_before_release_reopens_dependency() {
        let mut state = initialized(&[0]);
        state.add_blocked_work_fragment(1).unwrap();
        state.add_result(p(0), vec![]).unwrap();
        assert_eq!(state.status(), Some(DependencyStatus::Ready));

        assert!(state.add_partition(p(1)).unwrap());
        assert_eq!(state.status(), Some(DependencyStatus::Blocked));
        assert!(state.get_and_release_blocked_work_fragments().is_none());

        assert!(state.add_result(p(1), vec![]).unwrap());
        assert!(state.get_and_release_blocked_work_fragments().is_some());
    }

    #[test]
    fn release_before_completion_is_not_consumed() {
        let mut state = initialized(&[0, 1]);
        state.add_blocked_work_fragment(1).unwrap();

        assert!(state.get_and_release_blocked_work_fragments().is_none());
        assert!(!state.has_tasks_released());

        state.add_result(p(0), vec![]).unwrap();
        state.add_result(p(1), vec![]).unwrap();
        assert!(state.has_tasks_ready());
        assert!(state.get_and_release_blocked_work_fragments().is_some());
        assert!(state.has_tasks_released());
    }

    #[test]
    fn tasks_ready_truth_table() {
        for blocked in [false, true] {
            for released in [false, true] {
                for complete in [false, true] {
                    let mut state = initialized(&[0]);
                    if blocked {
                        state.add_blocked_work_fragment(1).unwrap();
                    }
                    if complete {
                        state.add_result(p(0), vec![]).unwrap();
                    }
                    // Force the flag so unreachable combinations are covered too
                    state.released = released;

                    let expected = blocked && !released && complete;
                    assert_eq!(
                        state.has_tasks_ready(),
                        expected,
                        "blocked={blocked} released={released} complete={complete}"
                    );
                }
            }
        }
    }

    #[test]
    fn status_transitions() {
        let mut state = initialized(&[0, 1]);
        assert_eq!(state.status(), Some(DependencyStatus::Waiting));

        state.add_blocked_work_fragment(1).unwrap();
        assert_eq!(state.status(), Some(DependencyStatus::Blocked));

        state.add_result(p(0), vec![]).unwrap();
        assert_eq!(state.status(), Some(DependencyStatus::Blocked));

        state.add_result(p(1), vec![]).unwrap();
        assert_eq!(state.status(), Some(DependencyStatus::Ready));

        state.get_and_release_blocked_work_fragments();
        assert_eq!(state.status(), Some(DependencyStatus::Released));
    }

    #[test]
    fn prefetch_override_before_results() {
        let mut state = initialized(&[0]);
        state.mark_prefetch();
        state.prefetch_override(3, DependencyId::new(99)).unwrap();

        assert_eq!(state.round(), Some(3));
        assert_eq!(state.dependency_id(), Some(DependencyId::new(99)));
        assert_eq!(state.stmt_index(), Some(1));
        assert!(state.in_same_txn_round(TxnId::new(100), 3));
        assert!(!state.in_same_txn_round(TxnId::new(100), 0));
    }

    #[test]
    fn prefetch_override_after_result_fails() {
        let mut state = initialized(&[0, 1]);
        state.add_result(p(0), vec![]).unwrap();

        let err = state.prefetch_override(1, DependencyId::new(8)).unwrap_err();
        assert!(matches!(err, Error::PrefetchAfterResult { received: 1, .. }));
        assert_eq!(state.dependency_id(), Some(DependencyId::new(7)));
        assert_eq!(state.round(), Some(0));
    }

    #[test]
    fn finish_then_init_behaves_like_new() {
        let mut state = initialized(&[0, 1]);
        state.mark_internal();
        state.mark_prefetch();
        state.add_blocked_work_fragment(1).unwrap();
        state.add_result(p(0), vec![1]).unwrap();
        state.add_result(p(1), vec![2]).unwrap();
        state.get_and_release_blocked_work_fragments();

        state.finish();
        assert!(!state.is_initialized());
        assert_eq!(state.partition_count(), 0);
        assert_eq!(state.results_count(), 0);
        assert!(!state.has_tasks_blocked());
        assert!(!state.has_tasks_released());
        assert!(!state.is_internal());
        assert!(!state.is_prefetch());

        state.init(TxnId::new(200), 1, 0, DependencyId::new(7)).unwrap();
        assert!(state.is_initialized());
        state.add_partition(p(1)).unwrap();
        state.add_blocked_work_fragment(3).unwrap();
        assert_eq!(state.status(), Some(DependencyStatus::Blocked));
        assert!(state.add_result(p(1), vec![]).unwrap());
        assert!(state.has_tasks_ready());
    }

    #[test]
    fn display_reports_status() {
        let mut state = initialized(&[0]);
        state.add_result(p(0), vec![1, 2, 3]).unwrap();
        let rendered = state.to_string();
        assert!(rendered.contains("DependencyState[#7]"));
        assert!(rendered.contains("{3 tuples}"));
        assert!(rendered.contains("Status: READY"));
    }
}
