//! Dependency Resolution
//!
//! This module implements the per-dependency result aggregator that the
//! partition execution contexts drive.
//!
//! # Overview
//!
//! A transaction is split into plan fragments that run on several
//! partitions. Each fragment produces an output dependency; its consumers
//! (another fragment, or the transaction's control code) must wait until
//! every partition that runs the fragment has reported.
//!
//! - Partitions are registered up front; results arrive in any order.
//! - Completion is detected exactly once per dependency.
//! - Fragments blocked on a dependency are released exactly once.
//!
//! # Design Decisions
//!
//! 1. States are pooled and recycled rather than allocated per transaction.
//!    `init` and `finish` are the acquire/release boundary.
//!
//! 2. There is no internal locking. Each partition owns its states and the
//!    engine already serializes access per partition.
//!
//! 3. Readiness is derived from counts on every query, while release is a
//!    one-shot flag, so polling is cheap and never double-dispatches.

mod ids;
mod partition_set;
mod state;

pub use ids::{DependencyId, DependencyIdentity, DependencyKey, PartitionId, TxnId};
pub use partition_set::PartitionSet;
pub use state::{DependencyState, DependencyStatus, ResultTable};
