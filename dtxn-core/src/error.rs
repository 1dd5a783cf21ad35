//! Error types for dependency tracking.
//!
//! Errors fall into three classes:
//!
//! - Protocol violations: the distributed plan or the dispatch layer handed
//!   us something inconsistent (a result from a partition nobody asked, a
//!   second result from the same partition, ...). These are never absorbed.
//! - Lifecycle misuse: operating on a pooled instance that is not bound to a
//!   transaction, binding one twice, or touching a slot through a stale handle.
//! - Configuration errors.

use thiserror::Error;

use crate::dependency::{DependencyId, PartitionId, TxnId};
use crate::pool::PoolHandle;

/// Errors raised by dependency tracking.
#[derive(Debug, Error)]
pub enum Error {
    /// A result arrived from a partition that was never registered.
    #[error("unexpected result from partition {partition} for dependency {dependency} of txn {txn:?}")]
    UnexpectedPartition {
        /// Transaction the dependency belongs to.
        txn: Option<TxnId>,
        /// Partition that sent the result.
        partition: PartitionId,
        /// Dependency the result was addressed to.
        dependency: DependencyId,
    },

    /// A partition reported a second result for the same dependency.
    #[error("partition {partition} already delivered a result for dependency {dependency} of txn {txn:?}")]
    DuplicateResult {
        /// Transaction the dependency belongs to.
        txn: Option<TxnId>,
        /// Partition that reported twice.
        partition: PartitionId,
        /// Dependency the result was addressed to.
        dependency: DependencyId,
    },

    /// The single-result accessor was used on a dependency that does not
    /// have exactly one expected partition with its result present.
    #[error("dependency {dependency} has {expected} expected partitions and {received} results; a single result is not available")]
    NoSingleResult {
        /// Dependency that was queried.
        dependency: DependencyId,
        /// Number of expected partitions.
        expected: usize,
        /// Number of results received so far.
        received: usize,
    },

    /// A partition was registered after the blocked fragments were released.
    #[error("cannot expect partition {partition} for dependency {dependency}: blocked fragments were already released")]
    PartitionAfterRelease {
        /// Dependency that was already released.
        dependency: DependencyId,
        /// Partition that was being registered.
        partition: PartitionId,
    },

    /// A prefetch rebinding was attempted after results started arriving.
    #[error("cannot rebind dependency {dependency}: {received} results already received")]
    PrefetchAfterResult {
        /// Dependency that was being rebound.
        dependency: DependencyId,
        /// Number of results already stored.
        received: usize,
    },

    /// A prefetch rebinding targeted a dependency that is not a prefetch.
    #[error("dependency {0} is not a prefetch dependency")]
    NotPrefetch(DependencyId),

    /// No dependency is registered under the given identity.
    #[error("no dependency {dependency} in round {round} of txn {txn}")]
    UnknownDependency {
        /// Transaction id.
        txn: TxnId,
        /// Round number.
        round: u32,
        /// Dependency id.
        dependency: DependencyId,
    },

    /// A dependency with the given identity is already registered.
    #[error("dependency {dependency} in round {round} of txn {txn} already exists")]
    DuplicateDependency {
        /// Transaction id.
        txn: TxnId,
        /// Round number.
        round: u32,
        /// Dependency id.
        dependency: DependencyId,
    },

    /// The instance is not bound to a transaction.
    #[error("dependency state is not initialized")]
    Uninitialized,

    /// `init` was called on an instance that was never finished.
    #[error("dependency state is already initialized for txn {0}")]
    AlreadyInitialized(TxnId),

    /// The pool slot behind this handle has been recycled.
    #[error("stale pool handle {0:?}")]
    StaleHandle(PoolHandle),

    /// The pool reached its configured slot limit.
    #[error("pool exhausted: all {capacity} slots are in use")]
    PoolExhausted {
        /// Configured maximum number of slots.
        capacity: usize,
    },

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error means the plan or dispatch layer is
    /// internally inconsistent.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedPartition { .. }
                | Self::DuplicateResult { .. }
                | Self::NoSingleResult { .. }
                | Self::PartitionAfterRelease { .. }
                | Self::PrefetchAfterResult { .. }
                | Self::NotPrefetch(_)
                | Self::UnknownDependency { .. }
                | Self::DuplicateDependency { .. }
        )
    }

    /// Returns true if this error is a misuse of the pooled lifecycle.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Uninitialized
                | Self::AlreadyInitialized(_)
                | Self::StaleHandle(_)
                | Self::PoolExhausted { .. }
        )
    }
}

/// Result type for dependency tracking operations.
pub type Result<T> = std::result::Result<T, Error>;
