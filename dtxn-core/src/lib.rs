//! dtxn Core
//!
//! This crate provides the cross-partition dependency resolution used by a
//! partitioned, main-memory transaction engine. Transactions are split into
//! plan fragments that run on several partitions; each fragment's output is
//! a partial result per partition. This crate:
//!
//! - Aggregates partial results that arrive out of order
//! - Detects completion of a dependency exactly once
//! - Releases the fragments blocked on a dependency exactly once
//! - Recycles dependency states through a pool
//! - Keeps per-partition counters for a stats exporter
//!
//! Network delivery, plan compilation, query execution and the partition
//! run loop live outside this crate.
//!
//! # Architecture
//!
//! - `dependency`: identifiers and the per-dependency state machine
//! - `pool`: the pooled-object contract and a slab pool
//! - `tracker`: the per-partition execution-context interface
//! - `profiler`: cumulative counters and the stats source
//! - `config`, `error`, `observability`: ambient plumbing
//!
//! # Example
//!
//! ```rust
//! use dtxn_core::config::TrackerConfig;
//! use dtxn_core::dependency::{DependencyId, PartitionId, TxnId};
//! use dtxn_core::tracker::DependencyTracker;
//!
//! let mut tracker: DependencyTracker<u64, Vec<i64>> =
//!     DependencyTracker::new(PartitionId::new(0), &TrackerConfig::default());
//!
//! let key = tracker.get_or_create(TxnId::new(1), 0, 0, DependencyId::new(10))?;
//! tracker.add_partition(key, PartitionId::new(0))?;
//! tracker.add_partition(key, PartitionId::new(1))?;
//! tracker.add_blocked(key, 42)?;
//!
//! tracker.add_result(key, PartitionId::new(1), vec![7])?;
//! assert!(tracker.collect_ready()?.is_empty());
//!
//! tracker.add_result(key, PartitionId::new(0), vec![8])?;
//! assert_eq!(tracker.collect_ready()?, vec![42]);
//!
//! tracker.finish_txn(TxnId::new(1))?;
//! # Ok::<(), dtxn_core::Error>(())
//! ```

pub mod config;
pub mod dependency;
pub mod error;
pub mod observability;
pub mod pool;
pub mod profiler;
pub mod tracker;

pub use error::{Error, Result};
