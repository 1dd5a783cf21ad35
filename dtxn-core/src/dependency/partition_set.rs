//! Partition Sets
//!
//! A dependency rarely spans more than a handful of partitions, so the set
//! keeps its members sorted inline and only spills to the heap past that.
//! `clear` keeps whatever capacity was reached, which keeps pooled states
//! allocation-stable across reuse.

use smallvec::SmallVec;

use super::ids::PartitionId;

/// Number of partitions stored inline before spilling to the heap.
const INLINE_PARTITIONS: usize = 8;

/// A sorted set of partition ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet {
    members: SmallVec<[PartitionId; INLINE_PARTITIONS]>,
}

impl PartitionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a partition. Returns false if it was already present.
    pub fn insert(&mut self, partition: PartitionId) -> bool {
        match self.members.binary_search(&partition) {
            Ok(_) => false,
            Err(pos) => {
                self.members.insert(pos, partition);
                true
            }
        }
    }

    /// Check membership.
    pub fn contains(&self, partition: PartitionId) -> bool {
        self.members.binary_search(&partition).is_ok()
    }

    /// Number of partitions in the set.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Remove all partitions, keeping capacity.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Iterate in ascending partition order.
    pub fn iter(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.members.iter().copied()
    }

    /// True if every member of `self` is also in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.iter().all(|p| other.contains(p))
    }

    /// The members as a sorted slice.
    pub fn as_slice(&self) -> &[PartitionId] {
        &self.members
    }
}

impl FromIterator<PartitionId> for PartitionSet {
    fn from_iter<I: IntoIterator<Item = PartitionId>>(iter: I) -> Self {
        let mut set = Self::new();
        for partition in iter {
            set.insert(partition);
        }
        set
    }
}
