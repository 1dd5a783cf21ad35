//! Identifiers
//!
//! Newtypes for the ids that flow through dependency tracking. They are all
//! plain integers assigned by the outer engine; nothing here generates them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw transaction id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TxnId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Partition identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(u32);

impl PartitionId {
    /// Wrap a raw partition id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PartitionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Output dependency identifier of a plan fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyId(u32);

impl DependencyId {
    /// Wrap a raw dependency id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DependencyId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The full binding of an initialized dependency state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyIdentity {
    /// Owning transaction.
    pub txn: TxnId,
    /// Round within the transaction.
    pub round: u32,
    /// Index of the statement that produced the fragment.
    pub stmt_index: u32,
    /// Output dependency id.
    pub dependency: DependencyId,
}

impl DependencyIdentity {
    /// The lookup key an execution context indexes this dependency under.
    pub fn key(&self) -> DependencyKey {
        DependencyKey {
            txn: self.txn,
            round: self.round,
            dependency: self.dependency,
        }
    }
}

/// Lookup key for a dependency inside an execution context.
///
/// Results are addressed by (transaction, round, dependency); the statement
/// index is carried on the state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyKey {
    /// Owning transaction.
    pub txn: TxnId,
    /// Round within the transaction.
    pub round: u32,
    /// Output dependency id.
    pub dependency: DependencyId,
}

impl DependencyKey {
    /// Build a key from its parts.
    pub fn new(txn: TxnId, round: u32, dependency: DependencyId) -> Self {
        Self {
            txn,
            round,
            dependency,
        }
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn {} round {} dep {}", self.txn, self.round, self.dependency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_drops_statement() {
        let identity = DependencyIdentity {
            txn: TxnId::new(9),
            round: 2,
            stmt_index: 4,
            dependency: DependencyId::new(1001),
        };
        let key = identity.key();
        assert_eq!(key, DependencyKey::new(TxnId::new(9), 2, DependencyId::new(1001)));
        assert_eq!(key.to_string(), "txn #9 round 2 dep #1001");
    }

    #[test]
    fn partition_display_is_padded() {
        assert_eq!(PartitionId::new(3).to_string(), "03");
        assert_eq!(PartitionId::from(12).raw(), 12);
    }
}
