//! Configuration
//!
//! Settings for a partition's dependency tracker. Every field has a default,
//! so an empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sizing of the dependency state pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Slots created up front.
    pub preallocate: usize,

    /// Upper bound on slots. `None` lets the pool grow without limit.
    pub max_slots: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            preallocate: 64,
            max_slots: None,
        }
    }
}

/// Configuration of a [`DependencyTracker`](crate::tracker::DependencyTracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Pool sizing.
    pub pool: PoolConfig,

    /// Record timing measurements in the partition profiler.
    pub profiling: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            profiling: true,
        }
    }
}

impl TrackerConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
