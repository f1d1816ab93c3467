//! Configuration structures for TallyDB.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

/// Smallest order for which split and merge keep every node non-empty.
pub const MIN_TREE_ORDER: usize = 3;

/// Default B+ tree order.
pub const DEFAULT_TREE_ORDER: usize = 64;

/// Shape parameters for a single B+ tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of children of an internal node.
    /// Leaves hold at most `order - 1` entries.
    pub order: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_TREE_ORDER,
        }
    }
}

impl TreeConfig {
    /// Creates a config with the given order.
    pub fn with_order(order: usize) -> Self {
        Self { order }
    }

    /// Checks that the order can form a valid tree.
    pub fn validate(&self) -> Result<()> {
        if self.order < MIN_TREE_ORDER {
            return Err(TallyError::InvalidParameter {
                name: "order".to_string(),
                value: self.order.to_string(),
            });
        }
        Ok(())
    }

    /// Maximum entries in a leaf.
    pub fn max_leaf_entries(&self) -> usize {
        self.order.saturating_sub(1)
    }

    /// Minimum number of keys in a non-root node (leaf entries or internal separators).
    pub fn min_keys(&self) -> usize {
        self.order.div_ceil(2).saturating_sub(1)
    }
}

/// Configuration for the table registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Tree shape for each table's primary index.
    pub primary_index: TreeConfig,
    /// Tree shape for secondary indexes.
    pub secondary_index: TreeConfig,
}

impl RegistryConfig {
    /// Uses the same order for primary and secondary indexes.
    pub fn with_order(order: usize) -> Self {
        Self {
            primary_index: TreeConfig::with_order(order),
            secondary_index: TreeConfig::with_order(order),
        }
    }

    /// Validates every nested tree config.
    pub fn validate(&self) -> Result<()> {
        self.primary_index.validate()?;
        self.secondary_index.validate()
    }
}
