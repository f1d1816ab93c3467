//! In-memory B+Tree keyed by any totally ordered type.
//!
//! ## Node Layout
//!
//! Nodes live in a slot arena and refer to each other by `NodeId` handles,
//! so a split or merge only rewrites handles. Each node is owned by exactly
//! one parent slot (or by the tree, for the root).
//!
//! ```text
//!                 [ 10 | 20 ]                 internal: n keys, n+1 children
//!                /     |     \
//!      [5, 6, 7] -> [10, 12, 17] -> [20, 30]  leaves, linked left to right
//! ```
//!
//! Routing: child[i] holds keys < key[i], child[i+1] holds keys >= key[i].
//!
//! ## Occupancy (order m)
//!
//! | node            | min                | max      |
//! |-----------------|--------------------|----------|
//! | leaf            | ceil(m/2) - 1      | m - 1    |
//! | internal        | ceil(m/2) children | m        |
//! | root (leaf)     | 0                  | m - 1    |
//! | root (internal) | 2 children         | m        |
//!
//! Leaf splits copy the first key of the new right leaf into the parent;
//! internal splits move the median key up. Deletes borrow from the right
//! sibling, then the left, and merge when neither can spare an entry.

// Submodules
mod arena;
mod scan;
mod tree;
mod types;

// Re-exports for public API
pub use scan::RangeScan;
pub use tree::BPlusTree;
