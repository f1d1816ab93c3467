//! Lazy range iteration over the B+Tree leaf chain.

use std::iter::FusedIterator;
use std::ops::Bound;

use super::arena::{NodeArena, NodeId};

/// Iterator over a contiguous key range, created by
/// [`BPlusTree::range_scan`](super::BPlusTree::range_scan) and friends.
///
/// Starts at the first qualifying entry of the leaf found by descent, then
/// follows `next` links until the end bound is passed. Once exhausted it
/// stays exhausted; call the tree again for a fresh scan.
pub struct RangeScan<'a, K, V> {
    arena: &'a NodeArena<K, V>,
    /// Current leaf, or None once the scan is finished.
    leaf: Option<NodeId>,
    /// Next entry position within the current leaf.
    pos: usize,
    /// Upper bound of the scan.
    end: Bound<K>,
}

impl<'a, K: Ord, V> RangeScan<'a, K, V> {
    pub(crate) fn new(arena: &'a NodeArena<K, V>, leaf: NodeId, pos: usize, end: Bound<K>) -> Self {
        Self {
            arena,
            leaf: Some(leaf),
            pos,
            end,
        }
    }

    #[inline]
    fn before_end(&self, key: &K) -> bool {
        match &self.end {
            Bound::Included(high) => key <= high,
            Bound::Excluded(high) => key < high,
            Bound::Unbounded => true,
        }
    }
}

impl<'a, K: Ord, V> Iterator for RangeScan<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let arena = self.arena;
        loop {
            let leaf = arena.get(self.leaf?).as_leaf();
            if self.pos < leaf.keys.len() {
                let key = &leaf.keys[self.pos];
                if !self.before_end(key) {
                    self.leaf = None;
                    return None;
                }
                let value = &leaf.values[self.pos];
                self.pos += 1;
                return Some((key, value));
            }
            self.leaf = leaf.next;
            self.pos = 0;
        }
    }
}

impl<K: Ord, V> FusedIterator for RangeScan<'_, K, V> {}
