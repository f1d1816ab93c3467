//! Arena-backed B+Tree with configurable order.

use std::ops::{Bound, RangeBounds};

use tally_common::{Result, TallyError, TreeConfig, DEFAULT_TREE_ORDER, MIN_TREE_ORDER};
use tracing::{debug, trace};

use super::arena::{NodeArena, NodeId};
use super::scan::RangeScan;
use super::types::{child_index, InternalNode, LeafNode, Node};

/// Path from the root to the current node: (internal node, child slot taken).
type DescentPath = Vec<(NodeId, usize)>;

/// Ordered map backed by a B+Tree.
///
/// Keys are unique. Values live only in leaves; leaves are linked left to
/// right so range scans never re-descend the tree. Writes take `&mut self`,
/// which gives the single-writer model without any internal locking.
#[derive(Debug)]
pub struct BPlusTree<K, V> {
    /// Node storage.
    arena: NodeArena<K, V>,
    /// Root node (a leaf while the tree fits in one node).
    root: NodeId,
    /// Shape parameters (order and the occupancy limits derived from it).
    config: TreeConfig,
    /// Number of key-value pairs.
    len: usize,
    /// Tree height (1 = just root as leaf).
    height: usize,
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Creates an empty tree.
    ///
    /// # Panics
    ///
    /// Panics if `order < 3`. Use [`BPlusTree::with_config`] for orders that
    /// come from configuration.
    pub fn new(order: usize) -> Self {
        assert!(
            order >= MIN_TREE_ORDER,
            "B+Tree order must be at least {}, got {}",
            MIN_TREE_ORDER,
            order
        );
        let mut arena = NodeArena::new();
        let root = arena.allocate(Node::Leaf(LeafNode::empty()));
        Self {
            arena,
            root,
            config: TreeConfig::with_order(order),
            len: 0,
            height: 1,
        }
    }

    /// Creates an empty tree from a validated config.
    pub fn with_config(config: &TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.order))
    }

    /// Returns the order (maximum children per internal node).
    #[inline]
    pub fn order(&self) -> usize {
        self.config.order
    }

    /// Returns the number of key-value pairs. O(1).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the tree height.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of live nodes.
    pub fn node_count(&self) -> usize {
        self.arena.live_count()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = self.arena.allocate(Node::Leaf(LeafNode::empty()));
        self.len = 0;
        self.height = 1;
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Finds the leaf whose key range covers `key`.
    fn find_leaf(&self, key: &K) -> NodeId {
        let mut current = self.root;
        loop {
            match self.arena.get(current) {
                Node::Internal(node) => current = node.children[child_index(&node.keys, key)],
                Node::Leaf(_) => return current,
            }
        }
    }

    /// Like `find_leaf`, but records the path for write-side rebalancing.
    fn descend(&self, key: &K) -> (NodeId, DescentPath) {
        let mut path = Vec::with_capacity(self.height);
        let mut current = self.root;
        loop {
            match self.arena.get(current) {
                Node::Internal(node) => {
                    let idx = child_index(&node.keys, key);
                    path.push((current, idx));
                    current = node.children[idx];
                }
                Node::Leaf(_) => return (current, path),
            }
        }
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut current = self.root;
        while let Node::Internal(node) = self.arena.get(current) {
            current = node.children[0];
        }
        current
    }

    fn rightmost_leaf(&self) -> NodeId {
        let mut current = self.root;
        while let Node::Internal(node) = self.arena.get(current) {
            current = node.children[node.children.len() - 1];
        }
        current
    }

    /// Point lookup. A missing key is not an error.
    pub fn search(&self, key: &K) -> Option<&V> {
        let leaf = self.arena.get(self.find_leaf(key)).as_leaf();
        leaf.keys.binary_search(key).ok().map(|pos| &leaf.values[pos])
    }

    /// Mutable point lookup. The key itself cannot be changed.
    pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
        let leaf_id = self.find_leaf(key);
        let leaf = self.arena.get_mut(leaf_id).as_leaf_mut();
        match leaf.keys.binary_search(key) {
            Ok(pos) => Some(&mut leaf.values[pos]),
            Err(_) => None,
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Returns the smallest entry.
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let leaf = self.arena.get(self.leftmost_leaf()).as_leaf();
        leaf.keys.first().zip(leaf.values.first())
    }

    /// Returns the largest entry.
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let leaf = self.arena.get(self.rightmost_leaf()).as_leaf();
        leaf.keys.last().zip(leaf.values.last())
    }

    /// Lazily yields entries with `low <= key <= high` in ascending order.
    ///
    /// An inverted range yields nothing.
    pub fn range_scan(&self, low: &K, high: &K) -> RangeScan<'_, K, V> {
        self.range((Bound::Included(low.clone()), Bound::Included(high.clone())))
    }

    /// Lazily yields entries whose keys fall in `range`, in ascending order.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> RangeScan<'_, K, V> {
        let end = range.end_bound().cloned();
        let (leaf, pos) = match range.start_bound() {
            Bound::Unbounded => (self.leftmost_leaf(), 0),
            Bound::Included(low) => {
                let leaf_id = self.find_leaf(low);
                let keys = &self.arena.get(leaf_id).as_leaf().keys;
                (leaf_id, keys.partition_point(|k| k < low))
            }
            Bound::Excluded(low) => {
                let leaf_id = self.find_leaf(low);
                let keys = &self.arena.get(leaf_id).as_leaf().keys;
                (leaf_id, keys.partition_point(|k| k <= low))
            }
        };
        RangeScan::new(&self.arena, leaf, pos, end)
    }

    /// Yields every entry in ascending key order.
    pub fn iter(&self) -> RangeScan<'_, K, V> {
        RangeScan::new(&self.arena, self.leftmost_leaf(), 0, Bound::Unbounded)
    }

    /// Yields every key in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    // =========================================================================
    // Write Path (Single Writer)
    // =========================================================================

    /// Inserts a new key. Returns false, leaving the tree untouched, if the
    /// key is already present.
    #[must_use = "a false return means the key already existed and nothing was inserted"]
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let (leaf_id, mut path) = self.descend(&key);
        let max_entries = self.config.max_leaf_entries();

        let leaf = self.arena.get_mut(leaf_id).as_leaf_mut();
        let pos = match leaf.keys.binary_search(&key) {
            Ok(_) => return false,
            Err(pos) => pos,
        };
        leaf.keys.insert(pos, key);
        leaf.values.insert(pos, value);
        let overflow = leaf.keys.len() > max_entries;
        self.len += 1;

        if overflow {
            self.split_leaf(leaf_id, &mut path);
        }
        true
    }

    /// Splits an overfull leaf; the right half's first key is copied up.
    fn split_leaf(&mut self, leaf_id: NodeId, path: &mut DescentPath) {
        let leaf = self.arena.get_mut(leaf_id).as_leaf_mut();
        let mid = leaf.keys.len() / 2;
        let right = LeafNode {
            keys: leaf.keys.split_off(mid),
            values: leaf.values.split_off(mid),
            next: leaf.next,
        };
        let separator = right.keys[0].clone();

        let right_id = self.arena.allocate(Node::Leaf(right));
        self.arena.get_mut(leaf_id).as_leaf_mut().next = Some(right_id);
        trace!(left = ?leaf_id, right = ?right_id, "split B+Tree leaf");

        self.insert_into_parent(path, leaf_id, separator, right_id);
    }

    /// Hooks a freshly split right sibling into its parent, splitting
    /// internal nodes upward as long as they overflow.
    fn insert_into_parent(
        &mut self,
        path: &mut DescentPath,
        mut left_id: NodeId,
        mut separator: K,
        mut right_id: NodeId,
    ) {
        let order = self.config.order;
        loop {
            let Some((parent_id, idx)) = path.pop() else {
                let new_root = InternalNode {
                    keys: vec![separator],
                    children: vec![left_id, right_id],
                };
                self.root = self.arena.allocate(Node::Internal(new_root));
                self.height += 1;
                debug!(height = self.height, "B+Tree root split");
                return;
            };

            let parent = self.arena.get_mut(parent_id).as_internal_mut();
            parent.keys.insert(idx, separator);
            parent.children.insert(idx + 1, right_id);
            if parent.children.len() <= order {
                return;
            }

            // Median separator moves up; it is not kept in either half.
            let mid = parent.keys.len() / 2;
            let mut right_keys = parent.keys.split_off(mid);
            let promoted = right_keys.remove(0);
            let right_children = parent.children.split_off(mid + 1);

            let new_id = self.arena.allocate(Node::Internal(InternalNode {
                keys: right_keys,
                children: right_children,
            }));
            trace!(left = ?parent_id, right = ?new_id, "split B+Tree internal node");

            left_id = parent_id;
            separator = promoted;
            right_id = new_id;
        }
    }

    /// Removes a key and returns its value. A missing key returns None and
    /// leaves the tree untouched.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let (leaf_id, mut path) = self.descend(key);
        let leaf = self.arena.get_mut(leaf_id).as_leaf_mut();
        let pos = leaf.keys.binary_search(key).ok()?;
        leaf.keys.remove(pos);
        let value = leaf.values.remove(pos);
        self.len -= 1;

        self.rebalance(leaf_id, &mut path);
        Some(value)
    }

    /// Restores minimum occupancy from `node_id` upward: borrow from the right
    /// sibling, then the left one, and merge when neither has a surplus.
    fn rebalance(&mut self, mut node_id: NodeId, path: &mut DescentPath) {
        let min_keys = self.config.min_keys();

        while let Some((parent_id, idx)) = path.pop() {
            if self.arena.get(node_id).key_count() >= min_keys {
                return;
            }

            let (left_id, right_id) = match self.arena.get(parent_id) {
                Node::Internal(parent) => (
                    idx.checked_sub(1).map(|i| parent.children[i]),
                    parent.children.get(idx + 1).copied(),
                ),
                Node::Leaf(_) => unreachable!("B+Tree path holds only internal nodes"),
            };

            if let Some(right_id) = right_id {
                if self.arena.get(right_id).key_count() > min_keys {
                    self.borrow_from_right(parent_id, idx, node_id, right_id);
                    return;
                }
            }
            if let Some(left_id) = left_id {
                if self.arena.get(left_id).key_count() > min_keys {
                    self.borrow_from_left(parent_id, idx, left_id, node_id);
                    return;
                }
            }

            match (left_id, right_id) {
                (_, Some(right_id)) => self.merge(parent_id, idx, node_id, right_id),
                (Some(left_id), None) => self.merge(parent_id, idx - 1, left_id, node_id),
                (None, None) => unreachable!("B+Tree internal node with a single child"),
            }
            node_id = parent_id;
        }

        self.collapse_root();
    }

    /// Moves the right sibling's first entry to the end of `node_id`.
    fn borrow_from_right(&mut self, parent_id: NodeId, idx: usize, node_id: NodeId, right_id: NodeId) {
        match self.arena.get_mut(right_id) {
            Node::Leaf(right) => {
                let key = right.keys.remove(0);
                let value = right.values.remove(0);
                let new_separator = right.keys[0].clone();

                let node = self.arena.get_mut(node_id).as_leaf_mut();
                node.keys.push(key);
                node.values.push(value);
                self.arena.get_mut(parent_id).as_internal_mut().keys[idx] = new_separator;
            }
            Node::Internal(right) => {
                let key = right.keys.remove(0);
                let child = right.children.remove(0);

                let parent = self.arena.get_mut(parent_id).as_internal_mut();
                let separator = std::mem::replace(&mut parent.keys[idx], key);

                let node = self.arena.get_mut(node_id).as_internal_mut();
                node.keys.push(separator);
                node.children.push(child);
            }
        }
        trace!(node = ?node_id, sibling = ?right_id, "borrowed from right B+Tree sibling");
    }

    /// Moves the left sibling's last entry to the front of `node_id`.
    fn borrow_from_left(&mut self, parent_id: NodeId, idx: usize, left_id: NodeId, node_id: NodeId) {
        match self.arena.get_mut(left_id) {
            Node::Leaf(left) => {
                let (Some(key), Some(value)) = (left.keys.pop(), left.values.pop()) else {
                    unreachable!("B+Tree lender leaf is empty");
                };
                self.arena.get_mut(parent_id).as_internal_mut().keys[idx - 1] = key.clone();

                let node = self.arena.get_mut(node_id).as_leaf_mut();
                node.keys.insert(0, key);
                node.values.insert(0, value);
            }
            Node::Internal(left) => {
                let (Some(key), Some(child)) = (left.keys.pop(), left.children.pop()) else {
                    unreachable!("B+Tree lender node is empty");
                };

                let parent = self.arena.get_mut(parent_id).as_internal_mut();
                let separator = std::mem::replace(&mut parent.keys[idx - 1], key);

                let node = self.arena.get_mut(node_id).as_internal_mut();
                node.keys.insert(0, separator);
                node.children.insert(0, child);
            }
        }
        trace!(node = ?node_id, sibling = ?left_id, "borrowed from left B+Tree sibling");
    }

    /// Folds `right_id` into `left_id`, dropping separator `sep_idx` and the
    /// right child from the parent.
    fn merge(&mut self, parent_id: NodeId, sep_idx: usize, left_id: NodeId, right_id: NodeId) {
        let parent = self.arena.get_mut(parent_id).as_internal_mut();
        let separator = parent.keys.remove(sep_idx);
        parent.children.remove(sep_idx + 1);

        let right = self.arena.release(right_id);
        match (self.arena.get_mut(left_id), right) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                left.keys.extend(right.keys);
                left.values.extend(right.values);
                left.next = right.next;
            }
            (Node::Internal(left), Node::Internal(right)) => {
                left.keys.push(separator);
                left.keys.extend(right.keys);
                left.children.extend(right.children);
            }
            _ => unreachable!("B+Tree siblings at different levels"),
        }
        trace!(left = ?left_id, right = ?right_id, "merged B+Tree siblings");
    }

    /// Promotes the only child of an empty internal root.
    fn collapse_root(&mut self) {
        let only_child = match self.arena.get(self.root) {
            Node::Internal(root) if root.keys.is_empty() => root.children[0],
            _ => return,
        };
        self.arena.release(self.root);
        self.root = only_child;
        self.height -= 1;
        debug!(height = self.height, "B+Tree root collapsed");
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Checks every structural invariant of the tree.
    ///
    /// Verifies node occupancy, key order, separator bounds, uniform leaf
    /// depth, the leaf chain and the cached length and height.
    pub fn check_invariants(&self) -> Result<()> {
        let mut leaves = Vec::new();
        let mut entries = 0usize;
        self.check_node(self.root, 1, None, None, &mut leaves, &mut entries)?;

        if entries != self.len {
            return Err(corrupted(format!(
                "len is {} but leaves hold {} entries",
                self.len, entries
            )));
        }

        // Leaf chain must visit exactly the in-order leaves.
        let mut chain = Vec::with_capacity(leaves.len());
        let mut cursor = Some(self.leftmost_leaf());
        while let Some(id) = cursor {
            if chain.len() > leaves.len() {
                return Err(corrupted("leaf chain is longer than the tree"));
            }
            chain.push(id);
            cursor = self.arena.get(id).as_leaf().next;
        }
        if chain != leaves {
            return Err(corrupted("leaf chain does not match in-order leaves"));
        }

        let mut previous: Option<&K> = None;
        for key in self.keys() {
            if previous.is_some_and(|p| p >= key) {
                return Err(corrupted("leaf chain keys are not strictly ascending"));
            }
            previous = Some(key);
        }

        if self.arena.live_count() != self.reachable_nodes() {
            return Err(corrupted("arena holds unreachable nodes"));
        }
        Ok(())
    }

    fn check_node(
        &self,
        id: NodeId,
        depth: usize,
        lower: Option<&K>,
        upper: Option<&K>,
        leaves: &mut Vec<NodeId>,
        entries: &mut usize,
    ) -> Result<()> {
        let node = self.arena.get(id);
        let is_root = id == self.root;
        let keys = node.keys();

        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(corrupted(format!("keys of {:?} are not strictly ascending", id)));
        }
        if let (Some(lower), Some(first)) = (lower, keys.first()) {
            if first < lower {
                return Err(corrupted(format!("{:?} holds a key below its separator", id)));
            }
        }
        if let (Some(upper), Some(last)) = (upper, keys.last()) {
            if last >= upper {
                return Err(corrupted(format!("{:?} holds a key at or above its separator", id)));
            }
        }

        match node {
            Node::Leaf(leaf) => {
                if depth != self.height {
                    return Err(corrupted(format!(
                        "leaf {:?} at depth {} but height is {}",
                        id, depth, self.height
                    )));
                }
                if leaf.values.len() != leaf.keys.len() {
                    return Err(corrupted(format!("leaf {:?} has mismatched values", id)));
                }
                if leaf.keys.len() > self.config.max_leaf_entries()
                    || (!is_root && leaf.keys.len() < self.config.min_keys())
                {
                    return Err(corrupted(format!(
                        "leaf {:?} has {} entries",
                        id,
                        leaf.keys.len()
                    )));
                }
                leaves.push(id);
                *entries += leaf.keys.len();
            }
            Node::Internal(internal) => {
                let children = internal.children.len();
                let min_children = if is_root { 2 } else { self.config.min_keys() + 1 };
                if children != internal.keys.len() + 1 {
                    return Err(corrupted(format!("internal {:?} key/child mismatch", id)));
                }
                if children > self.config.order || children < min_children {
                    return Err(corrupted(format!(
                        "internal {:?} has {} children",
                        id, children
                    )));
                }
                for (i, &child) in internal.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(&internal.keys[i - 1]) };
                    let child_upper = internal.keys.get(i).or(upper);
                    self.check_node(child, depth + 1, child_lower, child_upper, leaves, entries)?;
                }
            }
        }
        Ok(())
    }

    fn reachable_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            count += 1;
            if let Node::Internal(node) = self.arena.get(id) {
                stack.extend(node.children.iter().copied());
            }
        }
        count
    }
}

impl<K: Ord + Clone, V> Default for BPlusTree<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_TREE_ORDER)
    }
}

impl<'a, K: Ord + Clone, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = RangeScan<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn corrupted(reason: impl Into<String>) -> TallyError {
    TallyError::BTreeCorrupted(reason.into())
}
