//! Node types for the arena B+Tree.

use super::arena::NodeId;

/// Routes `key` to a child slot of an internal node.
///
/// B+Tree semantics: child[i] has keys < key[i], child[i+1] has keys >= key[i].
/// A key equal to a separator therefore goes right. Every descent in the tree
/// goes through this function.
#[inline(always)]
pub(crate) fn child_index<K: Ord>(separators: &[K], key: &K) -> usize {
    separators.partition_point(|separator| separator <= key)
}

/// Leaf node: sorted entries plus the link to the next leaf to the right.
#[derive(Debug)]
pub(crate) struct LeafNode<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) values: Vec<V>,
    pub(crate) next: Option<NodeId>,
}

impl<K, V> LeafNode<K, V> {
    pub(crate) fn empty() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }
}

/// Internal node: `keys.len() + 1 == children.len()`.
#[derive(Debug)]
pub(crate) struct InternalNode<K> {
    pub(crate) keys: Vec<K>,
    pub(crate) children: Vec<NodeId>,
}

#[derive(Debug)]
pub(crate) enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K>),
}

impl<K, V> Node<K, V> {
    /// Entries for a leaf, separators for an internal node.
    #[inline]
    pub(crate) fn key_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Internal(internal) => internal.keys.len(),
        }
    }

    #[inline]
    pub(crate) fn keys(&self) -> &[K] {
        match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        }
    }

    #[inline]
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected B+Tree leaf, found internal node"),
        }
    }

    #[inline]
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected B+Tree leaf, found internal node"),
        }
    }

    #[inline]
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected B+Tree internal node, found leaf"),
        }
    }
}
