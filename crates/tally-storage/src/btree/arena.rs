//! Arena allocation for B+Tree nodes.

use super::types::Node;

/// Handle to a node slot inside a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

impl NodeId {
    #[inline(always)]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Slot storage for B+Tree nodes.
///
/// Parents and the leaf chain refer to nodes by [`NodeId`]. Released slots go
/// on a free list and are handed out again by the next allocation, so a
/// split after a merge does not grow the arena.
#[derive(Debug)]
pub(crate) struct NodeArena<K, V> {
    /// Node slots; `None` marks a released slot.
    slots: Vec<Option<Node<K, V>>>,
    /// Released slots available for reuse.
    free: Vec<NodeId>,
}

impl<K, V> NodeArena<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores a node and returns its handle.
    #[inline]
    pub(crate) fn allocate(&mut self, node: Node<K, V>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(node);
                id
            }
            None => {
                let id = NodeId(self.slots.len() as u32);
                self.slots.push(Some(node));
                id
            }
        }
    }

    /// Takes a node out of the arena and frees its slot.
    pub(crate) fn release(&mut self, id: NodeId) -> Node<K, V> {
        let node = self.slots[id.index()]
            .take()
            .unwrap_or_else(|| panic!("double release of B+Tree node {:?}", id));
        self.free.push(id);
        node
    }

    #[inline(always)]
    pub(crate) fn get(&self, id: NodeId) -> &Node<K, V> {
        match self.slots.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("dangling B+Tree node handle {:?}", id),
        }
    }

    #[inline(always)]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        match self.slots.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("dangling B+Tree node handle {:?}", id),
        }
    }

    /// Number of live nodes.
    pub(crate) fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Drops every node.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}
