//! Named index wrapping a single B+ tree.

use tally_common::{Result, TallyError, TreeConfig};

use crate::btree::{BPlusTree, RangeScan};

/// A named B+ tree index, either the primary index of a table or a
/// secondary index over one of its columns.
///
/// The name and the primary flag are fixed at construction. Lookups and
/// removals of absent keys return `None`; that is a normal outcome, not an
/// error.
#[derive(Debug)]
pub struct Index<K, V> {
    name: String,
    tree: BPlusTree<K, V>,
    primary: bool,
}

impl<K: Ord + Clone, V> Index<K, V> {
    /// Creates an empty index.
    pub fn new(name: impl Into<String>, primary: bool, config: &TreeConfig) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(TallyError::MissingArgument("index name"));
        }
        Ok(Self {
            name,
            tree: BPlusTree::with_config(config)?,
            primary,
        })
    }

    /// Creates an empty primary index.
    pub fn primary(name: impl Into<String>, config: &TreeConfig) -> Result<Self> {
        Self::new(name, true, config)
    }

    /// Creates an empty secondary index.
    pub fn secondary(name: impl Into<String>, config: &TreeConfig) -> Result<Self> {
        Self::new(name, false, config)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Inserts a new key; false if the key already exists.
    #[must_use = "a false return means the key already existed and nothing was inserted"]
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.tree.insert(key, value)
    }

    pub fn search(&self, key: &K) -> Option<&V> {
        self.tree.search(key)
    }

    /// Mutable lookup, used to maintain per-key payloads in place.
    pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
        self.tree.search_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.tree.contains_key(key)
    }

    /// Removes a key, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.tree.delete(key)
    }

    /// Number of entries in the index.
    #[inline]
    pub fn size(&self) -> usize {
        self.tree.len()
    }

    pub fn range_scan(&self, low: &K, high: &K) -> RangeScan<'_, K, V> {
        self.tree.range_scan(low, high)
    }

    pub fn iter(&self) -> RangeScan<'_, K, V> {
        self.tree.iter()
    }

    /// Read-only access to the underlying tree.
    pub fn tree(&self) -> &BPlusTree<K, V> {
        &self.tree
    }
}
