use crate::record::RecordId;

use super::BPlusKey;

/// Node identifier (index into node storage)
pub type NodeId = usize;

/// Internal node: separator keys and child pointers
///
/// - keys.len() + 1 == children.len()
/// - every entry under children[i] is <= keys[i] <= every entry under children[i + 1]
///
/// The bound is inclusive on both sides so a run of duplicate keys may span
/// several leaves.
#[derive(Debug, Clone)]
pub struct InternalNode {
    /// Separator keys
    pub keys: Vec<BPlusKey>,
    /// Child node IDs
    pub children: Vec<NodeId>,
}

impl InternalNode {
    /// Create a new internal node with given keys and children
    pub fn new(keys: Vec<BPlusKey>, children: Vec<NodeId>) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self { keys, children }
    }

    /// Number of separator keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if node has no separator keys (a single child)
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Child to descend into when looking for the first occurrence of `key`
    ///
    /// Skips every child whose upper separator is strictly below the key.
    pub fn leftmost_child_index(&self, key: BPlusKey) -> usize {
        self.keys.partition_point(|&k| k < key)
    }

    /// Child to descend into when inserting `key` after all equal keys
    pub fn rightmost_child_index(&self, key: BPlusKey) -> usize {
        self.keys.partition_point(|&k| k <= key)
    }

    /// Insert a separator and the new right child produced by splitting
    /// `children[child_idx]`
    pub fn insert_child(&mut self, child_idx: usize, key: BPlusKey, right: NodeId) {
        self.keys.insert(child_idx, key);
        self.children.insert(child_idx + 1, right);
    }

    /// Split this overfull node in the middle
    ///
    /// Returns the promoted key and the new right sibling. The promoted key
    /// is kept by neither half.
    pub fn split(&mut self) -> (BPlusKey, InternalNode) {
        let mid = self.keys.len() / 2;

        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let promoted = self.keys.pop().unwrap_or_default();

        (promoted, InternalNode::new(right_keys, right_children))
    }
}

/// Leaf node: stores key-value pairs, linked to next leaf
#[derive(Debug, Clone)]
pub struct LeafNode {
    /// Keys (sorted, duplicates in insertion order)
    pub keys: Vec<BPlusKey>,
    /// Values (RecordIds) corresponding to keys
    pub values: Vec<RecordId>,
    /// Link to next leaf for range queries
    pub next: Option<NodeId>,
}

impl LeafNode {
    /// Create a new empty leaf node
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    /// Create a leaf node with given entries
    pub fn with_entries(keys: Vec<BPlusKey>, values: Vec<RecordId>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self {
            keys,
            values,
            next: None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if leaf is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert a key-value pair in sorted order
    /// Allows duplicate keys
    pub fn insert(&mut self, key: BPlusKey, value: RecordId) {
        // Insert after existing keys with same value for stability
        let pos = self.keys.partition_point(|&k| k <= key);
        self.keys.insert(pos, key);
        self.values.insert(pos, value);
    }

    /// Remove the entry at `pos`, shifting later entries left
    pub fn remove(&mut self, pos: usize) -> (BPlusKey, RecordId) {
        (self.keys.remove(pos), self.values.remove(pos))
    }

    /// Append entries taken from the right neighbour
    pub fn append(&mut self, other: LeafNode) {
        self.keys.extend(other.keys);
        self.values.extend(other.values);
        self.next = other.next;
    }

    /// Get the minimum key in this leaf
    pub fn first_key(&self) -> Option<BPlusKey> {
        self.keys.first().copied()
    }

    /// Get the maximum key in this leaf
    pub fn last_key(&self) -> Option<BPlusKey> {
        self.keys.last().copied()
    }

    /// Split this leaf node, returning the new right sibling
    ///
    /// Entries [0, mid) stay, entries [mid, len) move. The caller links the
    /// returned node after this one.
    pub fn split(&mut self) -> LeafNode {
        let mid = self.keys.len() / 2;

        let right_keys = self.keys.split_off(mid);
        let right_values = self.values.split_off(mid);

        let mut right = LeafNode::with_entries(right_keys, right_values);
        right.next = self.next.take();

        right
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// B+ tree node (either internal or leaf)
#[derive(Debug, Clone)]
pub enum BPlusNode {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl BPlusNode {
    /// Check if this is a leaf node
    pub fn is_leaf(&self) -> bool {
        matches!(self, BPlusNode::Leaf(_))
    }

    /// Number of keys held by the node
    pub fn len(&self) -> usize {
        match self {
            BPlusNode::Internal(node) => node.len(),
            BPlusNode::Leaf(node) => node.len(),
        }
    }

    /// Check if the node holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the node's keys
    pub fn keys(&self) -> &[BPlusKey] {
        match self {
            BPlusNode::Internal(node) => &node.keys,
            BPlusNode::Leaf(node) => &node.keys,
        }
    }

    /// Get as internal node reference
    pub fn as_internal(&self) -> Option<&InternalNode> {
        match self {
            BPlusNode::Internal(node) => Some(node),
            BPlusNode::Leaf(_) => None,
        }
    }

    /// Get as internal node mutable reference
    pub fn as_internal_mut(&mut self) -> Option<&mut InternalNode> {
        match self {
            BPlusNode::Internal(node) => Some(node),
            BPlusNode::Leaf(_) => None,
        }
    }

    /// Get as leaf node reference
    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            BPlusNode::Internal(_) => None,
            BPlusNode::Leaf(node) => Some(node),
        }
    }

    /// Get as leaf node mutable reference
    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafNode> {
        match self {
            BPlusNode::Internal(_) => None,
            BPlusNode::Leaf(node) => Some(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_node_insert() {
        let mut leaf = LeafNode::new();

        leaf.insert(5, RecordId::new(1, 0));
        leaf.insert(3, RecordId::new(1, 1));
        leaf.insert(7, RecordId::new(1, 2));
        leaf.insert(3, RecordId::new(1, 3)); // Duplicate key

        assert_eq!(leaf.len(), 4);
        assert_eq!(leaf.keys, vec![3, 3, 5, 7]);
        // Duplicates keep insertion order
        assert_eq!(leaf.values[0], RecordId::new(1, 1));
        assert_eq!(leaf.values[1], RecordId::new(1, 3));
    }

    #[test]
    fn test_leaf_node_remove_compacts() {
        let mut leaf = LeafNode::new();
        for i in 0..4 {
            leaf.insert(i * 10, RecordId::new(0, i as usize));
        }

        assert_eq!(leaf.remove(1), (10, RecordId::new(0, 1)));
        assert_eq!(leaf.keys, vec![0, 20, 30]);
        assert_eq!(leaf.first_key(), Some(0));
        assert_eq!(leaf.last_key(), Some(30));
    }

    #[test]
    fn test_leaf_node_split() {
        let mut leaf = LeafNode::new();
        leaf.next = Some(99);

        // Order 3 staging array: 4 entries
        for i in 0..4 {
            leaf.insert(i, RecordId::new(1, i as usize));
        }

        let right = leaf.split();

        assert_eq!(leaf.keys, vec![0, 1]);
        assert_eq!(right.keys, vec![2, 3]);
        assert_eq!(right.next, Some(99));
        assert_eq!(leaf.next, None);
    }

    #[test]
    fn test_leaf_split_odd_staging() {
        let mut leaf = LeafNode::new();
        for i in 0..5 {
            leaf.insert(i, RecordId::new(1, i as usize));
        }

        let right = leaf.split();
        assert_eq!(leaf.keys, vec![0, 1]);
        assert_eq!(right.keys, vec![2, 3, 4]);
    }

    #[test]
    fn test_internal_node_child_index() {
        let node = InternalNode::new(vec![3, 7, 7, 12], vec![0, 1, 2, 3, 4]);

        assert_eq!(node.leftmost_child_index(1), 0);
        assert_eq!(node.leftmost_child_index(3), 0);
        assert_eq!(node.leftmost_child_index(5), 1);
        assert_eq!(node.leftmost_child_index(7), 1);
        assert_eq!(node.leftmost_child_index(15), 4);

        assert_eq!(node.rightmost_child_index(1), 0);
        assert_eq!(node.rightmost_child_index(3), 1);
        assert_eq!(node.rightmost_child_index(7), 3);
        assert_eq!(node.rightmost_child_index(12), 4);
    }

    #[test]
    fn test_internal_node_insert_child() {
        let mut node = InternalNode::new(vec![10], vec![0, 1]);

        // Child 1 split, new right sibling 2 starts at 20
        node.insert_child(1, 20, 2);

        assert_eq!(node.keys, vec![10, 20]);
        assert_eq!(node.children, vec![0, 1, 2]);
    }

    #[test]
    fn test_internal_node_split_promotes_middle() {
        // Order 3 staging: 4 keys, 5 children
        let mut node = InternalNode::new(vec![10, 20, 30, 40], vec![0, 1, 2, 3, 4]);

        let (promoted, right) = node.split();

        assert_eq!(promoted, 30);
        assert_eq!(node.keys, vec![10, 20]);
        assert_eq!(node.children, vec![0, 1, 2]);
        assert_eq!(right.keys, vec![40]);
        assert_eq!(right.children, vec![3, 4]);
    }
}
