//! B+ Tree implementation for the numVotes index
//!
//! This module provides an in-memory B+ tree mapping integer keys to record
//! addresses in the block store. It supports:
//! - Duplicate keys (a movie's vote count is rarely unique)
//! - Range queries (via linked leaf nodes)
//! - Borrow/merge rebalancing on delete
//!
//! Nodes live in an arena and are addressed by `NodeId`; parents own their
//! children through ids, and the leaf `next` link is a plain relation used
//! only for ordered scans.

mod error;
mod node;

pub use error::{BPlusTreeError, BPlusTreeResult};
pub use node::{BPlusNode, InternalNode, LeafNode, NodeId};

use log::debug;

use crate::record::RecordId;

/// Key type for B+ tree (numVotes widened to i64)
pub type BPlusKey = i64;

/// Ancestors of a node from the root down, with the child index taken at each
type Path = Vec<(NodeId, usize)>;

/// Which end of a run of equal keys a descent should land on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bias {
    /// First leaf that can hold the key (searches, deletes)
    Left,
    /// Last leaf that can hold the key (inserts)
    Right,
}

/// Nodes touched while answering a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchTrace {
    /// Internal nodes on the root-to-leaf descent
    pub internal_nodes: usize,
    /// Leaves read along the leaf chain
    pub leaf_nodes: usize,
}

impl SearchTrace {
    pub fn total(&self) -> usize {
        self.internal_nodes + self.leaf_nodes
    }
}

/// B+ Tree data structure
///
/// Order `n` means:
/// - Every node holds at most `n` keys (internal nodes have `keys + 1` children)
/// - Every node except the root holds at least `ceil((n+1)/2) - 1` keys
#[derive(Debug)]
pub struct BPlusTree {
    /// Root node ID (None if tree is empty)
    root: Option<NodeId>,

    /// Tree order (max keys per node)
    order: usize,

    /// Node storage
    nodes: Vec<Option<BPlusNode>>,

    /// Free list for recycling deleted nodes
    free_list: Vec<NodeId>,

    /// First leaf node (for full range scans)
    first_leaf: Option<NodeId>,

    /// Total number of entries in the tree
    entry_count: usize,
}

impl BPlusTree {
    /// Create a new empty B+ tree with the given order
    ///
    /// # Arguments
    /// * `order` - Maximum keys per node (must be >= 2)
    ///
    /// # Returns
    /// * `Ok(BPlusTree)` - A new empty B+ tree
    /// * `Err(BPlusTreeError)` - If order is invalid
    pub fn new(order: usize) -> BPlusTreeResult<Self> {
        if order < 2 {
            return Err(BPlusTreeError::InvalidOrder(order));
        }

        Ok(Self {
            root: None,
            order,
            nodes: Vec::new(),
            free_list: Vec::new(),
            first_leaf: None,
            entry_count: 0,
        })
    }

    /// Get the tree order
    pub fn order(&self) -> usize {
        self.order
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Get number of entries in the tree
    pub fn len(&self) -> usize {
        self.entry_count
    }

    /// Get tree height (0 when empty, 1 for single leaf, 2+ with internal levels)
    pub fn height(&self) -> usize {
        match self.root {
            None => 0,
            Some(root_id) => {
                let mut height = 1;
                let mut current = root_id;

                while let Some(BPlusNode::Internal(node)) = self.get_node(current) {
                    match node.children.first() {
                        Some(&child_id) => {
                            current = child_id;
                            height += 1;
                        }
                        None => break,
                    }
                }

                height
            }
        }
    }

    /// Maximum keys in any node
    fn max_keys(&self) -> usize {
        self.order
    }

    /// Minimum keys in a node (except root)
    fn min_keys(&self) -> usize {
        (self.order + 1).div_ceil(2) - 1
    }

    // ========== Node Management ==========

    /// Allocate a new node, returning its ID
    fn allocate_node(&mut self, node: BPlusNode) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            let id = self.nodes.len();
            self.nodes.push(Some(node));
            id
        }
    }

    /// Remove a node from storage, returning it and recycling its ID
    fn take_node(&mut self, id: NodeId) -> BPlusTreeResult<BPlusNode> {
        let node = self
            .nodes
            .get_mut(id)
            .and_then(|n| n.take())
            .ok_or(BPlusTreeError::NodeNotFound(id))?;
        self.free_list.push(id);
        Ok(node)
    }

    /// Get a reference to a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&BPlusNode> {
        self.nodes.get(id).and_then(|n| n.as_ref())
    }

    fn get_node_mut(&mut self, id: NodeId) -> Option<&mut BPlusNode> {
        self.nodes.get_mut(id).and_then(|n| n.as_mut())
    }

    fn leaf(&self, id: NodeId) -> BPlusTreeResult<&LeafNode> {
        self.get_node(id)
            .and_then(|n| n.as_leaf())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn leaf_mut(&mut self, id: NodeId) -> BPlusTreeResult<&mut LeafNode> {
        self.get_node_mut(id)
            .and_then(|n| n.as_leaf_mut())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn internal(&self, id: NodeId) -> BPlusTreeResult<&InternalNode> {
        self.get_node(id)
            .and_then(|n| n.as_internal())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn internal_mut(&mut self, id: NodeId) -> BPlusTreeResult<&mut InternalNode> {
        self.get_node_mut(id)
            .and_then(|n| n.as_internal_mut())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    /// Get the root node ID
    pub fn root_node_id(&self) -> Option<NodeId> {
        self.root
    }

    /// Get the first leaf node ID
    pub fn first_leaf_id(&self) -> Option<NodeId> {
        self.first_leaf
    }

    /// Count all leaf and internal nodes reachable from the root
    pub fn total_node_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();

        while let Some(id) = stack.pop() {
            match self.get_node(id) {
                Some(BPlusNode::Internal(node)) => {
                    count += 1;
                    stack.extend(node.children.iter().copied());
                }
                Some(BPlusNode::Leaf(_)) => count += 1,
                None => {}
            }
        }

        count
    }

    // ========== Search Operations ==========

    /// Find the leaf for a key, recording the ancestor path
    fn descend(&self, key: BPlusKey, bias: Bias) -> BPlusTreeResult<Option<(NodeId, Path)>> {
        let Some(mut current) = self.root else {
            return Ok(None);
        };
        let mut path = Vec::new();

        loop {
            match self
                .get_node(current)
                .ok_or(BPlusTreeError::NodeNotFound(current))?
            {
                BPlusNode::Leaf(_) => return Ok(Some((current, path))),
                BPlusNode::Internal(node) => {
                    let child_idx = match bias {
                        Bias::Left => node.leftmost_child_index(key),
                        Bias::Right => node.rightmost_child_index(key),
                    };
                    path.push((current, child_idx));
                    current = node.children[child_idx];
                }
            }
        }
    }

    /// Number of internal nodes traversed to reach the first leaf for `key`
    pub fn count_index_nodes_visited(&self, key: BPlusKey) -> usize {
        self.descend(key, Bias::Left)
            .ok()
            .flatten()
            .map(|(_, path)| path.len())
            .unwrap_or(0)
    }

    /// Search for a key, returning the first matching RecordId
    pub fn search(&self, key: BPlusKey) -> Option<RecordId> {
        self.exact_search(key).into_iter().next()
    }

    /// Search for all entries with the given key, in insertion order
    pub fn exact_search(&self, key: BPlusKey) -> Vec<RecordId> {
        self.exact_search_traced(key).0
    }

    /// Exact search that also reports the nodes it touched
    pub fn exact_search_traced(&self, key: BPlusKey) -> (Vec<RecordId>, SearchTrace) {
        self.scan(key, key)
    }

    /// Range search: return all entries where lower <= key <= upper
    pub fn range_search(&self, lower: BPlusKey, upper: BPlusKey) -> Vec<RecordId> {
        self.range_search_traced(lower, upper).0
    }

    /// Range search that also reports the nodes it touched
    pub fn range_search_traced(
        &self,
        lower: BPlusKey,
        upper: BPlusKey,
    ) -> (Vec<RecordId>, SearchTrace) {
        if lower > upper {
            return (Vec::new(), SearchTrace::default());
        }
        self.scan(lower, upper)
    }

    /// Walk the leaf chain from the first leaf that may hold `lower`
    fn scan(&self, lower: BPlusKey, upper: BPlusKey) -> (Vec<RecordId>, SearchTrace) {
        let mut results = Vec::new();
        let mut trace = SearchTrace::default();

        let (leaf_id, path) = match self.descend(lower, Bias::Left) {
            Ok(Some(found)) => found,
            _ => return (results, trace),
        };
        trace.internal_nodes = path.len();

        let mut current_id = Some(leaf_id);

        // Matches may span several leaves, keep going until a key passes the bound
        while let Some(id) = current_id {
            let leaf = match self.get_node(id).and_then(|n| n.as_leaf()) {
                Some(l) => l,
                None => break,
            };
            trace.leaf_nodes += 1;

            for (i, &k) in leaf.keys.iter().enumerate() {
                if k > upper {
                    return (results, trace);
                }
                if k >= lower {
                    results.push(leaf.values[i]);
                }
            }

            current_id = leaf.next;
        }

        (results, trace)
    }

    /// Move the path to the leaf right after the current one
    ///
    /// Climbs until an ancestor has a child to the right of the one taken,
    /// then descends along first children. Returns None past the last leaf.
    fn advance_path(&self, path: &mut Path) -> BPlusTreeResult<Option<NodeId>> {
        while let Some((parent_id, child_idx)) = path.pop() {
            let parent = self.internal(parent_id)?;
            if child_idx + 1 < parent.children.len() {
                path.push((parent_id, child_idx + 1));
                let mut current = parent.children[child_idx + 1];

                loop {
                    match self
                        .get_node(current)
                        .ok_or(BPlusTreeError::NodeNotFound(current))?
                    {
                        BPlusNode::Leaf(_) => return Ok(Some(current)),
                        BPlusNode::Internal(node) => {
                            path.push((current, 0));
                            current = node.children[0];
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    // ========== Insert Operations ==========

    /// Insert a key-value pair into the tree
    ///
    /// Equal keys are placed after every existing occurrence, so duplicates
    /// come back from searches in insertion order.
    pub fn insert(&mut self, key: BPlusKey, rid: RecordId) -> BPlusTreeResult<()> {
        let Some((leaf_id, mut path)) = self.descend(key, Bias::Right)? else {
            // Create first leaf as root
            let mut leaf = LeafNode::new();
            leaf.insert(key, rid);
            let leaf_id = self.allocate_node(BPlusNode::Leaf(leaf));
            self.root = Some(leaf_id);
            self.first_leaf = Some(leaf_id);
            self.entry_count = 1;
            return Ok(());
        };

        let max_keys = self.max_keys();
        let leaf_len = {
            let leaf = self.leaf_mut(leaf_id)?;
            leaf.insert(key, rid);
            leaf.len()
        };

        self.entry_count += 1;

        if leaf_len > max_keys {
            self.split_leaf(leaf_id, &mut path)?;
        }

        Ok(())
    }

    /// Split an overflowing leaf node
    fn split_leaf(&mut self, leaf_id: NodeId, path: &mut Path) -> BPlusTreeResult<()> {
        let right = self.leaf_mut(leaf_id)?.split();
        let separator = right.first_key().ok_or_else(|| {
            BPlusTreeError::InvalidState("leaf split produced an empty node".to_string())
        })?;

        let right_id = self.allocate_node(BPlusNode::Leaf(right));
        self.leaf_mut(leaf_id)?.next = Some(right_id);

        debug!(
            "split leaf {} -> {} at separator {}",
            leaf_id, right_id, separator
        );

        self.insert_into_parent(path, leaf_id, separator, right_id)
    }

    /// Insert a separator for a freshly split node into its parent
    fn insert_into_parent(
        &mut self,
        path: &mut Path,
        left_id: NodeId,
        key: BPlusKey,
        right_id: NodeId,
    ) -> BPlusTreeResult<()> {
        let Some((parent_id, child_idx)) = path.pop() else {
            // Split the root - create new root
            let new_root = InternalNode::new(vec![key], vec![left_id, right_id]);
            let new_root_id = self.allocate_node(BPlusNode::Internal(new_root));
            self.root = Some(new_root_id);
            debug!("new root {} (height {})", new_root_id, self.height());
            return Ok(());
        };

        let max_keys = self.max_keys();
        let parent_len = {
            let parent = self.internal_mut(parent_id)?;
            parent.insert_child(child_idx, key, right_id);
            parent.len()
        };

        if parent_len > max_keys {
            self.split_internal(parent_id, path)?;
        }

        Ok(())
    }

    /// Split an overflowing internal node
    fn split_internal(&mut self, node_id: NodeId, path: &mut Path) -> BPlusTreeResult<()> {
        let (promoted, right) = self.internal_mut(node_id)?.split();
        let right_id = self.allocate_node(BPlusNode::Internal(right));

        debug!(
            "split internal {} -> {} promoting {}",
            node_id, right_id, promoted
        );

        self.insert_into_parent(path, node_id, promoted, right_id)
    }

    // ========== Delete Operations ==========

    /// Delete the first entry with the given key
    /// Returns false (tree untouched) if the key is absent
    pub fn delete(&mut self, key: BPlusKey) -> BPlusTreeResult<bool> {
        self.delete_where(key, |_| true)
    }

    /// Delete a specific key-value pair
    /// Returns true if the entry was found and deleted
    pub fn delete_entry(&mut self, key: BPlusKey, rid: RecordId) -> BPlusTreeResult<bool> {
        self.delete_where(key, |value| value == rid)
    }

    /// Delete every entry with the given key, returning how many were removed
    pub fn delete_all(&mut self, key: BPlusKey) -> BPlusTreeResult<usize> {
        let mut removed = 0;
        while self.delete(key)? {
            removed += 1;
        }
        Ok(removed)
    }

    /// Remove the leftmost entry with `key` whose value satisfies `matches`
    fn delete_where<F>(&mut self, key: BPlusKey, matches: F) -> BPlusTreeResult<bool>
    where
        F: Fn(RecordId) -> bool,
    {
        let Some((mut leaf_id, mut path)) = self.descend(key, Bias::Left)? else {
            return Ok(false);
        };

        // Duplicates may continue into later leaves, follow them with the path
        let pos = loop {
            let (found, passed) = {
                let leaf = self.leaf(leaf_id)?;
                let mut found = None;
                let mut passed = false;
                for (i, (&k, &v)) in leaf.keys.iter().zip(leaf.values.iter()).enumerate() {
                    if k > key {
                        passed = true;
                        break;
                    }
                    if k == key && matches(v) {
                        found = Some(i);
                        break;
                    }
                }
                (found, passed)
            };

            match found {
                Some(pos) => break pos,
                None if passed => return Ok(false),
                None => match self.advance_path(&mut path)? {
                    Some(next_id) => leaf_id = next_id,
                    None => return Ok(false),
                },
            }
        };

        self.leaf_mut(leaf_id)?.remove(pos);
        self.entry_count -= 1;

        self.handle_leaf_underflow(leaf_id, path, pos == 0)?;

        Ok(true)
    }

    /// Point the separator that bounds a leaf from the left at its first key
    ///
    /// The separator lives in the nearest ancestor reached through a child
    /// index > 0; the leftmost leaf of the tree has none.
    fn refresh_separator(&mut self, leaf_id: NodeId, path: &[(NodeId, usize)]) -> BPlusTreeResult<()> {
        let Some(first) = self.leaf(leaf_id)?.first_key() else {
            return Ok(());
        };

        for &(ancestor_id, child_idx) in path.iter().rev() {
            if child_idx > 0 {
                self.internal_mut(ancestor_id)?.keys[child_idx - 1] = first;
                break;
            }
        }

        Ok(())
    }

    /// Left and right siblings of `children[child_idx]` under `parent_id`
    fn siblings(
        &self,
        parent_id: NodeId,
        child_idx: usize,
    ) -> BPlusTreeResult<(Option<NodeId>, Option<NodeId>)> {
        let parent = self.internal(parent_id)?;
        let left = child_idx
            .checked_sub(1)
            .and_then(|i| parent.children.get(i).copied());
        let right = parent.children.get(child_idx + 1).copied();
        Ok((left, right))
    }

    /// Handle underflow in a leaf node after deletion
    fn handle_leaf_underflow(
        &mut self,
        leaf_id: NodeId,
        mut path: Path,
        first_removed: bool,
    ) -> BPlusTreeResult<()> {
        let leaf_len = self.leaf(leaf_id)?.len();

        // Check if leaf is root
        if path.is_empty() {
            if leaf_len == 0 {
                // Tree is now empty
                self.take_node(leaf_id)?;
                self.root = None;
                self.first_leaf = None;
                debug!("tree emptied");
            }
            return Ok(());
        }

        if first_removed {
            self.refresh_separator(leaf_id, &path)?;
        }

        let min_keys = self.min_keys();
        if leaf_len >= min_keys {
            return Ok(());
        }

        let (parent_id, child_idx) = path[path.len() - 1];
        let (left, right) = self.siblings(parent_id, child_idx)?;

        if let Some(left_id) = left {
            if self.leaf(left_id)?.len() > min_keys {
                // Borrow from left sibling (take its last entry)
                let (key, value) = {
                    let sibling = self.leaf_mut(left_id)?;
                    let last = sibling.len() - 1;
                    sibling.remove(last)
                };

                let leaf = self.leaf_mut(leaf_id)?;
                leaf.keys.insert(0, key);
                leaf.values.insert(0, value);

                self.internal_mut(parent_id)?.keys[child_idx - 1] = key;
                debug!("leaf {} borrowed {} from left {}", leaf_id, key, left_id);
                return Ok(());
            }
        }

        if let Some(right_id) = right {
            if self.leaf(right_id)?.len() > min_keys {
                // Borrow from right sibling (take its first entry)
                let (key, value, right_first) = {
                    let sibling = self.leaf_mut(right_id)?;
                    let (key, value) = sibling.remove(0);
                    (key, value, sibling.first_key())
                };

                let leaf = self.leaf_mut(leaf_id)?;
                leaf.keys.push(key);
                leaf.values.push(value);

                if let Some(right_first) = right_first {
                    self.internal_mut(parent_id)?.keys[child_idx] = right_first;
                }
                // The leaf may have been empty, its first key is new
                self.refresh_separator(leaf_id, &path)?;
                debug!("leaf {} borrowed {} from right {}", leaf_id, key, right_id);
                return Ok(());
            }
        }

        if let Some(left_id) = left {
            self.merge_leaves(left_id, leaf_id, parent_id, child_idx)?;
        } else if let Some(right_id) = right {
            self.merge_leaves(leaf_id, right_id, parent_id, child_idx + 1)?;
            self.refresh_separator(leaf_id, &path)?;
        } else {
            return Err(BPlusTreeError::InvalidState(format!(
                "leaf {} has no sibling",
                leaf_id
            )));
        }

        path.pop();
        self.handle_internal_underflow(parent_id, path)
    }

    /// Merge a leaf into its left neighbour and drop it from the parent
    ///
    /// `right_idx` is the position of `right_id` among the parent's children.
    fn merge_leaves(
        &mut self,
        left_id: NodeId,
        right_id: NodeId,
        parent_id: NodeId,
        right_idx: usize,
    ) -> BPlusTreeResult<()> {
        let right = match self.take_node(right_id)? {
            BPlusNode::Leaf(leaf) => leaf,
            BPlusNode::Internal(_) => return Err(BPlusTreeError::NodeNotFound(right_id)),
        };

        // Splices `right` out of the leaf chain too
        self.leaf_mut(left_id)?.append(right);

        let parent = self.internal_mut(parent_id)?;
        parent.keys.remove(right_idx - 1);
        parent.children.remove(right_idx);

        debug!("merged leaf {} into {}", right_id, left_id);
        Ok(())
    }

    /// Handle underflow in an internal node after one of its children merged
    fn handle_internal_underflow(&mut self, node_id: NodeId, mut path: Path) -> BPlusTreeResult<()> {
        let node_len = self.internal(node_id)?.len();

        if path.is_empty() {
            if node_len == 0 {
                // Root with one child - make child the new root
                let new_root = self.internal(node_id)?.children[0];
                self.take_node(node_id)?;
                self.root = Some(new_root);
                debug!("root collapsed into {}", new_root);
            }
            return Ok(());
        }

        let min_keys = self.min_keys();
        if node_len >= min_keys {
            return Ok(());
        }

        let (parent_id, child_idx) = path[path.len() - 1];
        let (left, right) = self.siblings(parent_id, child_idx)?;

        if let Some(left_id) = left {
            if self.internal(left_id)?.len() > min_keys {
                // Rotate the left sibling's last child through the parent
                let (key, child) = {
                    let sibling = self.internal_mut(left_id)?;
                    let key = sibling.keys.pop();
                    let child = sibling.children.pop();
                    key.zip(child).ok_or_else(|| {
                        BPlusTreeError::InvalidState(format!("internal node {} is empty", left_id))
                    })?
                };

                let separator =
                    std::mem::replace(&mut self.internal_mut(parent_id)?.keys[child_idx - 1], key);

                let node = self.internal_mut(node_id)?;
                node.keys.insert(0, separator);
                node.children.insert(0, child);
                debug!("internal {} borrowed from left {}", node_id, left_id);
                return Ok(());
            }
        }

        if let Some(right_id) = right {
            if self.internal(right_id)?.len() > min_keys {
                // Rotate the right sibling's first child through the parent
                let (key, child) = {
                    let sibling = self.internal_mut(right_id)?;
                    (sibling.keys.remove(0), sibling.children.remove(0))
                };

                let separator =
                    std::mem::replace(&mut self.internal_mut(parent_id)?.keys[child_idx], key);

                let node = self.internal_mut(node_id)?;
                node.keys.push(separator);
                node.children.push(child);
                debug!("internal {} borrowed from right {}", node_id, right_id);
                return Ok(());
            }
        }

        if let Some(left_id) = left {
            self.merge_internal(left_id, node_id, parent_id, child_idx)?;
        } else if let Some(right_id) = right {
            self.merge_internal(node_id, right_id, parent_id, child_idx + 1)?;
        } else {
            return Err(BPlusTreeError::InvalidState(format!(
                "internal node {} has no sibling",
                node_id
            )));
        }

        path.pop();
        self.handle_internal_underflow(parent_id, path)
    }

    /// Merge an internal node into its left neighbour, pulling the separator down
    fn merge_internal(
        &mut self,
        left_id: NodeId,
        right_id: NodeId,
        parent_id: NodeId,
        right_idx: usize,
    ) -> BPlusTreeResult<()> {
        let right = match self.take_node(right_id)? {
            BPlusNode::Internal(node) => node,
            BPlusNode::Leaf(_) => return Err(BPlusTreeError::NodeNotFound(right_id)),
        };

        let separator = {
            let parent = self.internal_mut(parent_id)?;
            parent.children.remove(right_idx);
            parent.keys.remove(right_idx - 1)
        };

        let left = self.internal_mut(left_id)?;
        left.keys.push(separator);
        left.keys.extend(right.keys);
        left.children.extend(right.children);

        debug!("merged internal {} into {}", right_id, left_id);
        Ok(())
    }

    // ========== Diagnostics ==========

    /// Keys of the root node, e.g. `[100 | 2000]`
    pub fn display_root(&self) -> String {
        match self.root.and_then(|id| self.get_node(id)) {
            Some(node) => format_keys(node.keys()),
            None => "(empty)".to_string(),
        }
    }

    /// Keys of every leaf along the leaf chain
    pub fn display_leaves(&self) -> String {
        let mut parts = Vec::new();
        let mut current = self.first_leaf;

        while let Some(id) = current {
            let Some(leaf) = self.get_node(id).and_then(|n| n.as_leaf()) else {
                break;
            };
            parts.push(format_keys(&leaf.keys));
            current = leaf.next;
        }

        if parts.is_empty() {
            "(empty)".to_string()
        } else {
            parts.join(" -> ")
        }
    }

    /// Check every structural invariant of the tree
    ///
    /// Verifies node occupancy, child counts, separator bounds, uniform leaf
    /// depth, and that the leaf chain visits the leaves left to right.
    pub fn validate(&self) -> BPlusTreeResult<()> {
        let Some(root) = self.root else {
            if self.entry_count != 0 || self.first_leaf.is_some() {
                return Err(BPlusTreeError::InvalidState(
                    "empty tree has entries or a first leaf".to_string(),
                ));
            }
            return Ok(());
        };

        let mut state = ValidationState::default();
        self.validate_node(root, 0, None, None, &mut state)?;

        if state.entries != self.entry_count {
            return Err(BPlusTreeError::InvalidState(format!(
                "entry count {} but {} entries reachable",
                self.entry_count, state.entries
            )));
        }

        // Leaf chain must follow the depth-first leaf order
        let mut chain = Vec::new();
        let mut current = self.first_leaf;
        while let Some(id) = current {
            if chain.len() > state.leaves.len() {
                return Err(BPlusTreeError::InvalidState(
                    "leaf chain is longer than the tree".to_string(),
                ));
            }
            chain.push(id);
            current = self.leaf(id)?.next;
        }
        if chain != state.leaves {
            return Err(BPlusTreeError::InvalidState(format!(
                "leaf chain {:?} does not match leaf order {:?}",
                chain, state.leaves
            )));
        }

        let keys: Vec<BPlusKey> = self.iter().map(|(k, _)| k).collect();
        if keys.windows(2).any(|w| w[0] > w[1]) {
            return Err(BPlusTreeError::InvalidState(
                "leaf chain keys are not sorted".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_node(
        &self,
        id: NodeId,
        depth: usize,
        lower: Option<BPlusKey>,
        upper: Option<BPlusKey>,
        state: &mut ValidationState,
    ) -> BPlusTreeResult<()> {
        let node = self.get_node(id).ok_or(BPlusTreeError::NodeNotFound(id))?;
        let is_root = Some(id) == self.root;
        let len = node.len();

        if len > self.max_keys() {
            return Err(BPlusTreeError::InvalidState(format!(
                "node {} holds {} keys, max {}",
                id,
                len,
                self.max_keys()
            )));
        }
        if !is_root && len < self.min_keys() {
            return Err(BPlusTreeError::InvalidState(format!(
                "node {} holds {} keys, min {}",
                id,
                len,
                self.min_keys()
            )));
        }

        let keys = node.keys();
        if keys.windows(2).any(|w| w[0] > w[1]) {
            return Err(BPlusTreeError::InvalidState(format!(
                "node {} keys out of order",
                id
            )));
        }
        let out_of_bounds = |k: BPlusKey| {
            lower.is_some_and(|lo| k < lo) || upper.is_some_and(|hi| k > hi)
        };
        if keys.iter().any(|&k| out_of_bounds(k)) {
            return Err(BPlusTreeError::InvalidState(format!(
                "node {} has keys outside [{:?}, {:?}]",
                id, lower, upper
            )));
        }

        match node {
            BPlusNode::Leaf(leaf) => {
                if leaf.is_empty() {
                    return Err(BPlusTreeError::InvalidState(format!("leaf {} is empty", id)));
                }
                match state.leaf_depth {
                    None => state.leaf_depth = Some(depth),
                    Some(d) if d != depth => {
                        return Err(BPlusTreeError::InvalidState(format!(
                            "leaf {} at depth {}, expected {}",
                            id, depth, d
                        )));
                    }
                    Some(_) => {}
                }
                state.leaves.push(id);
                state.entries += leaf.len();
            }
            BPlusNode::Internal(internal) => {
                if internal.is_empty() {
                    return Err(BPlusTreeError::InvalidState(format!(
                        "internal node {} has no keys",
                        id
                    )));
                }
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(BPlusTreeError::InvalidState(format!(
                        "internal node {} has {} keys and {} children",
                        id,
                        internal.keys.len(),
                        internal.children.len()
                    )));
                }
                for (i, &child) in internal.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(internal.keys[i - 1]) };
                    let child_upper = internal.keys.get(i).copied().or(upper);
                    self.validate_node(child, depth + 1, child_lower, child_upper, state)?;
                }
            }
        }

        Ok(())
    }

    // ========== Iterator ==========

    /// Iterate over all entries in key order
    pub fn iter(&self) -> BPlusTreeIter<'_> {
        BPlusTreeIter::new(self)
    }
}

#[derive(Default)]
struct ValidationState {
    leaf_depth: Option<usize>,
    leaves: Vec<NodeId>,
    entries: usize,
}

fn format_keys(keys: &[BPlusKey]) -> String {
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    format!("[{}]", keys.join(" | "))
}

/// Iterator over B+ tree entries
pub struct BPlusTreeIter<'a> {
    tree: &'a BPlusTree,
    current_leaf: Option<NodeId>,
    current_idx: usize,
}

impl<'a> BPlusTreeIter<'a> {
    fn new(tree: &'a BPlusTree) -> Self {
        Self {
            tree,
            current_leaf: tree.first_leaf,
            current_idx: 0,
        }
    }
}

impl Iterator for BPlusTreeIter<'_> {
    type Item = (BPlusKey, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf_id = self.current_leaf?;
            let leaf = self.tree.get_node(leaf_id)?.as_leaf()?;

            if self.current_idx < leaf.len() {
                let key = leaf.keys[self.current_idx];
                let value = leaf.values[self.current_idx];
                self.current_idx += 1;
                return Some((key, value));
            }

            // Move to next leaf
            self.current_leaf = leaf.next;
            self.current_idx = 0;
        }
    }
}
