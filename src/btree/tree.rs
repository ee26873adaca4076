//! The in-memory B+tree.
//!
//! Nodes are stored in an arena indexed by [`NodeId`], keeping the graph
//! single-owner: every subtree hangs off exactly one child link, while
//! parent pointers and the leaf sibling list are plain back references.
//! Rebalancing after a removal prefers redistribution over merging, and a
//! merge prefers the left sibling as the surviving node.

use std::fmt::{self};

use crate::btree::node::{InternalNode, LeafNode, Node, NodeId, TreeEntry, TreeRecord};
use crate::btree::search::{binary_search, greatest_not_exceeding};
use crate::error::{Result, StorageError};
use crate::types::{InsertType, SearchKey, KEY_SIZE};

/// The minimal order of a [`BPlusTree`], required so that splitting and
/// merging can always satisfy the minimum-population rule.
pub const MIN_ORDER: usize = 2;

/// The structural outcome of rearranging a node's entries
enum Rearrangement {
    /// No rearrangement was possible
    None,
    /// Entries were redistributed between the node and a sibling
    Redistribute,
    /// The node and a sibling were merged into `survivor`
    Merge { survivor: NodeId },
    /// A merge consumed the last separator of the root; `survivor` is the
    /// new root
    EmptyRoot { survivor: NodeId },
}

/// Position of a child below its parent internal node
enum ChildSlot {
    Leftmost,
    Entry(usize),
}

/// An order-`m` B+tree over fixed-size keys and variable-size values.
///
/// The order bounds node populations: a non-root node holds between `m`
/// and `2m` entries, the root between 1 and `2m` (0 only for an empty
/// tree). A node exceeding `2m` is full and gets split; a node below `m`
/// is poor and gets redistributed or merged.
pub struct BPlusTree {
    order: usize,
    nodes: Vec<Option<Node>>,
    free_slots: Vec<usize>,
    root: Option<NodeId>,
    len: usize,
}

impl BPlusTree {
    /// Create an empty tree of the given order
    pub fn new(order: usize) -> Result<Self> {
        if order < MIN_ORDER {
            return Err(StorageError::invalid_argument(format!(
                "expect order of at least {}, but got {}",
                MIN_ORDER, order
            )));
        }

        Ok(Self {
            order,
            nodes: Vec::new(),
            free_slots: Vec::new(),
            root: None,
            len: 0,
        })
    }

    /// Amount of records in the tree
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no records
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert the given key/value pair, overwriting any pre-existing value
    /// with the same key
    pub fn insert(&mut self, key: SearchKey, value: Vec<u8>) -> InsertType {
        let Some(root) = self.root else {
            let leaf = self.alloc(Node::Leaf(LeafNode {
                parent: None,
                previous: None,
                next: None,
                records: vec![TreeRecord { key, value }],
            }));
            self.root = Some(leaf);
            self.len = 1;
            return InsertType::Insert;
        };

        let leaf_id = self.find_leaf(root, &key);
        let leaf = self.leaf_mut(leaf_id);
        let insert_type = match binary_search(&leaf.records, &key, |r| &r.key) {
            Some(index) => {
                leaf.records[index].value = value;
                InsertType::Upsert
            }
            None => {
                let position = leaf.records.partition_point(|r| r.key < key);
                leaf.records.insert(position, TreeRecord { key, value });
                self.len += 1;
                InsertType::Insert
            }
        };

        let mut id = leaf_id;
        while self.is_full(id) {
            self.split(id);
            match self.node(id).parent() {
                Some(parent) => id = parent,
                None => break,
            }
        }

        insert_type
    }

    /// Remove the record with the given key and return its value, or
    /// `None` if no such record exists
    pub fn remove(&mut self, key: &SearchKey) -> Option<Vec<u8>> {
        let root = self.root?;
        let (remembered, leaf_id) = self.find_nodes(root, key);

        let leaf = self.leaf_mut(leaf_id);
        let index = binary_search(&leaf.records, key, |r| &r.key)?;
        let removed = leaf.records.remove(index).value;
        self.len -= 1;

        let mut current = Some(leaf_id);
        while let Some(id) = current {
            let parent = self.node(id).parent();

            // The removed key may survive as a separator in the remembered
            // ancestor. Repair it once the walk is at that ancestor's
            // direct child, before rebalancing that child.
            if remembered.is_some() && parent == remembered {
                self.repair_separator(remembered.unwrap(), key);
            }

            let mut next = parent;
            if self.is_poor(id) {
                match self.rearrange(id) {
                    Rearrangement::EmptyRoot { survivor } => {
                        let old_root = self.root.expect("a non-empty tree has a root");
                        self.free(old_root);
                        self.node_mut(survivor).set_parent(None);
                        self.root = Some(survivor);
                        next = None;
                    }
                    Rearrangement::Merge { survivor } => {
                        debug_assert!(
                            self.node(survivor).parent().is_some(),
                            "merge below the root keeps the survivor parented"
                        );
                    }
                    Rearrangement::Redistribute | Rearrangement::None => {}
                }
            }

            current = next;
        }

        // A root leaf drained of its last record leaves an empty tree.
        if let Some(root) = self.root {
            if self.node(root).is_leaf() && self.node(root).population() == 0 {
                self.free(root);
                self.root = None;
            }
        }

        Some(removed)
    }

    /// Look up the value stored under the given key
    pub fn get(&self, key: &SearchKey) -> Option<&[u8]> {
        let root = self.root?;
        let leaf = self.node(self.find_leaf(root, key)).as_leaf();
        binary_search(&leaf.records, key, |r| &r.key).map(|i| leaf.records[i].value.as_slice())
    }

    /// Write a textual representation of this tree: one line per level,
    /// nodes separated by spaces, leaf keys suffixed with `*`
    pub fn write(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let Some(root) = self.root else {
            return Ok(());
        };

        let mut level = vec![root];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for (position, &id) in level.iter().enumerate() {
                if position > 0 {
                    out.write_char(' ')?;
                }
                out.write_char('[')?;
                match self.node(id) {
                    Node::Internal(node) => {
                        for (i, entry) in node.entries.iter().enumerate() {
                            if i > 0 {
                                out.write_char(' ')?;
                            }
                            write!(out, "{}", key_suffix(&entry.key))?;
                        }
                        next_level.push(node.leftmost);
                        next_level.extend(node.entries.iter().map(|e| e.right));
                    }
                    Node::Leaf(leaf) => {
                        for (i, record) in leaf.records.iter().enumerate() {
                            if i > 0 {
                                out.write_char(' ')?;
                            }
                            write!(out, "{}*", key_suffix(&record.key))?;
                        }
                    }
                }
                out.write_char(']')?;
            }
            out.write_char('\n')?;
            level = next_level;
        }

        Ok(())
    }


    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn free(&mut self, id: NodeId) {
        self.nodes[id.0] = None;
        self.free_slots.push(id.0);
    }

    /// Take a node out of the arena, releasing its slot
    fn detach(&mut self, id: NodeId) -> Node {
        let node = self.nodes[id.0].take().expect("node is allocated");
        self.free_slots.push(id.0);
        node
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0].as_ref().expect("node is allocated")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0].as_mut().expect("node is allocated")
    }

    fn internal(&self, id: NodeId) -> &InternalNode {
        self.node(id).as_internal()
    }

    fn internal_mut(&mut self, id: NodeId) -> &mut InternalNode {
        self.node_mut(id).as_internal_mut()
    }

    fn leaf(&self, id: NodeId) -> &LeafNode {
        self.node(id).as_leaf()
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut LeafNode {
        self.node_mut(id).as_leaf_mut()
    }


    fn is_root(&self, id: NodeId) -> bool {
        self.node(id).parent().is_none()
    }

    fn is_full(&self, id: NodeId) -> bool {
        self.node(id).population() > self.order * 2
    }

    fn is_poor(&self, id: NodeId) -> bool {
        let population = self.node(id).population();
        if self.is_root(id) {
            population == 0
        } else {
            population < self.order
        }
    }

    fn is_rich(&self, id: NodeId) -> bool {
        let population = self.node(id).population();
        if self.is_root(id) {
            population > 1
        } else {
            population > self.order
        }
    }


    fn descend(&self, node: &InternalNode, key: &SearchKey) -> NodeId {
        if key < &node.entries[0].key {
            node.leftmost
        } else {
            let index = greatest_not_exceeding(&node.entries, key, |e| &e.key)
                .expect("key is not smaller than the smallest entry");
            node.entries[index].right
        }
    }

    /// Find the leaf whose key range contains `key`. The leaf may or may
    /// not actually contain the key.
    fn find_leaf(&self, from: NodeId, key: &SearchKey) -> NodeId {
        let mut current = from;
        loop {
            match self.node(current) {
                Node::Internal(node) => current = self.descend(node, key),
                Node::Leaf(_) => return current,
            }
        }
    }

    /// Find the first internal node on the descent containing `key` (if
    /// any) and the leaf whose key range contains `key`
    fn find_nodes(&self, from: NodeId, key: &SearchKey) -> (Option<NodeId>, NodeId) {
        let mut remembered = None;
        let mut current = from;
        loop {
            match self.node(current) {
                Node::Internal(node) => {
                    if remembered.is_none()
                        && binary_search(&node.entries, key, |e| &e.key).is_some()
                    {
                        remembered = Some(current);
                    }
                    current = self.descend(node, key);
                }
                Node::Leaf(_) => return (remembered, current),
            }
        }
    }


    fn split(&mut self, id: NodeId) {
        if self.node(id).is_leaf() {
            self.split_leaf(id);
        } else {
            self.split_internal(id);
        }
    }

    /// Split a full leaf at the middle. The new right sibling keeps the
    /// larger half, and its smallest key is copied up into the parent.
    fn split_leaf(&mut self, id: NodeId) {
        let (sibling_records, parent, old_next) = {
            let leaf = self.leaf_mut(id);
            let middle = leaf.records.len() / 2;
            (leaf.records.split_off(middle), leaf.parent, leaf.next)
        };
        let separator = sibling_records[0].key;

        let sibling = self.alloc(Node::Leaf(LeafNode {
            parent,
            previous: Some(id),
            next: old_next,
            records: sibling_records,
        }));
        if let Some(next) = old_next {
            self.leaf_mut(next).previous = Some(sibling);
        }
        self.leaf_mut(id).next = Some(sibling);

        self.promote(id, separator, sibling);
    }

    /// Split a full internal node at the middle. The middle key is pushed
    /// up into the parent (moved, not copied); its right child becomes the
    /// leftmost child of the new sibling.
    fn split_internal(&mut self, id: NodeId) {
        let (middle, sibling_entries, parent) = {
            let node = self.internal_mut(id);
            let middle_index = node.entries.len() / 2;
            let mut tail = node.entries.split_off(middle_index);
            let middle = tail.remove(0);
            (middle, tail, node.parent)
        };

        let moved_children: Vec<NodeId> = std::iter::once(middle.right)
            .chain(sibling_entries.iter().map(|e| e.right))
            .collect();
        let sibling = self.alloc(Node::Internal(InternalNode {
            parent,
            leftmost: middle.right,
            entries: sibling_entries,
        }));
        for child in moved_children {
            self.node_mut(child).set_parent(Some(sibling));
        }

        self.promote(id, middle.key, sibling);
    }

    /// Insert a separator produced by a split into the parent of `left`,
    /// creating a new root when the split node was the root
    fn promote(&mut self, left: NodeId, key: SearchKey, right: NodeId) {
        match self.node(left).parent() {
            Some(parent) => {
                let entries = &mut self.internal_mut(parent).entries;
                let position = entries.partition_point(|e| e.key < key);
                entries.insert(position, TreeEntry { key, right });
                self.node_mut(right).set_parent(Some(parent));
            }
            None => {
                let root = self.alloc(Node::Internal(InternalNode {
                    parent: None,
                    leftmost: left,
                    entries: vec![TreeEntry { key, right }],
                }));
                self.node_mut(left).set_parent(Some(root));
                self.node_mut(right).set_parent(Some(root));
                self.root = Some(root);
            }
        }
    }


    fn rearrange(&mut self, id: NodeId) -> Rearrangement {
        if self.redistribute(id) {
            return Rearrangement::Redistribute;
        }
        self.merge(id)
    }

    fn redistribute(&mut self, id: NodeId) -> bool {
        if self.node(id).is_leaf() {
            self.redistribute_leaf(id)
        } else {
            self.redistribute_internal(id)
        }
    }

    /// Borrow a record from a rich sibling sharing the same parent,
    /// preferring the right sibling
    fn redistribute_leaf(&mut self, id: NodeId) -> bool {
        let parent = match self.node(id).parent() {
            Some(parent) => parent,
            None => return false,
        };

        if let Some(right) = self.right_sibling(parent, id) {
            // The borrow consumes two records off the right sibling and
            // keeps the latter; the sibling must stay at order afterwards.
            if self.leaf(right).records.len() >= self.order + 2 {
                self.leaf_mut(right).records.remove(0);
                self.len -= 1;
                let taken = self.leaf_mut(right).records.remove(0);
                self.leaf_mut(id).records.push(taken);

                let separator = self.leaf(right).records[0].key;
                self.replace_separator(parent, right, separator);
                return true;
            }
        }

        if let Some(left) = self.left_sibling(parent, id) {
            if self.is_rich(left) {
                let taken = self
                    .leaf_mut(left)
                    .records
                    .pop()
                    .expect("a rich leaf has records");
                self.leaf_mut(id).records.insert(0, taken);

                let separator = self.leaf(id).records[0].key;
                self.replace_separator(parent, id, separator);
                return true;
            }
        }

        false
    }

    /// Rotate an entry in from a rich sibling through the separator in the
    /// common parent, preferring the right sibling
    fn redistribute_internal(&mut self, id: NodeId) -> bool {
        let parent = match self.node(id).parent() {
            Some(parent) => parent,
            None => return false,
        };

        if let Some(right) = self.right_sibling(parent, id) {
            if self.is_rich(right) {
                let separator_index = self.separator_index(parent, right);
                let separator_key = self.internal(parent).entries[separator_index].key;

                let (moved_child, first) = {
                    let sibling = self.internal_mut(right);
                    let moved_child = sibling.leftmost;
                    let first = sibling.entries.remove(0);
                    sibling.leftmost = first.right;
                    (moved_child, first)
                };
                self.internal_mut(id).entries.push(TreeEntry {
                    key: separator_key,
                    right: moved_child,
                });
                self.node_mut(moved_child).set_parent(Some(id));
                self.internal_mut(parent).entries[separator_index].key = first.key;
                return true;
            }
        }

        if let Some(left) = self.left_sibling(parent, id) {
            if self.is_rich(left) {
                let separator_index = self.separator_index(parent, id);
                let separator_key = self.internal(parent).entries[separator_index].key;

                let last = self
                    .internal_mut(left)
                    .entries
                    .pop()
                    .expect("a rich internal node has entries");
                let node = self.internal_mut(id);
                let old_leftmost = node.leftmost;
                node.entries.insert(
                    0,
                    TreeEntry {
                        key: separator_key,
                        right: old_leftmost,
                    },
                );
                node.leftmost = last.right;
                self.node_mut(last.right).set_parent(Some(id));
                self.internal_mut(parent).entries[separator_index].key = last.key;
                return true;
            }
        }

        false
    }

    /// Merge with a sibling sharing the same parent. The left sibling is
    /// preferred as the merge target, so the largest node merges into the
    /// smallest and records are appended instead of prepended.
    fn merge(&mut self, id: NodeId) -> Rearrangement {
        let parent = match self.node(id).parent() {
            Some(parent) => parent,
            None => return Rearrangement::None,
        };

        let (survivor, absorbed) = match self.left_sibling(parent, id) {
            Some(left) if self.mergeable(left, id) => (left, id),
            _ => match self.right_sibling(parent, id) {
                Some(right) if self.mergeable(id, right) => (id, right),
                _ => return Rearrangement::None,
            },
        };

        let separator_index = self.separator_index(parent, absorbed);

        if self.node(survivor).is_leaf() {
            let absorbed_leaf = match self.detach(absorbed) {
                Node::Leaf(leaf) => leaf,
                Node::Internal(_) => unreachable!("leaf siblings are leaves"),
            };
            let survivor_leaf = self.leaf_mut(survivor);
            survivor_leaf.records.extend(absorbed_leaf.records);
            survivor_leaf.next = absorbed_leaf.next;
            if let Some(next) = absorbed_leaf.next {
                self.leaf_mut(next).previous = Some(survivor);
            }
        } else {
            let separator_key = self.internal(parent).entries[separator_index].key;
            let absorbed_node = match self.detach(absorbed) {
                Node::Internal(node) => node,
                Node::Leaf(_) => unreachable!("internal siblings are internal"),
            };

            let moved_children: Vec<NodeId> = std::iter::once(absorbed_node.leftmost)
                .chain(absorbed_node.entries.iter().map(|e| e.right))
                .collect();
            let survivor_node = self.internal_mut(survivor);
            survivor_node.entries.push(TreeEntry {
                key: separator_key,
                right: absorbed_node.leftmost,
            });
            survivor_node.entries.extend(absorbed_node.entries);
            for child in moved_children {
                self.node_mut(child).set_parent(Some(survivor));
            }
        }

        self.internal_mut(parent).entries.remove(separator_index);

        if self.is_root(parent) && self.internal(parent).entries.is_empty() {
            Rearrangement::EmptyRoot { survivor }
        } else {
            Rearrangement::Merge { survivor }
        }
    }

    /// Whether the populations of two adjacent siblings fit in one node
    fn mergeable(&self, left: NodeId, right: NodeId) -> bool {
        let combined = self.node(left).population() + self.node(right).population();
        if self.node(left).is_leaf() {
            combined <= self.order * 2
        } else {
            // An internal merge pulls the separator down as an extra entry.
            combined + 1 <= self.order * 2
        }
    }


    fn child_slot(&self, parent: NodeId, child: NodeId) -> ChildSlot {
        let node = self.internal(parent);
        if node.leftmost == child {
            return ChildSlot::Leftmost;
        }
        let index = node
            .entries
            .iter()
            .position(|e| e.right == child)
            .expect("child is linked from its parent");
        ChildSlot::Entry(index)
    }

    /// The sibling directly left of `id` under the same parent, if any
    fn left_sibling(&self, parent: NodeId, id: NodeId) -> Option<NodeId> {
        match self.node(id) {
            Node::Leaf(leaf) => leaf
                .previous
                .filter(|&previous| self.node(previous).parent() == Some(parent)),
            Node::Internal(_) => match self.child_slot(parent, id) {
                ChildSlot::Leftmost => None,
                ChildSlot::Entry(0) => Some(self.internal(parent).leftmost),
                ChildSlot::Entry(index) => Some(self.internal(parent).entries[index - 1].right),
            },
        }
    }

    /// The sibling directly right of `id` under the same parent, if any
    fn right_sibling(&self, parent: NodeId, id: NodeId) -> Option<NodeId> {
        match self.node(id) {
            Node::Leaf(leaf) => leaf
                .next
                .filter(|&next| self.node(next).parent() == Some(parent)),
            Node::Internal(_) => {
                let index = match self.child_slot(parent, id) {
                    ChildSlot::Leftmost => 0,
                    ChildSlot::Entry(index) => index + 1,
                };
                self.internal(parent).entries.get(index).map(|e| e.right)
            }
        }
    }

    /// Index of the parent entry whose right child is `child`
    fn separator_index(&self, parent: NodeId, child: NodeId) -> usize {
        self.internal(parent)
            .entries
            .iter()
            .position(|e| e.right == child)
            .expect("child is linked from a parent entry")
    }

    /// Replace the key of the parent entry pointing at `child`
    fn replace_separator(&mut self, parent: NodeId, child: NodeId, key: SearchKey) {
        let index = self.separator_index(parent, child);
        self.internal_mut(parent).entries[index].key = key;
    }

    /// Replace a separator equal to the removed key with the smallest key
    /// of its right subtree
    fn repair_separator(&mut self, internal_id: NodeId, key: &SearchKey) {
        let index = match binary_search(&self.internal(internal_id).entries, key, |e| &e.key) {
            Some(index) => index,
            None => return,
        };
        let right = self.internal(internal_id).entries[index].right;
        let replacement = self.smallest_key_under(right);
        self.internal_mut(internal_id).entries[index].key = replacement;
    }

    /// The smallest record key in the subtree rooted at `id`
    fn smallest_key_under(&self, id: NodeId) -> SearchKey {
        let mut current = id;
        loop {
            match self.node(current) {
                Node::Internal(node) => current = node.leftmost,
                Node::Leaf(leaf) => return leaf.records[0].key,
            }
        }
    }
}

/// The least significant half of a key, interpreted big-endian, as used by
/// the textual tree dump
fn key_suffix(key: &SearchKey) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[KEY_SIZE - 8..]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(last: u8) -> SearchKey {
        let mut key: SearchKey = [0; KEY_SIZE];
        key[0] = 57;
        key[1] = 5;
        key[KEY_SIZE - 1] = last;
        key
    }

    fn value(last: u8) -> Vec<u8> {
        vec![1, 3, 3, last]
    }

    fn tree_with(keys: &[u8]) -> BPlusTree {
        let mut tree = BPlusTree::new(MIN_ORDER).unwrap();
        for &k in keys {
            assert_eq!(tree.insert(key(k), value(k)), InsertType::Insert);
        }
        tree
    }

    fn dump(tree: &BPlusTree) -> String {
        let mut out = String::new();
        tree.write(&mut out).unwrap();
        out
    }

    /// The setup tree shared by the redistribution and merger scenarios
    fn scenario_tree() -> BPlusTree {
        let tree = tree_with(&[
            2, 5, 12, 13, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 29,
        ]);
        assert_eq!(
            dump(&tree),
            "[17]\n\
             [12 15] [19 21 23 25]\n\
             [2* 5*] [12* 13*] [15* 16*] [17* 18*] [19* 20*] [21* 22*] [23* 24*] [25* 26* 27* 29*]\n"
        );
        tree
    }

    /// Walk the whole tree checking key order, population bounds, parent
    /// links, separator bounds and uniform leaf depth
    fn assert_invariants(tree: &BPlusTree) {
        let Some(root) = tree.root else {
            assert_eq!(tree.len(), 0);
            return;
        };

        let mut leaf_depth = None;
        let mut record_count = 0;
        check_subtree(
            tree,
            root,
            None,
            None,
            None,
            0,
            &mut leaf_depth,
            &mut record_count,
        );
        assert_eq!(record_count, tree.len());

        // The leaf list yields all keys in ascending order.
        let mut current = leftmost_leaf(tree, root);
        let mut previous_key: Option<SearchKey> = None;
        let mut chained = 0;
        while let Some(id) = current {
            let leaf = tree.leaf(id);
            for record in &leaf.records {
                if let Some(previous) = previous_key {
                    assert!(previous < record.key, "leaf list out of order");
                }
                previous_key = Some(record.key);
                chained += 1;
            }
            if let Some(next) = leaf.next {
                assert_eq!(tree.leaf(next).previous, Some(id), "broken leaf back link");
            }
            current = leaf.next;
        }
        assert_eq!(chained, tree.len(), "leaf list misses records");
    }

    fn leftmost_leaf(tree: &BPlusTree, from: NodeId) -> Option<NodeId> {
        let mut current = from;
        loop {
            match tree.node(current) {
                Node::Internal(node) => current = node.leftmost,
                Node::Leaf(_) => return Some(current),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_subtree(
        tree: &BPlusTree,
        id: NodeId,
        parent: Option<NodeId>,
        lower: Option<SearchKey>,
        upper: Option<SearchKey>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        record_count: &mut usize,
    ) {
        let node = tree.node(id);
        assert_eq!(node.parent(), parent, "wrong parent link");

        let population = node.population();
        if parent.is_none() {
            assert!(population >= 1 && population <= tree.order * 2);
        } else {
            assert!(
                population >= tree.order && population <= tree.order * 2,
                "population {} outside [{}, {}]",
                population,
                tree.order,
                tree.order * 2
            );
        }

        let in_bounds = |key: &SearchKey| {
            if let Some(lower) = &lower {
                assert!(key >= lower, "key below subtree lower bound");
            }
            if let Some(upper) = &upper {
                assert!(key < upper, "key at or above subtree upper bound");
            }
        };

        match node {
            Node::Internal(internal) => {
                for window in internal.entries.windows(2) {
                    assert!(window[0].key < window[1].key, "entries out of order");
                }
                for entry in &internal.entries {
                    in_bounds(&entry.key);
                }

                let first = internal.entries[0].key;
                check_subtree(
                    tree,
                    internal.leftmost,
                    Some(id),
                    lower,
                    Some(first),
                    depth + 1,
                    leaf_depth,
                    record_count,
                );
                for (i, entry) in internal.entries.iter().enumerate() {
                    let next_upper = internal.entries.get(i + 1).map(|e| e.key).or(upper);
                    check_subtree(
                        tree,
                        entry.right,
                        Some(id),
                        Some(entry.key),
                        next_upper,
                        depth + 1,
                        leaf_depth,
                        record_count,
                    );
                }
            }
            Node::Leaf(leaf) => {
                for window in leaf.records.windows(2) {
                    assert!(window[0].key < window[1].key, "records out of order");
                }
                for record in &leaf.records {
                    in_bounds(&record.key);
                }
                match leaf_depth {
                    Some(expected) => assert_eq!(*expected, depth, "leaves at unequal depth"),
                    None => *leaf_depth = Some(depth),
                }
                *record_count += leaf.records.len();
            }
        }
    }

    #[test]
    fn test_order_bound() {
        assert!(BPlusTree::new(0).is_err());
        assert!(BPlusTree::new(1).is_err());
        assert!(BPlusTree::new(2).is_ok());
    }

    #[test]
    fn test_upsert() {
        let mut tree = BPlusTree::new(MIN_ORDER).unwrap();
        assert_eq!(tree.insert(key(57), vec![1, 3, 3, 7]), InsertType::Insert);
        assert_eq!(tree.insert(key(57), vec![1, 3, 3, 8]), InsertType::Upsert);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&key(57)), Some(&[1, 3, 3, 8][..]));
    }

    #[test]
    fn test_splitting_creates_root() {
        let tree = tree_with(&[0, 1, 2, 3, 4]);
        assert_eq!(dump(&tree), "[2]\n[0* 1*] [2* 3* 4*]\n");
        assert_invariants(&tree);
    }

    #[test]
    fn test_redistribution_on_remove() {
        let mut tree = scenario_tree();

        let removed = tree.remove(&key(24));
        assert_eq!(removed, Some(value(24)));

        assert_eq!(
            dump(&tree),
            "[17]\n\
             [12 15] [19 21 23 27]\n\
             [2* 5*] [12* 13*] [15* 16*] [17* 18*] [19* 20*] [21* 22*] [23* 26*] [27* 29*]\n"
        );
    }

    #[test]
    fn test_merger_prefers_left_sibling() {
        let mut tree = scenario_tree();

        let removed = tree.remove(&key(20));
        assert_eq!(removed, Some(value(20)));

        assert_eq!(
            dump(&tree),
            "[17]\n\
             [12 15] [21 23 25]\n\
             [2* 5*] [12* 13*] [15* 16*] [17* 18* 19*] [21* 22*] [23* 24*] [25* 26* 27* 29*]\n"
        );
        assert_invariants(&tree);
    }

    #[test]
    fn test_remove_missing_key() {
        let mut tree = tree_with(&[0, 1, 2, 3, 4]);
        assert_eq!(tree.remove(&key(9)), None);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_remove_from_empty_tree() {
        let mut tree = BPlusTree::new(MIN_ORDER).unwrap();
        assert_eq!(tree.remove(&key(1)), None);
    }

    #[test]
    fn test_root_collapse_decreases_height() {
        let mut tree = tree_with(&[0, 1, 2, 3, 4]);

        assert_eq!(tree.remove(&key(4)), Some(value(4)));
        assert_eq!(tree.remove(&key(3)), Some(value(3)));

        // The poor leaf merges with its left sibling, emptying the root.
        assert_eq!(dump(&tree), "[0* 1* 2*]\n");
        assert_invariants(&tree);
    }

    #[test]
    fn test_remove_until_empty() {
        let mut tree = tree_with(&[0, 1, 2, 3, 4]);
        for k in 0..5 {
            assert_eq!(tree.remove(&key(k)), Some(value(k)));
            assert_invariants(&tree);
        }

        assert!(tree.is_empty());
        assert_eq!(dump(&tree), "");
        assert_eq!(tree.get(&key(0)), None);
    }

    #[test]
    fn test_remove_key_that_is_a_separator() {
        let mut tree = scenario_tree();

        // 17 lives in the root and in a leaf.
        assert_eq!(tree.remove(&key(17)), Some(value(17)));
        assert_eq!(tree.get(&key(17)), None);
        assert_invariants(&tree);

        for k in [2, 5, 12, 13, 15, 16, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 29] {
            assert_eq!(tree.get(&key(k)), Some(value(k).as_slice()), "key {}", k);
        }
    }

    #[test]
    fn test_ascending_inserts_stay_balanced() {
        let mut tree = BPlusTree::new(MIN_ORDER).unwrap();
        for k in 0..120 {
            tree.insert(key(k), value(k));
            assert_invariants(&tree);
        }

        for k in 0..120 {
            assert_eq!(tree.get(&key(k)), Some(value(k).as_slice()));
        }
    }

    #[test]
    fn test_shuffled_inserts_and_descending_removes() {
        let mut tree = BPlusTree::new(MIN_ORDER).unwrap();

        // A fixed shuffle keeps the test deterministic while exercising
        // splits at many positions.
        let keys: Vec<u8> = (0..200u32).map(|i| ((i * 83 + 17) % 251) as u8).collect();
        for &k in &keys {
            tree.insert(key(k), value(k));
            assert_invariants(&tree);
        }

        // Removing the largest key first keeps every rebalance on the
        // rightmost nodes, so the walk goes through left-sibling borrows
        // and merges at both the leaf and the internal level.
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        while let Some(k) = sorted.pop() {
            assert_eq!(tree.remove(&key(k)), Some(value(k)), "remove {}", k);
            assert_invariants(&tree);
            if let Some(&smallest) = sorted.first() {
                assert_eq!(tree.get(&key(smallest)), Some(value(smallest).as_slice()));
            }
        }

        assert!(tree.is_empty());
    }

    #[test]
    fn test_larger_order() {
        let mut tree = BPlusTree::new(4).unwrap();
        for k in (0..=255).rev() {
            tree.insert(key(k), value(k));
        }
        assert_invariants(&tree);
        assert_eq!(tree.len(), 256);

        for k in 0..=255 {
            assert_eq!(tree.remove(&key(k)), Some(value(k)));
            assert_invariants(&tree);
        }
        assert!(tree.is_empty());
    }
}
