//! Internal node page.

use crate::bits;
use crate::btree::search::greatest_not_exceeding;
use crate::bytes::Bytes;
use crate::error::{Result, StorageError};
use crate::page::Page;
use crate::types::{
    max_internal_entries, PageNumber, SearchKey, INTERNAL_NODE_ENTRY_SIZE,
    INTERNAL_NODE_HEADER_SIZE, KEY_SIZE,
};

/// Magic identifying an internal node page: "IP"
const INTERNAL_NODE_MAGIC: u16 = 0x5049;

const MAGIC_OFFSET: usize = 0;
const ENTRY_COUNT_OFFSET: usize = 2;
const LEFTMOST_CHILD_OFFSET: usize = 3;
const ENTRY_LIST_OFFSET: usize = INTERNAL_NODE_HEADER_SIZE;

/// A separator key and the page number of the child holding the equal-
/// and greater keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEntry {
    pub key: SearchKey,
    pub right_child: PageNumber,
}

/// A serialized internal b+tree node.
///
/// Layout:
/// ```text
/// Offset  Size  Description
/// 0       2     Magic "IP" (u16 LE)
/// 2       1     Entry count (u8)
/// 3       4     Leftmost child page (u32 LE)
/// 7       17    Reserved, zero
/// 24      20×n  Entries: key[16] + right child page (u32 LE)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    page_size: u16,
    leftmost_child: PageNumber,
    entries: Vec<NodeEntry>,
}

/// The entry capacity of an internal node page. The serialized count is a
/// single byte, so the derived capacity is capped at 255.
fn entry_capacity(page_size: u16) -> usize {
    max_internal_entries(page_size).min(u8::MAX as u16) as usize
}

impl InternalNode {
    /// Create a new builder for the given page size
    pub fn builder(page_size: u16) -> InternalNodeBuilder {
        InternalNodeBuilder {
            page_size,
            leftmost_child: PageNumber::NULL,
            entries: Vec::new(),
        }
    }

    /// Create a builder derived from an existing node
    pub fn builder_from(base: &InternalNode) -> InternalNodeBuilder {
        InternalNodeBuilder {
            page_size: base.page_size,
            leftmost_child: base.leftmost_child,
            entries: base.entries.clone(),
        }
    }

    /// The amount of entries in this node
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// The page number of the leftmost child, holding the keys smaller
    /// than all entries. The null page means there is no such child.
    pub fn leftmost_child(&self) -> PageNumber {
        self.leftmost_child
    }

    /// The entry at the given position
    pub fn entry_at(&self, position: usize) -> Option<&NodeEntry> {
        self.entries.get(position)
    }

    /// All entries in key order
    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    /// The entry with the greatest key not exceeding `key`, or `None` if
    /// `key` is smaller than all entries
    pub fn greatest_not_exceeding(&self, key: &SearchKey) -> Option<&NodeEntry> {
        greatest_not_exceeding(&self.entries, key, |e| &e.key).map(|index| &self.entries[index])
    }
}

impl Page for InternalNode {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let page_size = u16::try_from(bytes.len())
            .map_err(|_| StorageError::invalid_format("page too large"))?;

        if bits::read_le_u16(bytes, MAGIC_OFFSET)? != INTERNAL_NODE_MAGIC {
            return Err(StorageError::invalid_format("invalid internal node magic"));
        }

        let entry_count = bits::read_u8(bytes, ENTRY_COUNT_OFFSET)? as usize;
        if entry_count > entry_capacity(page_size) {
            return Err(StorageError::invalid_format(
                "internal node entry count exceeds capacity",
            ));
        }

        let mut entries = Vec::with_capacity(entry_count);
        for slot in 0..entry_count {
            let offset = ENTRY_LIST_OFFSET + slot * INTERNAL_NODE_ENTRY_SIZE;
            let mut key: SearchKey = [0; KEY_SIZE];
            match bytes.get(offset..offset + KEY_SIZE) {
                Some(src) => key.copy_from_slice(src),
                None => return Err(StorageError::out_of_range(offset, KEY_SIZE, bytes.len())),
            }
            entries.push(NodeEntry {
                key,
                right_child: PageNumber::new(bits::read_le_u32(bytes, offset + KEY_SIZE)?),
            });
        }

        Ok(Self {
            page_size,
            leftmost_child: PageNumber::new(bits::read_le_u32(bytes, LEFTMOST_CHILD_OFFSET)?),
            entries,
        })
    }

    fn to_bytes(&self) -> Result<Bytes> {
        let mut bytes = Bytes::new(self.page_size as usize);

        bits::write_le_u16(&mut bytes, MAGIC_OFFSET, INTERNAL_NODE_MAGIC)?;
        bits::write_u8(&mut bytes, ENTRY_COUNT_OFFSET, self.entries.len() as u8)?;
        bits::write_le_u32(&mut bytes, LEFTMOST_CHILD_OFFSET, self.leftmost_child.value())?;

        for (slot, entry) in self.entries.iter().enumerate() {
            let offset = ENTRY_LIST_OFFSET + slot * INTERNAL_NODE_ENTRY_SIZE;
            bytes.copy_from(offset, &entry.key)?;
            bits::write_le_u32(&mut bytes, offset + KEY_SIZE, entry.right_child.value())?;
        }

        Ok(bytes)
    }
}

/// Builder for [`InternalNode`] instances
#[derive(Debug)]
pub struct InternalNodeBuilder {
    page_size: u16,
    leftmost_child: PageNumber,
    entries: Vec<NodeEntry>,
}

impl InternalNodeBuilder {
    /// Whether the node-to-be contains the maximum amount of entries
    pub fn is_full(&self) -> bool {
        self.entries.len() >= entry_capacity(self.page_size)
    }

    /// Set the leftmost child page
    pub fn with_leftmost_child(mut self, page_number: PageNumber) -> Self {
        self.leftmost_child = page_number;
        self
    }

    /// Append an entry. Appending to a full node fails.
    pub fn with_entry(mut self, key: SearchKey, right_child: PageNumber) -> Result<Self> {
        if self.is_full() {
            return Err(StorageError::overflow("cannot add entry: node is full"));
        }

        self.entries.push(NodeEntry { key, right_child });
        Ok(self)
    }

    /// Overwrite the entry at `slot`, or append when the slot is one past
    /// the current entries
    pub fn with_entry_at(
        mut self,
        key: SearchKey,
        right_child: PageNumber,
        slot: usize,
    ) -> Result<Self> {
        if slot < self.entries.len() {
            self.entries[slot] = NodeEntry { key, right_child };
            return Ok(self);
        }

        self.with_entry(key, right_child)
    }

    /// Create the node
    pub fn build(self) -> InternalNode {
        InternalNode {
            page_size: self.page_size,
            leftmost_child: self.leftmost_child,
            entries: self.entries,
        }
    }
}
