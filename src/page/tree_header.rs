//! Tree header page.
//!
//! A tree header carries the metadata required to locate and operate on a
//! table- or index tree: its type, the derived node capacities (stored
//! redundantly and validated on parse), the root page and the amount of
//! pages the tree occupies.

use crate::bits;
use crate::bytes::Bytes;
use crate::error::{Result, StorageError};
use crate::page::Page;
use crate::types::{max_internal_entries, max_leaf_records, PageNumber, TreeType};

const TYPE_MAGIC_OFFSET: usize = 0;
const MAX_ENTRIES_OFFSET: usize = 2;
const MAX_RECORDS_OFFSET: usize = 4;
const ROOT_PAGE_OFFSET: usize = 6;
const PAGE_COUNT_OFFSET: usize = 10;

/// Header page of a single b+tree within the database file.
///
/// Layout (zero-padded to the page size):
/// ```text
/// Offset  Size  Description
/// 0       2     Type magic: 'TT' table, 'TI' index (u16 LE)
/// 2       2     Max internal node entries (u16 LE, derived)
/// 4       2     Max leaf node records (u16 LE, derived)
/// 6       4     Root page (u32 LE)
/// 10      4     Page count (u32 LE)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    page_size: u16,
    tree_type: TreeType,
    max_internal_entries: u16,
    max_leaf_records: u16,
    root: PageNumber,
    page_count: u32,
}

impl TreeHeader {
    /// Create a new builder for the given page size
    pub fn builder(page_size: u16) -> TreeHeaderBuilder {
        TreeHeaderBuilder {
            page_size,
            tree_type: None,
            root: PageNumber::NULL,
            page_count: 0,
        }
    }

    /// Create a builder derived from an existing header
    pub fn builder_from(base: &TreeHeader) -> TreeHeaderBuilder {
        TreeHeaderBuilder {
            page_size: base.page_size,
            tree_type: Some(base.tree_type),
            root: base.root,
            page_count: base.page_count,
        }
    }

    /// The type of b+tree this is the header of
    pub fn tree_type(&self) -> TreeType {
        self.tree_type
    }

    /// The maximum amount of entries in internal nodes of this tree.
    /// With default values this is `(4096 - 24) / 20 = 203`.
    pub fn max_internal_entries(&self) -> u16 {
        self.max_internal_entries
    }

    /// The maximum amount of records in leaf nodes of this tree.
    /// With default values this is `(4096 - 24) / 24 = 169`.
    pub fn max_leaf_records(&self) -> u16 {
        self.max_leaf_records
    }

    /// The page number of the root node, or the null page for an empty
    /// tree
    pub fn root(&self) -> PageNumber {
        self.root
    }

    /// The amount of pages in use by this tree
    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

impl Page for TreeHeader {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let page_size = u16::try_from(bytes.len())
            .map_err(|_| StorageError::invalid_format("page too large"))?;

        let magic = bits::read_le_u16(bytes, TYPE_MAGIC_OFFSET)?;
        let tree_type = TreeType::from_magic(magic)
            .ok_or_else(|| StorageError::invalid_format("invalid tree header type magic"))?;

        let stored_entries = bits::read_le_u16(bytes, MAX_ENTRIES_OFFSET)?;
        if stored_entries != max_internal_entries(page_size) {
            return Err(StorageError::invalid_format(
                "unsupported max internal node entries",
            ));
        }

        let stored_records = bits::read_le_u16(bytes, MAX_RECORDS_OFFSET)?;
        if stored_records != max_leaf_records(page_size) {
            return Err(StorageError::invalid_format(
                "unsupported max leaf node records",
            ));
        }

        Ok(Self {
            page_size,
            tree_type,
            max_internal_entries: stored_entries,
            max_leaf_records: stored_records,
            root: PageNumber::new(bits::read_le_u32(bytes, ROOT_PAGE_OFFSET)?),
            page_count: bits::read_le_u32(bytes, PAGE_COUNT_OFFSET)?,
        })
    }

    fn to_bytes(&self) -> Result<Bytes> {
        let mut bytes = Bytes::new(self.page_size as usize);

        bits::write_le_u16(&mut bytes, TYPE_MAGIC_OFFSET, self.tree_type.magic())?;
        bits::write_le_u16(&mut bytes, MAX_ENTRIES_OFFSET, self.max_internal_entries)?;
        bits::write_le_u16(&mut bytes, MAX_RECORDS_OFFSET, self.max_leaf_records)?;
        bits::write_le_u32(&mut bytes, ROOT_PAGE_OFFSET, self.root.value())?;
        bits::write_le_u32(&mut bytes, PAGE_COUNT_OFFSET, self.page_count)?;

        Ok(bytes)
    }
}

/// Builder for [`TreeHeader`] instances
#[derive(Debug)]
pub struct TreeHeaderBuilder {
    page_size: u16,
    tree_type: Option<TreeType>,
    root: PageNumber,
    page_count: u32,
}

impl TreeHeaderBuilder {
    /// Set the type of b+tree this header is for. Changing a previously
    /// set type is rejected.
    pub fn with_tree_type(mut self, tree_type: TreeType) -> Result<Self> {
        match self.tree_type {
            Some(current) if current != tree_type => Err(StorageError::invalid_transition(
                "tree type already set to an incompatible type",
            )),
            _ => {
                self.tree_type = Some(tree_type);
                Ok(self)
            }
        }
    }

    /// Set the page number of the root node. Changing a previously set
    /// root is rejected.
    pub fn with_root(mut self, root: PageNumber) -> Result<Self> {
        if !self.root.is_null() && self.root != root {
            return Err(StorageError::invalid_transition(
                "root page already set to a different page",
            ));
        }

        self.root = root;
        Ok(self)
    }

    /// Set the amount of pages in use by the tree
    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }

    /// Create the header. Building without a tree type fails.
    pub fn build(self) -> Result<TreeHeader> {
        let tree_type = self
            .tree_type
            .ok_or_else(|| StorageError::invalid_argument("tree type not set"))?;

        Ok(TreeHeader {
            page_size: self.page_size,
            tree_type,
            max_internal_entries: max_internal_entries(self.page_size),
            max_leaf_records: max_leaf_records(self.page_size),
            root: self.root,
            page_count: self.page_count,
        })
    }
}
