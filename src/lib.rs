//! # B+tree Storage Engine
//!
//! An embedded, single-file key-value storage engine whose on-disk data
//! structure is a b+tree with fixed-size keys and variable-size values.
//!
//! ## Architecture
//!
//! The engine is composed of modular, swappable components:
//!
//! - **Bit primitives** (`bits`): little-endian integer codecs, FNV-1a,
//!   rounding helpers
//! - **Byte containers** (`bytes`): fixed-size and growable buffers
//!   backing the codecs
//! - **File abstraction** (`vfs`): positional I/O, durable sync and
//!   whole-file locks behind a trait, with a real file and an in-memory
//!   test file
//! - **Concurrency** (`concurrent`): an intent-aware shared/exclusive
//!   mutex and the composite memory + OS file lock
//! - **Page codecs** (`page`): builder/parser pairs for the file header,
//!   tree headers, internal/leaf nodes, overflow pages and the freelist
//! - **Pager** (`pager`): typed page reads and writes, page allocation
//!   and recycling, overflow value spilling
//! - **B+tree core** (`btree`): the in-memory tree with insertion,
//!   removal and point lookup
//! - **Hash & identity** (`hash`): MD5 and the UUID factories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bplustree_storage::{BPlusTree, InsertType};
//!
//! let mut tree = BPlusTree::new(2)?;
//!
//! let key = [0u8; 16];
//! assert_eq!(tree.insert(key, b"value".to_vec()), InsertType::Insert);
//! assert_eq!(tree.get(&key), Some(&b"value"[..]));
//! tree.remove(&key);
//! ```

pub mod bits;
pub mod btree;
pub mod bytes;
pub mod concurrent;
pub mod error;
pub mod hash;
pub mod page;
pub mod pager;
pub mod types;
pub mod vfs;

pub use btree::BPlusTree;
pub use error::{Result, StorageError};
pub use pager::Pager;
pub use types::{InsertType, PageNumber, SearchKey, TreeType, KEY_SIZE};

/// Database configuration, passed at pager-open time.
///
/// The page and key size only apply when initializing a new file; opening
/// an existing database uses the sizes recorded in its header.
#[derive(Debug, Clone)]
pub struct Config {
    /// Page size in bytes for new databases (default: 4096)
    pub page_size: u16,
    /// Key size in bytes for new databases (default: 16)
    pub key_size: u8,
    /// Whether to sync to storage on every mutating pager operation
    /// (default: false for performance)
    pub sync_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: types::DEFAULT_PAGE_SIZE,
            key_size: KEY_SIZE as u8,
            sync_on_write: false,
        }
    }
}

impl Config {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size for new databases
    pub fn page_size(mut self, page_size: u16) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the key size for new databases
    pub fn key_size(mut self, key_size: u8) -> Self {
        self.key_size = key_size;
        self
    }

    /// Enable sync on write for durability
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{FileHeader, LeafNode, NodeRecord, TreeHeader};
    use crate::vfs::UnixFile;
    use tempfile::tempdir;

    #[test]
    fn test_config_builder() {
        let config = Config::new().page_size(8192).key_size(24).sync_on_write(true);
        assert_eq!(config.page_size, 8192);
        assert_eq!(config.key_size, 24);
        assert!(config.sync_on_write);
    }

    /// A small end-to-end pass over the persistent layers: initialize a
    /// database file, store a tree header and a leaf with a spilled
    /// value, reopen, and read everything back.
    #[test]
    fn test_persistent_roundtrip() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let config = Config::default();

        let key = [7u8; KEY_SIZE];
        let value: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        {
            let pager = Pager::open(UnixFile::open(&path)?, &config)?;

            let record = pager.spill_value(key, &value)?;
            let leaf = LeafNode::builder(pager.page_size())
                .with_record(record)?
                .build();
            let leaf_page = pager.write_page(&leaf)?;

            let tree_header = TreeHeader::builder(pager.page_size())
                .with_tree_type(TreeType::Table)?
                .with_root(leaf_page)?
                .with_page_count(2)
                .build()?;
            let tree_header_page = pager.write_page(&tree_header)?;

            let header = FileHeader::builder_from(&pager.read_file_header())
                .with_first_tree_header_page(tree_header_page)
                .build();
            pager.write_file_header(header)?;
        }

        let pager = Pager::open(UnixFile::open(&path)?, &config)?;
        let header = pager.read_file_header();
        assert!(!header.first_tree_header_page().is_null());

        let tree_header: TreeHeader = pager.read_page(header.first_tree_header_page())?;
        assert_eq!(tree_header.tree_type(), TreeType::Table);

        let leaf: LeafNode = pager.read_page(tree_header.root())?;
        assert_eq!(leaf.record_count(), 1);

        let record: &NodeRecord = leaf.record_at(0).unwrap();
        assert_eq!(record.key(), &key);
        assert_eq!(pager.collect_value(record)?, value);

        Ok(())
    }
}
