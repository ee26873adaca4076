//! Database file header.
//!
//! The first 100 bytes of the database file identify it and carry the
//! parameters every other page depends on.

use crate::bits;
use crate::bytes::Bytes;
use crate::error::{Result, StorageError};
use crate::types::{PageNumber, DEFAULT_PAGE_SIZE, KEY_SIZE, MIN_PAGE_SIZE};

/// Magic bytes identifying a valid database file
pub const MAGIC: &[u8; 8] = b"noid v1\0";

/// The size in bytes of a serialized file header
pub const FILE_HEADER_SIZE: usize = 100;

const MAGIC_OFFSET: usize = 0;
const PAGE_SIZE_OFFSET: usize = 8;
const KEY_SIZE_OFFSET: usize = 10;
const FIRST_TREE_HEADER_PAGE_OFFSET: usize = 11;
const FIRST_FREELIST_PAGE_OFFSET: usize = 15;
const CHECKSUM_OFFSET: usize = 19;

/// The database file header.
///
/// Layout (100 bytes, zero-padded after the checksum):
/// ```text
/// Offset  Size  Description
/// 0       8     Magic string "noid v1\0"
/// 8       2     Page size (u16 LE)
/// 10      1     Key size (u8)
/// 11      4     First tree header page (u32 LE, 0 = none)
/// 15      4     First freelist page (u32 LE, 0 = none)
/// 19      4     FNV-1a checksum over bytes [0..19) (u32 LE)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    page_size: u16,
    key_size: u8,
    first_tree_header_page: PageNumber,
    first_freelist_page: PageNumber,
    checksum: u32,
}

impl FileHeader {
    /// Create a new builder with default values
    pub fn builder() -> FileHeaderBuilder {
        FileHeaderBuilder {
            page_size: DEFAULT_PAGE_SIZE,
            key_size: KEY_SIZE as u8,
            first_tree_header_page: PageNumber::NULL,
            first_freelist_page: PageNumber::NULL,
        }
    }

    /// Create a builder derived from an existing header
    pub fn builder_from(base: &FileHeader) -> FileHeaderBuilder {
        FileHeaderBuilder {
            page_size: base.page_size,
            key_size: base.key_size,
            first_tree_header_page: base.first_tree_header_page,
            first_freelist_page: base.first_freelist_page,
        }
    }

    /// Parse a header from its serialized form, verifying magic and
    /// checksum
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(StorageError::invalid_format("file header too short"));
        }
        if &bytes[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()] != MAGIC {
            return Err(StorageError::invalid_format("invalid file header magic"));
        }

        let expected = bits::fnv1a(bytes, 0, CHECKSUM_OFFSET)?;
        let actual = bits::read_le_u32(bytes, CHECKSUM_OFFSET)?;
        if actual != expected {
            return Err(StorageError::invalid_format("file header checksum mismatch"));
        }

        Ok(Self {
            page_size: bits::read_le_u16(bytes, PAGE_SIZE_OFFSET)?,
            key_size: bits::read_u8(bytes, KEY_SIZE_OFFSET)?,
            first_tree_header_page: PageNumber::new(bits::read_le_u32(
                bytes,
                FIRST_TREE_HEADER_PAGE_OFFSET,
            )?),
            first_freelist_page: PageNumber::new(bits::read_le_u32(
                bytes,
                FIRST_FREELIST_PAGE_OFFSET,
            )?),
            checksum: actual,
        })
    }

    /// Serialize this header to its 100-byte form
    pub fn to_bytes(&self) -> Bytes {
        let mut bytes = Bytes::new(FILE_HEADER_SIZE);

        // The buffer is exactly FILE_HEADER_SIZE, so none of these can
        // leave the container.
        bytes.copy_from(MAGIC_OFFSET, MAGIC).expect("header fits");
        bits::write_le_u16(&mut bytes, PAGE_SIZE_OFFSET, self.page_size).expect("header fits");
        bits::write_u8(&mut bytes, KEY_SIZE_OFFSET, self.key_size).expect("header fits");
        bits::write_le_u32(
            &mut bytes,
            FIRST_TREE_HEADER_PAGE_OFFSET,
            self.first_tree_header_page.value(),
        )
        .expect("header fits");
        bits::write_le_u32(
            &mut bytes,
            FIRST_FREELIST_PAGE_OFFSET,
            self.first_freelist_page.value(),
        )
        .expect("header fits");
        bits::write_le_u32(&mut bytes, CHECKSUM_OFFSET, self.checksum).expect("header fits");

        bytes
    }

    /// The size of the database pages in bytes
    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    /// The size of record keys in bytes
    pub fn key_size(&self) -> u8 {
        self.key_size
    }

    /// The page number of the first tree header page, or the null page if
    /// there is none
    pub fn first_tree_header_page(&self) -> PageNumber {
        self.first_tree_header_page
    }

    /// The page number of the first freelist page, or the null page if
    /// there is none
    pub fn first_freelist_page(&self) -> PageNumber {
        self.first_freelist_page
    }

    /// The FNV-1a hash of the header data preceding the checksum field
    pub fn checksum(&self) -> u32 {
        self.checksum
    }
}

/// Builder for [`FileHeader`] instances
#[derive(Debug)]
pub struct FileHeaderBuilder {
    page_size: u16,
    key_size: u8,
    first_tree_header_page: PageNumber,
    first_freelist_page: PageNumber,
}

impl FileHeaderBuilder {
    /// Create a builder from a serialized header, verifying its checksum
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = FileHeader::from_bytes(bytes)?;
        Ok(FileHeader::builder_from(&header))
    }

    /// Set the page size. Values below 512 are raised to 512; other values
    /// are rounded up to the next power of two.
    pub fn with_page_size(mut self, page_size: u16) -> Self {
        self.page_size = bits::round_up_to_power_of_two(page_size).max(MIN_PAGE_SIZE);
        self
    }

    /// Set the key size, rounded up to the next multiple of 8
    pub fn with_key_size(mut self, key_size: u8) -> Self {
        self.key_size = bits::round_up_to_multiple_of_8(key_size);
        self
    }

    /// Set the page number of the first tree header page
    pub fn with_first_tree_header_page(mut self, page_number: PageNumber) -> Self {
        self.first_tree_header_page = page_number;
        self
    }

    /// Set the page number of the first freelist page
    pub fn with_first_freelist_page(mut self, page_number: PageNumber) -> Self {
        self.first_freelist_page = page_number;
        self
    }

    /// Create the header, computing its checksum
    pub fn build(self) -> FileHeader {
        let mut header = FileHeader {
            page_size: self.page_size,
            key_size: self.key_size,
            first_tree_header_page: self.first_tree_header_page,
            first_freelist_page: self.first_freelist_page,
            checksum: 0,
        };

        let bytes = header.to_bytes();
        header.checksum =
            bits::fnv1a(&bytes, 0, CHECKSUM_OFFSET).expect("header prefix is in bounds");
        header
    }
}
