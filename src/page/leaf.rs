//! Leaf node page and node record.

use crate::bits;
use crate::btree::search::binary_search;
use crate::bytes::Bytes;
use crate::error::{Result, StorageError};
use crate::page::Page;
use crate::types::{
    max_leaf_records, PageNumber, SearchKey, KEY_SIZE, LEAF_NODE_HEADER_SIZE,
    LEAF_NODE_RECORD_SIZE,
};

/// Magic identifying a leaf node page: "LP"
const LEAF_NODE_MAGIC: u16 = 0x504c;

const MAGIC_OFFSET: usize = 0;
const RECORD_COUNT_OFFSET: usize = 2;
const LEFT_SIBLING_OFFSET: usize = 4;
const RIGHT_SIBLING_OFFSET: usize = 8;
const RECORD_LIST_OFFSET: usize = LEAF_NODE_HEADER_SIZE;

/// The amount of payload bytes a record holds inline
pub const INLINE_PAYLOAD_SIZE: usize = 7;

/// The amount of payload bytes in an overflowing record; the remaining
/// four bytes hold the first overflow page number
pub const OVERFLOW_PAYLOAD_SIZE: usize = INLINE_PAYLOAD_SIZE - 4;

/// The size in bytes of the overflow header (payload size + next page)
const OVERFLOW_HEADER_SIZE: usize = 6;

/// A record within a leaf node: the search key, an inline indicator and
/// seven payload bytes.
///
/// If the inline indicator is non-zero, it is the amount of payload bytes
/// holding the whole value. Otherwise the first three payload bytes are
/// the value's prefix and the last four contain the page number of the
/// first overflow page. An all-zero record denotes an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeRecord {
    key: SearchKey,
    inline_indicator: u8,
    payload: [u8; INLINE_PAYLOAD_SIZE],
}

impl NodeRecord {
    /// Create an empty new builder
    pub fn builder() -> NodeRecordBuilder {
        NodeRecordBuilder {
            key: [0; KEY_SIZE],
            inline_indicator: 0,
            payload: [0; INLINE_PAYLOAD_SIZE],
        }
    }

    /// Parse a record from `LEAF_NODE_RECORD_SIZE` bytes starting at
    /// `offset`
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<Self> {
        let end = offset
            .checked_add(LEAF_NODE_RECORD_SIZE)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                StorageError::out_of_range(offset, LEAF_NODE_RECORD_SIZE, bytes.len())
            })?;

        let mut key: SearchKey = [0; KEY_SIZE];
        key.copy_from_slice(&bytes[offset..offset + KEY_SIZE]);
        let mut payload = [0u8; INLINE_PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes[offset + KEY_SIZE + 1..end]);

        Ok(Self {
            key,
            inline_indicator: bytes[offset + KEY_SIZE],
            payload,
        })
    }

    /// Write this record at `offset`
    pub fn write_to(&self, bytes: &mut [u8], offset: usize) -> Result<()> {
        if offset + LEAF_NODE_RECORD_SIZE > bytes.len() {
            return Err(StorageError::out_of_range(
                offset,
                LEAF_NODE_RECORD_SIZE,
                bytes.len(),
            ));
        }

        bytes[offset..offset + KEY_SIZE].copy_from_slice(&self.key);
        bytes[offset + KEY_SIZE] = self.inline_indicator;
        bytes[offset + KEY_SIZE + 1..offset + LEAF_NODE_RECORD_SIZE]
            .copy_from_slice(&self.payload);
        Ok(())
    }

    /// The amount of overflow pages required to store `value_size` bytes
    /// at the given page size
    pub fn overflow_page_count(value_size: usize, page_size: u16) -> u32 {
        if value_size <= INLINE_PAYLOAD_SIZE {
            return 0;
        }

        let overflow_bytes = value_size - OVERFLOW_PAYLOAD_SIZE;
        let per_page = page_size as usize - OVERFLOW_HEADER_SIZE;
        overflow_bytes.div_ceil(per_page) as u32
    }

    /// The record key
    pub fn key(&self) -> &SearchKey {
        &self.key
    }

    /// The byte size of the inlined payload, or zero when the payload
    /// overflows
    pub fn inline_indicator(&self) -> u8 {
        self.inline_indicator
    }

    /// The raw payload bytes
    pub fn payload(&self) -> &[u8; INLINE_PAYLOAD_SIZE] {
        &self.payload
    }

    /// The inlined value, or `None` when the payload overflows
    pub fn inline_value(&self) -> Option<&[u8]> {
        if self.inline_indicator == 0 {
            return None;
        }
        Some(&self.payload[..self.inline_indicator as usize])
    }

    /// The first overflow page, or `None` when the value is inlined
    pub fn overflow_page(&self) -> Option<PageNumber> {
        if self.inline_indicator != 0 {
            return None;
        }

        let page = bits::read_le_u32(&self.payload, INLINE_PAYLOAD_SIZE - 4)
            .expect("payload holds a page number");
        if page == 0 {
            None
        } else {
            Some(PageNumber::new(page))
        }
    }

    /// Whether this record denotes an empty slot
    pub fn is_empty_slot(&self) -> bool {
        self.inline_indicator == 0 && self.payload == [0; INLINE_PAYLOAD_SIZE]
    }
}

/// Builder for [`NodeRecord`] instances
#[derive(Debug)]
pub struct NodeRecordBuilder {
    key: SearchKey,
    inline_indicator: u8,
    payload: [u8; INLINE_PAYLOAD_SIZE],
}

impl NodeRecordBuilder {
    /// Set the search key
    pub fn with_search_key(mut self, key: SearchKey) -> Self {
        self.key = key;
        self
    }

    /// Inline the whole value into the payload. Values longer than
    /// [`INLINE_PAYLOAD_SIZE`] do not fit.
    pub fn with_inline_payload(mut self, value: &[u8]) -> Result<Self> {
        if value.is_empty() || value.len() > INLINE_PAYLOAD_SIZE {
            return Err(StorageError::length(format!(
                "inline payload must be 1..={} bytes, got {}",
                INLINE_PAYLOAD_SIZE,
                value.len()
            )));
        }

        self.inline_indicator = value.len() as u8;
        self.payload = [0; INLINE_PAYLOAD_SIZE];
        self.payload[..value.len()].copy_from_slice(value);
        Ok(self)
    }

    /// Store a value prefix plus the first overflow page in the payload
    pub fn with_overflow_payload(
        mut self,
        prefix: [u8; OVERFLOW_PAYLOAD_SIZE],
        first_overflow_page: PageNumber,
    ) -> Self {
        self.inline_indicator = 0;
        self.payload[..OVERFLOW_PAYLOAD_SIZE].copy_from_slice(&prefix);
        bits::write_le_u32(
            &mut self.payload,
            OVERFLOW_PAYLOAD_SIZE,
            first_overflow_page.value(),
        )
        .expect("payload holds a page number");
        self
    }

    /// Create the record. Building an empty builder yields the all-zero
    /// empty-slot record.
    pub fn build(self) -> NodeRecord {
        NodeRecord {
            key: self.key,
            inline_indicator: self.inline_indicator,
            payload: self.payload,
        }
    }
}

/// A serialized leaf b+tree node.
///
/// Layout:
/// ```text
/// Offset  Size  Description
/// 0       2     Magic "LP" (u16 LE)
/// 2       2     Record count (u16 LE)
/// 4       4     Left sibling page (u32 LE, 0 = none)
/// 8       4     Right sibling page (u32 LE, 0 = none)
/// 12      12    Reserved, zero
/// 24      24×n  Records: key[16] + inline indicator + payload[7]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    page_size: u16,
    left_sibling: PageNumber,
    right_sibling: PageNumber,
    records: Vec<NodeRecord>,
}

impl LeafNode {
    /// Create a new builder for the given page size
    pub fn builder(page_size: u16) -> LeafNodeBuilder {
        LeafNodeBuilder {
            page_size,
            left_sibling: PageNumber::NULL,
            right_sibling: PageNumber::NULL,
            records: Vec::new(),
        }
    }

    /// Create a builder derived from an existing node
    pub fn builder_from(base: &LeafNode) -> LeafNodeBuilder {
        LeafNodeBuilder {
            page_size: base.page_size,
            left_sibling: base.left_sibling,
            right_sibling: base.right_sibling,
            records: base.records.clone(),
        }
    }

    /// The amount of records in this node
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The page number of the left sibling in the leaf list
    pub fn left_sibling(&self) -> PageNumber {
        self.left_sibling
    }

    /// The page number of the right sibling in the leaf list
    pub fn right_sibling(&self) -> PageNumber {
        self.right_sibling
    }

    /// The record at the given slot
    pub fn record_at(&self, slot: usize) -> Option<&NodeRecord> {
        self.records.get(slot)
    }

    /// All records in key order
    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    /// Whether this node contains a record with the given key
    pub fn contains(&self, key: &SearchKey) -> bool {
        binary_search(&self.records, key, |r| &r.key).is_some()
    }
}

impl Page for LeafNode {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let page_size = u16::try_from(bytes.len())
            .map_err(|_| StorageError::invalid_format("page too large"))?;

        if bits::read_le_u16(bytes, MAGIC_OFFSET)? != LEAF_NODE_MAGIC {
            return Err(StorageError::invalid_format("invalid leaf node magic"));
        }

        let record_count = bits::read_le_u16(bytes, RECORD_COUNT_OFFSET)? as usize;
        if record_count > max_leaf_records(page_size) as usize {
            return Err(StorageError::invalid_format(
                "leaf node record count exceeds capacity",
            ));
        }

        let mut records = Vec::with_capacity(record_count);
        for slot in 0..record_count {
            let offset = RECORD_LIST_OFFSET + slot * LEAF_NODE_RECORD_SIZE;
            records.push(NodeRecord::from_bytes(bytes, offset)?);
        }

        Ok(Self {
            page_size,
            left_sibling: PageNumber::new(bits::read_le_u32(bytes, LEFT_SIBLING_OFFSET)?),
            right_sibling: PageNumber::new(bits::read_le_u32(bytes, RIGHT_SIBLING_OFFSET)?),
            records,
        })
    }

    fn to_bytes(&self) -> Result<Bytes> {
        let mut bytes = Bytes::new(self.page_size as usize);

        bits::write_le_u16(&mut bytes, MAGIC_OFFSET, LEAF_NODE_MAGIC)?;
        bits::write_le_u16(&mut bytes, RECORD_COUNT_OFFSET, self.records.len() as u16)?;
        bits::write_le_u32(&mut bytes, LEFT_SIBLING_OFFSET, self.left_sibling.value())?;
        bits::write_le_u32(&mut bytes, RIGHT_SIBLING_OFFSET, self.right_sibling.value())?;

        for (slot, record) in self.records.iter().enumerate() {
            record.write_to(&mut bytes, RECORD_LIST_OFFSET + slot * LEAF_NODE_RECORD_SIZE)?;
        }

        Ok(bytes)
    }
}

/// Builder for [`LeafNode`] instances
#[derive(Debug)]
pub struct LeafNodeBuilder {
    page_size: u16,
    left_sibling: PageNumber,
    right_sibling: PageNumber,
    records: Vec<NodeRecord>,
}

impl LeafNodeBuilder {
    /// Whether the node-to-be contains the maximum amount of records
    pub fn is_full(&self) -> bool {
        self.records.len() >= max_leaf_records(self.page_size) as usize
    }

    /// Set the left sibling page
    pub fn with_left_sibling(mut self, sibling: PageNumber) -> Self {
        self.left_sibling = sibling;
        self
    }

    /// Set the right sibling page
    pub fn with_right_sibling(mut self, sibling: PageNumber) -> Self {
        self.right_sibling = sibling;
        self
    }

    /// Append a record. Appending to a full node fails.
    pub fn with_record(mut self, record: NodeRecord) -> Result<Self> {
        if self.is_full() {
            return Err(StorageError::overflow("cannot add record: node is full"));
        }

        self.records.push(record);
        Ok(self)
    }

    /// Overwrite the record at `slot`, or append when the slot is one past
    /// the current records
    pub fn with_record_at(mut self, record: NodeRecord, slot: usize) -> Result<Self> {
        if slot < self.records.len() {
            self.records[slot] = record;
            return Ok(self);
        }

        self.with_record(record)
    }

    /// Create the node
    pub fn build(self) -> LeafNode {
        LeafNode {
            page_size: self.page_size,
            left_sibling: self.left_sibling,
            right_sibling: self.right_sibling,
            records: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_PAGE_SIZE;

    fn key(last: u8) -> SearchKey {
        let mut key: SearchKey = [0; KEY_SIZE];
        key[KEY_SIZE - 1] = last;
        key
    }

    fn inline_record(last: u8) -> NodeRecord {
        NodeRecord::builder()
            .with_search_key(key(last))
            .with_inline_payload(&[last, 2, 3])
            .unwrap()
            .build()
    }

    #[test]
    fn test_record_inline_payload() {
        let record = inline_record(9);
        assert_eq!(record.inline_indicator(), 3);
        assert_eq!(record.inline_value(), Some(&[9, 2, 3][..]));
        assert_eq!(record.overflow_page(), None);
        assert!(!record.is_empty_slot());
    }

    #[test]
    fn test_record_overflow_payload() {
        let record = NodeRecord::builder()
            .with_search_key(key(1))
            .with_overflow_payload([0xaa, 0xbb, 0xcc], PageNumber::new(77))
            .build();

        assert_eq!(record.inline_indicator(), 0);
        assert_eq!(record.inline_value(), None);
        assert_eq!(record.overflow_page(), Some(PageNumber::new(77)));
    }

    #[test]
    fn test_record_inline_size_bounds() {
        assert!(NodeRecord::builder().with_inline_payload(&[]).is_err());
        assert!(NodeRecord::builder()
            .with_inline_payload(&[0; INLINE_PAYLOAD_SIZE])
            .is_ok());
        assert!(NodeRecord::builder()
            .with_inline_payload(&[0; INLINE_PAYLOAD_SIZE + 1])
            .is_err());
    }

    #[test]
    fn test_empty_slot_record() {
        let record = NodeRecord::builder().build();
        assert!(record.is_empty_slot());
        assert_eq!(record, NodeRecord::default());
    }

    #[test]
    fn test_overflow_page_count() {
        assert_eq!(NodeRecord::overflow_page_count(7, DEFAULT_PAGE_SIZE), 0);
        assert_eq!(NodeRecord::overflow_page_count(8, DEFAULT_PAGE_SIZE), 1);
        assert_eq!(NodeRecord::overflow_page_count(4093, DEFAULT_PAGE_SIZE), 1);
        assert_eq!(NodeRecord::overflow_page_count(4094, DEFAULT_PAGE_SIZE), 2);
    }

    #[test]
    fn test_leaf_roundtrip() {
        let node = LeafNode::builder(DEFAULT_PAGE_SIZE)
            .with_left_sibling(PageNumber::new(3))
            .with_right_sibling(PageNumber::new(5))
            .with_record(inline_record(1))
            .unwrap()
            .with_record(inline_record(2))
            .unwrap()
            .build();

        let bytes = node.to_bytes().unwrap();
        assert_eq!(bytes.len(), DEFAULT_PAGE_SIZE as usize);
        assert_eq!(&bytes[..2], b"LP");

        let restored = LeafNode::from_bytes(&bytes).unwrap();
        assert_eq!(restored, node);
        assert_eq!(restored.record_count(), 2);
        assert_eq!(restored.left_sibling(), PageNumber::new(3));
        assert_eq!(restored.right_sibling(), PageNumber::new(5));
    }

    #[test]
    fn test_leaf_contains() {
        let node = LeafNode::builder(DEFAULT_PAGE_SIZE)
            .with_record(inline_record(1))
            .unwrap()
            .with_record(inline_record(4))
            .unwrap()
            .build();

        assert!(node.contains(&key(1)));
        assert!(node.contains(&key(4)));
        assert!(!node.contains(&key(2)));
    }

    #[test]
    fn test_leaf_capacity_overflow() {
        let mut builder = LeafNode::builder(DEFAULT_PAGE_SIZE);
        for i in 0..169u8 {
            builder = builder.with_record(inline_record(i)).unwrap();
        }

        assert!(builder.is_full());
        assert!(matches!(
            builder.with_record(inline_record(255)),
            Err(StorageError::Overflow(_))
        ));
    }

    #[test]
    fn test_leaf_slot_overwrite() {
        let node = LeafNode::builder(DEFAULT_PAGE_SIZE)
            .with_record(inline_record(1))
            .unwrap()
            .with_record(inline_record(2))
            .unwrap()
            .with_record_at(inline_record(9), 1)
            .unwrap()
            .build();

        assert_eq!(node.record_count(), 2);
        assert_eq!(node.record_at(1).unwrap().key(), &key(9));
    }

    #[test]
    fn test_invalid_magic() {
        let node = LeafNode::builder(DEFAULT_PAGE_SIZE).build();
        let mut bytes = node.to_bytes().unwrap();
        bytes[1] = 0;
        assert!(LeafNode::from_bytes(&bytes).is_err());
    }
}
