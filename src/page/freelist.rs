//! Freelist page.
//!
//! Freed pages are recorded on a doubly linked chain of freelist pages so
//! the pager can recycle them instead of growing the file.

use crate::bits;
use crate::bytes::Bytes;
use crate::error::{Result, StorageError};
use crate::page::Page;
use crate::types::PageNumber;

/// Magic identifying a freelist page: "FL"
const FREELIST_MAGIC: u16 = 0x4c46;

const MAGIC_OFFSET: usize = 0;
const PREVIOUS_PAGE_OFFSET: usize = 2;
const NEXT_PAGE_OFFSET: usize = 6;
const COUNT_OFFSET: usize = 10;
const FREELIST_OFFSET: usize = 12;

/// A serialized freelist page.
///
/// Layout:
/// ```text
/// Offset  Size  Description
/// 0       2     Magic "FL" (u16 LE)
/// 2       4     Previous freelist page (u32 LE, 0 = none)
/// 6       4     Next freelist page (u32 LE, 0 = none)
/// 10      2     Amount of free page numbers (u16 LE)
/// 12      4×n   Free page numbers (u32 LE)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freelist {
    page_size: u16,
    previous: PageNumber,
    next: PageNumber,
    free_pages: Vec<PageNumber>,
}

impl Freelist {
    /// Create a new builder for the given page size
    pub fn builder(page_size: u16) -> FreelistBuilder {
        FreelistBuilder {
            page_size,
            previous: PageNumber::NULL,
            next: PageNumber::NULL,
            free_pages: Vec::new(),
        }
    }

    /// Create a builder derived from an existing freelist page
    pub fn builder_from(base: &Freelist) -> FreelistBuilder {
        FreelistBuilder {
            page_size: base.page_size,
            previous: base.previous,
            next: base.next,
            free_pages: base.free_pages.clone(),
        }
    }

    /// The maximum amount of free page numbers one freelist page holds.
    /// At the default page size this is `(4096 - 12) / 4 = 1021`.
    pub fn capacity(page_size: u16) -> usize {
        (page_size as usize).saturating_sub(FREELIST_OFFSET) / 4
    }

    /// The previous freelist page in the chain
    pub fn previous(&self) -> PageNumber {
        self.previous
    }

    /// The next freelist page in the chain
    pub fn next(&self) -> PageNumber {
        self.next
    }

    /// The amount of free page numbers on this page
    pub fn len(&self) -> usize {
        self.free_pages.len()
    }

    /// Whether this page records no free pages
    pub fn is_empty(&self) -> bool {
        self.free_pages.is_empty()
    }

    /// The free page number at the given position
    pub fn free_page_at(&self, position: usize) -> Option<PageNumber> {
        self.free_pages.get(position).copied()
    }

    /// All free page numbers on this page
    pub fn free_pages(&self) -> &[PageNumber] {
        &self.free_pages
    }
}

impl Page for Freelist {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let page_size = u16::try_from(bytes.len())
            .map_err(|_| StorageError::invalid_format("page too large"))?;

        if bits::read_le_u16(bytes, MAGIC_OFFSET)? != FREELIST_MAGIC {
            return Err(StorageError::invalid_format("invalid freelist magic"));
        }

        let count = bits::read_le_u16(bytes, COUNT_OFFSET)? as usize;
        if count > Self::capacity(page_size) {
            return Err(StorageError::invalid_format(
                "freelist count exceeds capacity",
            ));
        }

        let mut free_pages = Vec::with_capacity(count);
        for slot in 0..count {
            free_pages.push(PageNumber::new(bits::read_le_u32(
                bytes,
                FREELIST_OFFSET + slot * 4,
            )?));
        }

        Ok(Self {
            page_size,
            previous: PageNumber::new(bits::read_le_u32(bytes, PREVIOUS_PAGE_OFFSET)?),
            next: PageNumber::new(bits::read_le_u32(bytes, NEXT_PAGE_OFFSET)?),
            free_pages,
        })
    }

    fn to_bytes(&self) -> Result<Bytes> {
        let mut bytes = Bytes::new(self.page_size as usize);

        bits::write_le_u16(&mut bytes, MAGIC_OFFSET, FREELIST_MAGIC)?;
        bits::write_le_u32(&mut bytes, PREVIOUS_PAGE_OFFSET, self.previous.value())?;
        bits::write_le_u32(&mut bytes, NEXT_PAGE_OFFSET, self.next.value())?;
        bits::write_le_u16(&mut bytes, COUNT_OFFSET, self.free_pages.len() as u16)?;

        for (slot, page) in self.free_pages.iter().enumerate() {
            bits::write_le_u32(&mut bytes, FREELIST_OFFSET + slot * 4, page.value())?;
        }

        Ok(bytes)
    }
}

/// Builder for [`Freelist`] instances
#[derive(Debug)]
pub struct FreelistBuilder {
    page_size: u16,
    previous: PageNumber,
    next: PageNumber,
    free_pages: Vec<PageNumber>,
}

impl FreelistBuilder {
    /// Whether the page-to-be holds the maximum amount of free pages
    pub fn is_full(&self) -> bool {
        self.free_pages.len() >= Freelist::capacity(self.page_size)
    }

    /// Set the previous freelist page in the chain
    pub fn with_previous(mut self, page_number: PageNumber) -> Self {
        self.previous = page_number;
        self
    }

    /// Set the next freelist page in the chain
    pub fn with_next(mut self, page_number: PageNumber) -> Self {
        self.next = page_number;
        self
    }

    /// Append a free page number. Appending to a full page fails.
    pub fn with_free_page(mut self, page_number: PageNumber) -> Result<Self> {
        if self.is_full() {
            return Err(StorageError::overflow(
                "cannot add free page: freelist page is full",
            ));
        }

        self.free_pages.push(page_number);
        Ok(self)
    }

    /// Drop the most recently recorded free page number
    pub fn without_last_free_page(mut self) -> Self {
        self.free_pages.pop();
        self
    }

    /// Create the freelist page
    pub fn build(self) -> Freelist {
        Freelist {
            page_size: self.page_size,
            previous: self.previous,
            next: self.next,
            free_pages: self.free_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_PAGE_SIZE;

    #[test]
    fn test_capacity() {
        assert_eq!(Freelist::capacity(DEFAULT_PAGE_SIZE), 1021);
        assert_eq!(Freelist::capacity(512), 125);
    }

    #[test]
    fn test_roundtrip() {
        let freelist = Freelist::builder(DEFAULT_PAGE_SIZE)
            .with_previous(PageNumber::new(2))
            .with_next(PageNumber::new(9))
            .with_free_page(PageNumber::new(100))
            .unwrap()
            .with_free_page(PageNumber::new(200))
            .unwrap()
            .build();

        let bytes = freelist.to_bytes().unwrap();
        assert_eq!(bytes.len(), DEFAULT_PAGE_SIZE as usize);
        assert_eq!(&bytes[..2], b"FL");

        let restored = Freelist::from_bytes(&bytes).unwrap();
        assert_eq!(restored, freelist);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.free_page_at(1), Some(PageNumber::new(200)));
        assert_eq!(restored.previous(), PageNumber::new(2));
        assert_eq!(restored.next(), PageNumber::new(9));
    }

    #[test]
    fn test_capacity_overflow() {
        let mut builder = Freelist::builder(DEFAULT_PAGE_SIZE);
        for i in 0..1021u32 {
            builder = builder.with_free_page(PageNumber::new(i + 10)).unwrap();
        }

        assert!(builder.is_full());
        assert!(matches!(
            builder.with_free_page(PageNumber::new(9999)),
            Err(StorageError::Overflow(_))
        ));
    }

    #[test]
    fn test_without_last_free_page() {
        let freelist = Freelist::builder(DEFAULT_PAGE_SIZE)
            .with_free_page(PageNumber::new(5))
            .unwrap()
            .with_free_page(PageNumber::new(6))
            .unwrap()
            .without_last_free_page()
            .build();

        assert_eq!(freelist.len(), 1);
        assert_eq!(freelist.free_page_at(0), Some(PageNumber::new(5)));
    }

    #[test]
    fn test_invalid_magic() {
        let freelist = Freelist::builder(DEFAULT_PAGE_SIZE).build();
        let mut bytes = freelist.to_bytes().unwrap();
        bytes[0] = 0;
        assert!(Freelist::from_bytes(&bytes).is_err());
    }
}
