//! Overflow page.
//!
//! Values that do not fit inline in a leaf record are chained across
//! overflow pages hanging off the record.

use crate::bits;
use crate::bytes::Bytes;
use crate::error::{Result, StorageError};
use crate::page::Page;
use crate::types::PageNumber;

const PAYLOAD_SIZE_OFFSET: usize = 0;
const NEXT_PAGE_OFFSET: usize = 2;
const PAYLOAD_OFFSET: usize = 6;

/// A serialized overflow page.
///
/// Layout:
/// ```text
/// Offset  Size  Description
/// 0       2     Payload size (u16 LE)
/// 2       4     Next overflow page (u32 LE, 0 = none)
/// 6       ..    Payload data to the end of the page
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overflow {
    page_size: u16,
    next: PageNumber,
    data: Vec<u8>,
}

impl Overflow {
    /// Create a new builder for the given page size
    pub fn builder(page_size: u16) -> OverflowBuilder {
        OverflowBuilder {
            page_size,
            next: PageNumber::NULL,
            data: Vec::new(),
        }
    }

    /// Create a builder derived from an existing page
    pub fn builder_from(base: &Overflow) -> OverflowBuilder {
        OverflowBuilder {
            page_size: base.page_size,
            next: base.next,
            data: base.data.clone(),
        }
    }

    /// The maximum payload bytes a single overflow page can hold
    pub fn max_data_size(page_size: u16) -> usize {
        (page_size as usize).saturating_sub(PAYLOAD_OFFSET)
    }

    /// The payload size in bytes
    pub fn payload_size(&self) -> u16 {
        self.data.len() as u16
    }

    /// The next overflow page in the chain, or `None` at the end
    pub fn next(&self) -> Option<PageNumber> {
        if self.next.is_null() {
            None
        } else {
            Some(self.next)
        }
    }

    /// The payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Page for Overflow {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let page_size = u16::try_from(bytes.len())
            .map_err(|_| StorageError::invalid_format("page too large"))?;

        let payload_size = bits::read_le_u16(bytes, PAYLOAD_SIZE_OFFSET)? as usize;
        if payload_size == 0 || payload_size > Self::max_data_size(page_size) {
            return Err(StorageError::invalid_format(
                "overflow payload size out of bounds",
            ));
        }

        Ok(Self {
            page_size,
            next: PageNumber::new(bits::read_le_u32(bytes, NEXT_PAGE_OFFSET)?),
            data: bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload_size].to_vec(),
        })
    }

    fn to_bytes(&self) -> Result<Bytes> {
        let mut bytes = Bytes::new(self.page_size as usize);

        bits::write_le_u16(&mut bytes, PAYLOAD_SIZE_OFFSET, self.data.len() as u16)?;
        bits::write_le_u32(&mut bytes, NEXT_PAGE_OFFSET, self.next.value())?;
        bytes.copy_from(PAYLOAD_OFFSET, &self.data)?;

        Ok(bytes)
    }
}

/// Builder for [`Overflow`] instances
#[derive(Debug)]
pub struct OverflowBuilder {
    page_size: u16,
    next: PageNumber,
    data: Vec<u8>,
}

impl OverflowBuilder {
    /// Set the next overflow page in the chain
    pub fn with_next(mut self, page_number: PageNumber) -> Self {
        self.next = page_number;
        self
    }

    /// Set the payload. Payloads beyond [`Overflow::max_data_size`] do not
    /// fit.
    pub fn with_data(mut self, data: Vec<u8>) -> Result<Self> {
        if data.len() > Overflow::max_data_size(self.page_size) {
            return Err(StorageError::length(format!(
                "data size too large; can fit at most {} bytes",
                Overflow::max_data_size(self.page_size)
            )));
        }

        self.data = data;
        Ok(self)
    }

    /// Create the page. Building without payload fails.
    pub fn build(self) -> Result<Overflow> {
        if self.data.is_empty() {
            return Err(StorageError::invalid_argument(
                "cannot build an overflow page without payload",
            ));
        }

        Ok(Overflow {
            page_size: self.page_size,
            next: self.next,
            data: self.data,
        })
    }
}
