//! Page codecs.
//!
//! Every page type comes as a pair: an immutable parsed form and a
//! consuming builder. Builders are created fresh with defaults, from an
//! existing parsed page (to derive a new version), or from a raw
//! page-sized byte buffer, which is validated first. `build()` enforces
//! the page's structural invariant and returns the parsed form.
//!
//! The serialized layouts are bit-exact; see the doc comment on each page
//! type for its byte table.

mod file_header;
mod freelist;
mod internal;
mod leaf;
mod overflow;
mod tree_header;

pub use file_header::{FileHeader, FileHeaderBuilder, FILE_HEADER_SIZE};
pub use freelist::{Freelist, FreelistBuilder};
pub use internal::{InternalNode, InternalNodeBuilder, NodeEntry};
pub use leaf::{
    LeafNode, LeafNodeBuilder, NodeRecord, NodeRecordBuilder, INLINE_PAYLOAD_SIZE,
    OVERFLOW_PAYLOAD_SIZE,
};
pub use overflow::{Overflow, OverflowBuilder};
pub use tree_header::{TreeHeader, TreeHeaderBuilder};

use crate::bytes::Bytes;
use crate::error::Result;

/// A page type that can cross the disk boundary.
///
/// `from_bytes` validates a raw page-sized buffer and parses it;
/// `to_bytes` serializes to exactly one page. Round-tripping through
/// either direction is lossless.
pub trait Page: Sized {
    /// Parse a page from its serialized form. The buffer length is the
    /// page size.
    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Serialize this page to a page-sized buffer
    fn to_bytes(&self) -> Result<Bytes>;
}
