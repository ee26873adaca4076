//! Pager: the mediator between higher layers and the database file.
//!
//! The pager opens or initializes the file, caches the parsed file
//! header, allocates fresh page numbers, recycles freed pages through the
//! on-disk freelist chain and exposes typed page reads and writes. Every
//! operation that touches the file runs under the appropriate composite
//! file lock: unique for anything that mutates, shared for reads.

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::bytes::Bytes;
use crate::concurrent::{FileLock, IntentAwareMutex};
use crate::error::{Result, StorageError};
use crate::page::{
    FileHeader, Freelist, NodeRecord, Overflow, Page, FILE_HEADER_SIZE, INLINE_PAYLOAD_SIZE,
    OVERFLOW_PAYLOAD_SIZE,
};
use crate::types::{PageNumber, SearchKey, KEY_SIZE};
use crate::vfs::StorageFile;
use crate::Config;

/// Page-granular access to a single database file
pub struct Pager<F: StorageFile> {
    file: F,
    mutex: IntentAwareMutex,
    /// The parsed file header; mutations happen under the unique file lock
    header: RwLock<FileHeader>,
    sync_on_write: bool,
}

impl<F: StorageFile> Pager<F> {
    /// Open a database file. An empty file is initialized with a default
    /// header built from `config`; otherwise page 0 is read and validated.
    pub fn open(file: F, config: &Config) -> Result<Self> {
        let header = if file.size()? == 0 {
            let header = FileHeader::builder()
                .with_page_size(config.page_size)
                .with_key_size(config.key_size)
                .build();

            let mut page = Bytes::new(header.page_size() as usize);
            page.copy_from(0, &header.to_bytes())?;
            file.write_all_at(&page, 0)?;
            file.sync()?;

            debug!(page_size = header.page_size(), "initialized database file");
            header
        } else {
            let mut buf = [0u8; FILE_HEADER_SIZE];
            file.read_exact_at(&mut buf, 0)?;
            let header = FileHeader::from_bytes(&buf)?;

            if !header.page_size().is_power_of_two() || header.page_size() < 512 {
                return Err(StorageError::invalid_format(format!(
                    "unsupported page size: {}",
                    header.page_size()
                )));
            }
            if header.key_size() as usize != KEY_SIZE {
                return Err(StorageError::invalid_format(format!(
                    "unsupported key size: {} (expected {})",
                    header.key_size(),
                    KEY_SIZE
                )));
            }

            debug!(page_size = header.page_size(), "opened database file");
            header
        };

        Ok(Self {
            file,
            mutex: IntentAwareMutex::new(),
            header: RwLock::new(header),
            sync_on_write: config.sync_on_write,
        })
    }

    /// The page size of this database
    pub fn page_size(&self) -> u16 {
        self.header.read().page_size()
    }

    /// A copy of the cached file header
    pub fn read_file_header(&self) -> FileHeader {
        *self.header.read()
    }

    /// Replace the file header on disk and in the cache. The page and key
    /// size of an existing database cannot change.
    pub fn write_file_header(&self, header: FileHeader) -> Result<()> {
        let current = self.read_file_header();
        if header.page_size() != current.page_size() || header.key_size() != current.key_size()
        {
            return Err(StorageError::invalid_transition(
                "page size and key size of an existing database are immutable",
            ));
        }

        let _guard = self.lock().unique()?;
        self.write_header_locked(&header)?;
        self.maybe_sync()
    }

    /// Read and parse the page at `page_number`
    pub fn read_page<P: Page>(&self, page_number: PageNumber) -> Result<P> {
        if page_number.is_null() {
            return Err(StorageError::invalid_argument(
                "cannot read the file header page as a typed page",
            ));
        }

        let _guard = self.lock().shared()?;
        self.read_page_locked(page_number)
    }

    /// Serialize `page` and write it at `page_number`
    pub fn write_page_at<P: Page>(&self, page: &P, page_number: PageNumber) -> Result<()> {
        if page_number.is_null() {
            return Err(StorageError::invalid_argument(
                "cannot overwrite the file header page",
            ));
        }

        let _guard = self.lock().unique()?;
        self.write_page_locked(page, page_number)?;
        self.maybe_sync()
    }

    /// Allocate a page, write `page` there and return the new page number
    pub fn write_page<P: Page>(&self, page: &P) -> Result<PageNumber> {
        let _guard = self.lock().unique()?;
        let page_number = self.allocate_locked()?;
        self.write_page_locked(page, page_number)?;
        self.maybe_sync()?;
        Ok(page_number)
    }

    /// Allocate a page number, recycling from the freelist when possible
    /// and appending to the file otherwise
    pub fn allocate_page(&self) -> Result<PageNumber> {
        let _guard = self.lock().unique()?;
        let page_number = self.allocate_locked()?;
        self.maybe_sync()?;
        Ok(page_number)
    }

    /// Record `page_number` on the freelist for later reuse
    pub fn free_page(&self, page_number: PageNumber) -> Result<()> {
        if page_number.is_null() {
            return Err(StorageError::invalid_argument(
                "cannot free the file header page",
            ));
        }

        let _guard = self.lock().unique()?;
        self.free_locked(page_number)?;
        self.maybe_sync()
    }

    /// Build a [`NodeRecord`] for `value`, chaining the bytes that do not
    /// fit inline across freshly allocated overflow pages
    pub fn spill_value(&self, key: SearchKey, value: &[u8]) -> Result<NodeRecord> {
        if value.is_empty() {
            return Err(StorageError::invalid_argument(
                "cannot store a zero-length value",
            ));
        }

        if value.len() <= INLINE_PAYLOAD_SIZE {
            return NodeRecord::builder()
                .with_search_key(key)
                .with_inline_payload(value)
                .map(|builder| builder.build());
        }

        let _guard = self.lock().unique()?;

        let mut prefix = [0u8; OVERFLOW_PAYLOAD_SIZE];
        prefix.copy_from_slice(&value[..OVERFLOW_PAYLOAD_SIZE]);
        let rest = &value[OVERFLOW_PAYLOAD_SIZE..];

        // Chain the pages back to front so every page already knows its
        // successor when written.
        let chunk_size = Overflow::max_data_size(self.page_size());
        let mut next = PageNumber::NULL;
        for piece in rest.chunks(chunk_size).rev() {
            let overflow = Overflow::builder(self.page_size())
                .with_next(next)
                .with_data(piece.to_vec())?
                .build()?;

            let page_number = self.allocate_locked()?;
            self.write_page_locked(&overflow, page_number)?;
            next = page_number;
        }

        self.maybe_sync()?;
        Ok(NodeRecord::builder()
            .with_search_key(key)
            .with_overflow_payload(prefix, next)
            .build())
    }

    /// Reassemble the value of `record`, following its overflow chain
    pub fn collect_value(&self, record: &NodeRecord) -> Result<Vec<u8>> {
        if record.is_empty_slot() {
            return Err(StorageError::invalid_argument(
                "cannot collect the value of an empty slot",
            ));
        }

        if let Some(value) = record.inline_value() {
            return Ok(value.to_vec());
        }

        let _guard = self.lock().shared()?;

        let mut value = record.payload()[..OVERFLOW_PAYLOAD_SIZE].to_vec();
        let mut next = record.overflow_page();
        while let Some(page_number) = next {
            let overflow: Overflow = self.read_page_locked(page_number)?;
            value.extend_from_slice(overflow.data());
            next = overflow.next();
        }

        Ok(value)
    }

    /// Free the overflow chain of `record`, if any
    pub fn release_value(&self, record: &NodeRecord) -> Result<()> {
        let Some(first) = record.overflow_page() else {
            return Ok(());
        };

        let _guard = self.lock().unique()?;

        let mut next = Some(first);
        while let Some(page_number) = next {
            let overflow: Overflow = self.read_page_locked(page_number)?;
            next = overflow.next();
            self.free_locked(page_number)?;
        }

        self.maybe_sync()
    }

    fn lock(&self) -> FileLock<'_, F> {
        FileLock::new(&self.mutex, &self.file)
    }

    fn maybe_sync(&self) -> Result<()> {
        if self.sync_on_write {
            self.file.sync()?;
        }
        Ok(())
    }

    fn read_page_locked<P: Page>(&self, page_number: PageNumber) -> Result<P> {
        let page_size = self.page_size();
        let mut buf = vec![0u8; page_size as usize];
        self.file
            .read_exact_at(&mut buf, page_number.file_offset(page_size))?;
        P::from_bytes(&buf)
    }

    fn write_page_locked<P: Page>(&self, page: &P, page_number: PageNumber) -> Result<()> {
        let page_size = self.page_size();
        let bytes = page.to_bytes()?;
        if bytes.len() != page_size as usize {
            return Err(StorageError::invalid_argument(format!(
                "page serializes to {} bytes, expected {}",
                bytes.len(),
                page_size
            )));
        }

        self.file
            .write_all_at(&bytes, page_number.file_offset(page_size))
    }

    fn write_header_locked(&self, header: &FileHeader) -> Result<()> {
        self.file.write_all_at(&header.to_bytes(), 0)?;
        *self.header.write() = *header;
        Ok(())
    }

    fn allocate_locked(&self) -> Result<PageNumber> {
        let header = self.read_file_header();
        let page_size = header.page_size();

        let head_page = header.first_freelist_page();
        if head_page.is_null() {
            let page_number = PageNumber::new((self.file.size()? / page_size as u64) as u32);
            let zeros = Bytes::new(page_size as usize);
            self.file
                .write_all_at(&zeros, page_number.file_offset(page_size))?;
            trace!(page = %page_number, "appended page");
            return Ok(page_number);
        }

        let head: Freelist = self.read_page_locked(head_page)?;
        if let Some(&page_number) = head.free_pages().last() {
            let updated = Freelist::builder_from(&head).without_last_free_page().build();
            self.write_page_locked(&updated, head_page)?;
            trace!(page = %page_number, "recycled free page");
            return Ok(page_number);
        }

        // The head holds no entries; the head page itself is the
        // allocation, and the chain moves on to its successor.
        let next = head.next();
        if !next.is_null() {
            let next_list: Freelist = self.read_page_locked(next)?;
            let relinked = Freelist::builder_from(&next_list)
                .with_previous(PageNumber::NULL)
                .build();
            self.write_page_locked(&relinked, next)?;
        }

        let updated_header = FileHeader::builder_from(&header)
            .with_first_freelist_page(next)
            .build();
        self.write_header_locked(&updated_header)?;
        trace!(page = %head_page, "recycled empty freelist head");
        Ok(head_page)
    }

    fn free_locked(&self, page_number: PageNumber) -> Result<()> {
        let header = self.read_file_header();
        let page_size = header.page_size();

        let head_page = header.first_freelist_page();
        if head_page.is_null() {
            // The freed page starts the freelist chain.
            let head = Freelist::builder(page_size).build();
            self.write_page_locked(&head, page_number)?;

            let updated_header = FileHeader::builder_from(&header)
                .with_first_freelist_page(page_number)
                .build();
            self.write_header_locked(&updated_header)?;
            trace!(page = %page_number, "started freelist");
            return Ok(());
        }

        let head: Freelist = self.read_page_locked(head_page)?;
        if head.len() < Freelist::capacity(page_size) {
            let updated = Freelist::builder_from(&head)
                .with_free_page(page_number)?
                .build();
            self.write_page_locked(&updated, head_page)?;
            trace!(page = %page_number, "freed page");
            return Ok(());
        }

        // The head is full; the freed page becomes the new head.
        let new_head = Freelist::builder(page_size).with_next(head_page).build();
        self.write_page_locked(&new_head, page_number)?;

        let relinked = Freelist::builder_from(&head)
            .with_previous(page_number)
            .build();
        self.write_page_locked(&relinked, head_page)?;

        let updated_header = FileHeader::builder_from(&header)
            .with_first_freelist_page(page_number)
            .build();
        self.write_header_locked(&updated_header)?;
        trace!(page = %page_number, "freed page as new freelist head");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{LeafNode, TreeHeader};
    use crate::types::TreeType;
    use crate::vfs::{MemoryFile, UnixFile};
    use tempfile::tempdir;

    fn memory_pager() -> Pager<MemoryFile> {
        Pager::open(MemoryFile::new(), &Config::default()).unwrap()
    }

    fn key(last: u8) -> SearchKey {
        let mut key: SearchKey = [0; KEY_SIZE];
        key[KEY_SIZE - 1] = last;
        key
    }

    #[test]
    fn test_open_initializes_empty_file() -> Result<()> {
        let pager = memory_pager();
        let header = pager.read_file_header();

        assert_eq!(header.page_size(), 4096);
        assert_eq!(header.key_size(), 16);
        assert_eq!(header.first_freelist_page(), PageNumber::NULL);

        Ok(())
    }

    #[test]
    fn test_reopen_database() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let config = Config::default();

        {
            let pager = Pager::open(UnixFile::open(&path)?, &config)?;
            let header = FileHeader::builder_from(&pager.read_file_header())
                .with_first_tree_header_page(PageNumber::new(1))
                .build();
            pager.write_file_header(header)?;
        }

        let pager = Pager::open(UnixFile::open(&path)?, &config)?;
        assert_eq!(
            pager.read_file_header().first_tree_header_page(),
            PageNumber::new(1)
        );

        Ok(())
    }

    #[test]
    fn test_open_rejects_corrupted_header() -> Result<()> {
        let file = MemoryFile::new();
        let mut bytes = FileHeader::builder().build().to_bytes().into_vec();
        bytes[12] ^= 0xff;
        file.write_all_at(&bytes, 0)?;

        assert!(matches!(
            Pager::open(file, &Config::default()),
            Err(StorageError::InvalidFormat(_))
        ));

        Ok(())
    }

    #[test]
    fn test_allocate_appends_sequentially() -> Result<()> {
        let pager = memory_pager();

        assert_eq!(pager.allocate_page()?, PageNumber::new(1));
        assert_eq!(pager.allocate_page()?, PageNumber::new(2));
        assert_eq!(pager.allocate_page()?, PageNumber::new(3));

        Ok(())
    }

    #[test]
    fn test_typed_page_roundtrip() -> Result<()> {
        let pager = memory_pager();

        let tree_header = TreeHeader::builder(pager.page_size())
            .with_tree_type(TreeType::Table)?
            .with_root(PageNumber::new(2))?
            .with_page_count(1)
            .build()?;

        let page_number = pager.write_page(&tree_header)?;
        let restored: TreeHeader = pager.read_page(page_number)?;
        assert_eq!(restored, tree_header);

        Ok(())
    }

    #[test]
    fn test_type_mismatch_fails() -> Result<()> {
        let pager = memory_pager();

        let leaf = LeafNode::builder(pager.page_size()).build();
        let page_number = pager.write_page(&leaf)?;

        let result: Result<Freelist> = pager.read_page(page_number);
        assert!(matches!(result, Err(StorageError::InvalidFormat(_))));

        Ok(())
    }

    #[test]
    fn test_header_page_is_guarded() {
        let pager = memory_pager();

        assert!(pager.read_page::<Freelist>(PageNumber::NULL).is_err());
        let leaf = LeafNode::builder(pager.page_size()).build();
        assert!(pager.write_page_at(&leaf, PageNumber::NULL).is_err());
        assert!(pager.free_page(PageNumber::NULL).is_err());
    }

    #[test]
    fn test_page_and_key_size_are_immutable() {
        let pager = memory_pager();

        let changed = FileHeader::builder().with_page_size(8192).build();
        assert!(matches!(
            pager.write_file_header(changed),
            Err(StorageError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_free_and_recycle() -> Result<()> {
        let pager = memory_pager();

        let p1 = pager.allocate_page()?;
        let p2 = pager.allocate_page()?;
        let p3 = pager.allocate_page()?;
        assert_eq!((p1, p2, p3), (PageNumber::new(1), PageNumber::new(2), PageNumber::new(3)));

        // p2 becomes the (empty) freelist head, p3 its first entry.
        pager.free_page(p2)?;
        assert_eq!(pager.read_file_header().first_freelist_page(), p2);
        pager.free_page(p3)?;

        // The entry is recycled first, then the head page itself.
        assert_eq!(pager.allocate_page()?, p3);
        assert_eq!(pager.allocate_page()?, p2);
        assert_eq!(pager.read_file_header().first_freelist_page(), PageNumber::NULL);

        // With the freelist drained, allocation appends again.
        assert_eq!(pager.allocate_page()?, PageNumber::new(4));

        Ok(())
    }

    #[test]
    fn test_spill_inline_value() -> Result<()> {
        let pager = memory_pager();

        let record = pager.spill_value(key(1), b"tiny")?;
        assert_eq!(record.inline_value(), Some(&b"tiny"[..]));
        assert_eq!(pager.collect_value(&record)?, b"tiny");

        Ok(())
    }

    #[test]
    fn test_spill_and_collect_overflowing_value() -> Result<()> {
        let pager = memory_pager();

        let value: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let record = pager.spill_value(key(2), &value)?;

        assert_eq!(record.inline_value(), None);
        assert!(record.overflow_page().is_some());
        assert_eq!(pager.collect_value(&record)?, value);

        Ok(())
    }

    #[test]
    fn test_release_value_frees_the_chain() -> Result<()> {
        let pager = memory_pager();

        let value = vec![0x5a; 9000];
        let record = pager.spill_value(key(3), &value)?;
        let pages = NodeRecord::overflow_page_count(value.len(), pager.page_size());
        assert_eq!(pages, 3);

        pager.release_value(&record)?;

        // The freed chain is recycled before the file grows again.
        let mut recycled = Vec::new();
        for _ in 0..pages {
            recycled.push(pager.allocate_page()?);
        }
        let first = record.overflow_page().unwrap();
        assert!(recycled.contains(&first));

        Ok(())
    }

    #[test]
    fn test_spill_rejects_empty_value() {
        let pager = memory_pager();
        assert!(pager.spill_value(key(4), b"").is_err());
    }
}
