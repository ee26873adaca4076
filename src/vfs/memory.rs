//! Memory-backed [`StorageFile`] implementation for tests.

use parking_lot::RwLock;

use crate::error::Result;
use crate::vfs::StorageFile;

/// A file whose contents live in memory.
///
/// Byte-range locking is a no-op: within a single process the composite
/// file lock already serializes access through its memory mutex, which is
/// all the test scenarios need.
#[derive(Default)]
pub struct MemoryFile {
    data: RwLock<Vec<u8>>,
}

impl MemoryFile {
    /// Create a new empty in-memory file
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageFile for MemoryFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.data.read();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }

        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let mut data = self.data.write();
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }

        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn lock_exclusive(&self) -> Result<()> {
        Ok(())
    }

    fn try_lock_exclusive(&self) -> Result<bool> {
        Ok(true)
    }

    fn lock_shared(&self) -> Result<()> {
        Ok(())
    }

    fn try_lock_shared(&self) -> Result<bool> {
        Ok(true)
    }

    fn unlock(&self) -> Result<()> {
        Ok(())
    }
}
