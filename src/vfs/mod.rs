//! File abstraction.
//!
//! The storage engine talks to a single file through the [`StorageFile`]
//! trait: positional reads and writes, size, flush, durable sync and
//! whole-file lock primitives. The trait keeps the rest of the system
//! testable against an in-memory implementation.
//!
//! Handles are positionless; the offset travels with every call. Reads and
//! writes may be short (EOF, EINTR), so callers that need completeness use
//! the looping [`StorageFile::read_exact_at`] / [`StorageFile::write_all_at`]
//! helpers.

mod memory;
mod unix;

pub use memory::MemoryFile;
pub use unix::UnixFile;

use std::io::ErrorKind;

use crate::error::{Result, StorageError};

/// Trait for positional file I/O and whole-file locking
pub trait StorageFile: Send + Sync {
    /// Read up to `buf.len()` bytes at `offset`, returning the amount read.
    /// May be short on EOF or interruption.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Write up to `buf.len()` bytes at `offset`, returning the amount
    /// written. May be short on interruption.
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    /// Current file size in bytes
    fn size(&self) -> Result<u64>;

    /// Push user-space buffers to the kernel
    fn flush(&self) -> Result<()>;

    /// Make the file durable: fdatasync the file and fsync its containing
    /// directory so the directory entry is persisted as well
    fn sync(&self) -> Result<()>;

    /// Block until an exclusive whole-file lock is held
    fn lock_exclusive(&self) -> Result<()>;

    /// Attempt an exclusive whole-file lock without blocking
    fn try_lock_exclusive(&self) -> Result<bool>;

    /// Block until a shared whole-file lock is held
    fn lock_shared(&self) -> Result<()>;

    /// Attempt a shared whole-file lock without blocking
    fn try_lock_shared(&self) -> Result<bool>;

    /// Release the whole-file lock
    fn unlock(&self) -> Result<()>;

    /// Read exactly `buf.len()` bytes at `offset`, looping over short reads
    /// and interruptions
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "unexpected end of file",
                    )))
                }
                Ok(n) => filled += n,
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write all of `buf` at `offset`, looping over short writes and
    /// interruptions
    fn write_all_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write_at(&buf[written..], offset + written as u64) {
                Ok(0) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    )))
                }
                Ok(n) => written += n,
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
