//! File-backed [`StorageFile`] implementation.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt as UnixFileExt;
use std::path::Path;

use fs2::FileExt as LockFileExt;

use crate::error::Result;
use crate::vfs::StorageFile;

/// A database file on a Unix file system.
///
/// Reads and writes are positional (`pread`/`pwrite`), so a single handle
/// can serve multiple threads without seek coordination. Locks are
/// associated with the open file description, not the locking process.
pub struct UnixFile {
    file: File,
    /// Handle to the containing directory, fsynced on [`StorageFile::sync`]
    /// so the directory entry of a freshly created file is durable too.
    dir: Option<File>,
}

impl UnixFile {
    /// Open the file at `path`, creating it if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let dir = match parent_dir(path) {
            Some(dir_path) => Some(File::open(dir_path)?),
            None => None,
        };

        Ok(Self { file, dir })
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => Some(p),
        Some(_) => Some(Path::new(".")),
        None => None,
    }
}

impl StorageFile for UnixFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(self.file.read_at(buf, offset)?)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        Ok(self.file.write_at(buf, offset)?)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn flush(&self) -> Result<()> {
        // Positional writes bypass any user-space buffering, so there is
        // nothing further to push here.
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        if let Some(dir) = &self.dir {
            dir.sync_all()?;
        }
        Ok(())
    }

    fn lock_exclusive(&self) -> Result<()> {
        Ok(LockFileExt::lock_exclusive(&self.file)?)
    }

    fn try_lock_exclusive(&self) -> Result<bool> {
        match LockFileExt::try_lock_exclusive(&self.file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn lock_shared(&self) -> Result<()> {
        Ok(LockFileExt::lock_shared(&self.file)?)
    }

    fn try_lock_shared(&self) -> Result<bool> {
        match LockFileExt::try_lock_shared(&self.file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn unlock(&self) -> Result<()> {
        Ok(LockFileExt::unlock(&self.file)?)
    }
}
