//! Composite memory + OS file lock.

use std::marker::PhantomData;

use tracing::warn;

use crate::concurrent::IntentAwareMutex;
use crate::error::{Result, StorageError};
use crate::vfs::StorageFile;

/// A unique/shared lock pairing an [`IntentAwareMutex`] with the OS
/// whole-file lock of a [`StorageFile`].
///
/// The memory lock is acquired first, then the file lock. An interrupted
/// file-lock acquisition is retried; any other failure releases the memory
/// lock and surfaces the error. The returned guards release in reverse
/// order on drop and are `!Send`, so only the acquiring thread can release
/// them.
pub struct FileLock<'a, F: StorageFile + ?Sized> {
    mutex: &'a IntentAwareMutex,
    file: &'a F,
}

impl<'a, F: StorageFile + ?Sized> FileLock<'a, F> {
    /// Create a lock over `file`, mediated in-process by `mutex`
    pub fn new(mutex: &'a IntentAwareMutex, file: &'a F) -> Self {
        Self { mutex, file }
    }

    /// Acquire the unique lock, blocking as needed
    pub fn unique(&self) -> Result<UniqueFileLockGuard<'a, F>> {
        self.mutex.lock();
        if let Err(e) = self.acquire_file_lock(true) {
            self.mutex.unlock();
            return Err(e);
        }

        Ok(UniqueFileLockGuard {
            mutex: self.mutex,
            file: self.file,
            _not_send: PhantomData,
        })
    }

    /// Attempt the unique lock without blocking
    pub fn try_unique(&self) -> Result<Option<UniqueFileLockGuard<'a, F>>> {
        if !self.mutex.try_lock() {
            return Ok(None);
        }

        match self.file.try_lock_exclusive() {
            Ok(true) => Ok(Some(UniqueFileLockGuard {
                mutex: self.mutex,
                file: self.file,
                _not_send: PhantomData,
            })),
            Ok(false) => {
                self.mutex.unlock();
                Ok(None)
            }
            Err(e) => {
                self.mutex.unlock();
                Err(e)
            }
        }
    }

    /// Acquire a shared lock, blocking as needed
    pub fn shared(&self) -> Result<SharedFileLockGuard<'a, F>> {
        self.mutex.lock_shared();
        if let Err(e) = self.acquire_file_lock(false) {
            self.mutex.unlock_shared();
            return Err(e);
        }

        Ok(SharedFileLockGuard {
            mutex: self.mutex,
            file: self.file,
            _not_send: PhantomData,
        })
    }

    /// Attempt a shared lock without blocking
    pub fn try_shared(&self) -> Result<Option<SharedFileLockGuard<'a, F>>> {
        if !self.mutex.try_lock_shared() {
            return Ok(None);
        }

        match self.file.try_lock_shared() {
            Ok(true) => Ok(Some(SharedFileLockGuard {
                mutex: self.mutex,
                file: self.file,
                _not_send: PhantomData,
            })),
            Ok(false) => {
                self.mutex.unlock_shared();
                Ok(None)
            }
            Err(e) => {
                self.mutex.unlock_shared();
                Err(e)
            }
        }
    }

    fn acquire_file_lock(&self, exclusive: bool) -> Result<()> {
        loop {
            let attempt = if exclusive {
                self.file.lock_exclusive()
            } else {
                self.file.lock_shared()
            };

            match attempt {
                Ok(()) => return Ok(()),
                Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::Interrupted => {
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "file lock acquisition failed");
                    return Err(e);
                }
            }
        }
    }
}

fn release_file_lock<F: StorageFile + ?Sized>(file: &F) {
    if let Err(e) = file.unlock() {
        // Worst case we keep the file lock; the memory lock is released
        // regardless so in-process progress is possible.
        warn!(error = %e, "could not release file lock");
    }
}

/// Guard for the unique composite lock
pub struct UniqueFileLockGuard<'a, F: StorageFile + ?Sized> {
    mutex: &'a IntentAwareMutex,
    file: &'a F,
    _not_send: PhantomData<*const ()>,
}

impl<F: StorageFile + ?Sized> Drop for UniqueFileLockGuard<'_, F> {
    fn drop(&mut self) {
        release_file_lock(self.file);
        self.mutex.unlock();
    }
}

/// Guard for the shared composite lock
pub struct SharedFileLockGuard<'a, F: StorageFile + ?Sized> {
    mutex: &'a IntentAwareMutex,
    file: &'a F,
    _not_send: PhantomData<*const ()>,
}

impl<F: StorageFile + ?Sized> Drop for SharedFileLockGuard<'_, F> {
    fn drop(&mut self) {
        release_file_lock(self.file);
        self.mutex.unlock_shared();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFile;

    #[test]
    fn test_unique_then_shared() -> Result<()> {
        let mutex = IntentAwareMutex::new();
        let file = MemoryFile::new();
        let lock = FileLock::new(&mutex, &file);

        {
            let _guard = lock.unique()?;
            assert!(lock.try_shared()?.is_none());
            assert!(lock.try_unique()?.is_none());
        }

        let _shared_one = lock.shared()?;
        let _shared_two = lock.try_shared()?.expect("second shared lock");
        assert!(lock.try_unique()?.is_none());

        Ok(())
    }

    #[test]
    fn test_guards_release_on_drop() -> Result<()> {
        let mutex = IntentAwareMutex::new();
        let file = MemoryFile::new();
        let lock = FileLock::new(&mutex, &file);

        drop(lock.unique()?);
        drop(lock.shared()?);
        assert!(lock.try_unique()?.is_some());

        Ok(())
    }
}
