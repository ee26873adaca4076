//! Concurrency primitives.
//!
//! Two building blocks: [`IntentAwareMutex`], a process-local shared/
//! exclusive mutex that starves new shared acquisitions once a writer has
//! announced intent, and [`FileLock`], which composes that mutex with the
//! OS whole-file lock of a [`crate::vfs::StorageFile`].

mod file_lock;
mod intent;

pub use file_lock::{FileLock, SharedFileLockGuard, UniqueFileLockGuard};
pub use intent::IntentAwareMutex;
