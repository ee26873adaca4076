//! Intent-aware shared/exclusive mutex.

use parking_lot::{Condvar, Mutex};

/// A mutex that denies new shared locks while a thread waits for the
/// unique lock.
///
/// Just before blocking for the unique lock, a writer announces its
/// intent. From that point on, no new shared acquisition succeeds; the
/// existing shared holders drain naturally, after which the writer
/// acquires the lock. This bounds the time a writer can be starved by a
/// stream of readers: once intent is announced, the bound on further
/// successful shared acquisitions is zero.
#[derive(Default)]
pub struct IntentAwareMutex {
    state: Mutex<LockState>,
    cond: Condvar,
}

#[derive(Default)]
struct LockState {
    /// A writer has announced intent and is waiting for holders to drain
    writer_waiting: bool,
    /// The unique lock is held
    writer_held: bool,
    /// Amount of shared holders
    shared_count: usize,
}

impl IntentAwareMutex {
    /// Create a new unlocked mutex
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the unique lock, blocking until all current holders have
    /// released. New shared acquisitions fail from the moment this method
    /// is entered until the unique lock is held.
    pub fn lock(&self) {
        let mut state = self.state.lock();

        // Only one writer announces intent at a time; later writers queue
        // behind it.
        while state.writer_waiting {
            self.cond.wait(&mut state);
        }
        state.writer_waiting = true;

        while state.writer_held || state.shared_count > 0 {
            self.cond.wait(&mut state);
        }
        state.writer_held = true;
        state.writer_waiting = false;

        drop(state);
        self.cond.notify_all();
    }

    /// Attempt the unique lock without blocking and without announcing
    /// intent
    pub fn try_lock(&self) -> bool {
        let mut state = self.state.lock();
        if state.writer_waiting || state.writer_held || state.shared_count > 0 {
            return false;
        }

        state.writer_held = true;
        true
    }

    /// Release the unique lock and wake all waiters
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writer_held, "unlock without holding the unique lock");
        state.writer_held = false;
        drop(state);
        self.cond.notify_all();
    }

    /// Acquire a shared lock, blocking while the unique lock is held or
    /// requested
    pub fn lock_shared(&self) {
        let mut state = self.state.lock();
        while state.writer_waiting || state.writer_held {
            self.cond.wait(&mut state);
        }
        state.shared_count += 1;
    }

    /// Attempt a shared lock without blocking
    pub fn try_lock_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.writer_waiting || state.writer_held {
            return false;
        }

        state.shared_count += 1;
        true
    }

    /// Release a shared lock; the last holder wakes all waiters
    pub fn unlock_shared(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.shared_count > 0, "unlock_shared without holders");
        state.shared_count -= 1;
        if state.shared_count == 0 {
            drop(state);
            self.cond.notify_all();
        }
    }
}
