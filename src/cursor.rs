use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{BlockError, Result};

/// Read and write cursors of a data block.
///
/// Outside the crate the cursors are observable only; every mutation goes
/// through [`DataBlock`](crate::DataBlock) so a backend can keep its storage
/// position in step.
///
/// Compound updates (increment, decrement, claim) are serialized by a single
/// lock shared by both cursors. Plain loads and stores go straight to the
/// atomics and never take the lock, so observers like `size` and `progress`
/// stay cheap but may see a slightly stale value.
#[derive(Debug, Default)]
pub struct Cursors {
    read: AtomicUsize,
    write: AtomicUsize,
    lock: Mutex<()>,
}

impl Cursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_write_index(write_index: usize) -> Self {
        Self {
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(write_index),
            lock: Mutex::new(()),
        }
    }

    // The guarded section only touches the atomics, so a poisoned lock
    // cannot leave them half-updated.
    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read_index(&self) -> usize {
        self.read.load(Ordering::Acquire)
    }

    pub fn write_index(&self) -> usize {
        self.write.load(Ordering::Acquire)
    }

    /// Overwrites the read cursor without taking the lock.
    pub(crate) fn set_read_index(&self, index: usize) {
        self.read.store(index, Ordering::Release);
    }

    /// Overwrites the write cursor without taking the lock.
    pub(crate) fn set_write_index(&self, index: usize) {
        self.write.store(index, Ordering::Release);
    }

    pub(crate) fn incr_read_index(&self) {
        let _guard = self.guard();
        self.read.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_read_index(&self) -> Result<()> {
        let _guard = self.guard();
        Self::decrement(&self.read, "read index")
    }

    pub(crate) fn incr_write_index(&self) {
        let _guard = self.guard();
        self.write.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_write_index(&self) -> Result<()> {
        let _guard = self.guard();
        Self::decrement(&self.write, "write index")
    }

    fn decrement(cursor: &AtomicUsize, name: &'static str) -> Result<()> {
        match cursor.load(Ordering::Acquire) {
            0 => Err(BlockError::CursorUnderflow(name)),
            current => {
                cursor.store(current - 1, Ordering::Release);
                Ok(())
            }
        }
    }

    /// Advances the read cursor if an unread record exists and returns the
    /// position that was passed over. Two concurrent callers never receive
    /// the same position.
    pub(crate) fn claim_read(&self) -> Option<usize> {
        let _guard = self.guard();
        let read = self.read.load(Ordering::Acquire);
        if read < self.write.load(Ordering::Acquire) {
            self.read.store(read + 1, Ordering::Release);
            Some(read)
        } else {
            None
        }
    }

    pub fn has_unread(&self) -> bool {
        self.read_index() < self.write_index()
    }

    pub(crate) fn reset_read(&self) {
        let _guard = self.guard();
        self.read.store(0, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        let _guard = self.guard();
        self.read.store(0, Ordering::Release);
        self.write.store(0, Ordering::Release);
    }

    pub fn progress(&self) -> f32 {
        let write = self.write_index();
        if write == 0 {
            return 0.0;
        }
        self.read_index() as f32 / write as f32
    }
}
