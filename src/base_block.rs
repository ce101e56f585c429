use crate::cursor::Cursors;
use crate::{BlockError, Result};

/// Sequential record storage with epoch-style re-reading.
///
/// Records are appended with [`put`](DataBlock::put) and consumed with
/// [`read`](DataBlock::read). Once the read cursor passes the last written
/// record, `read` returns `Ok(None)`; [`reset_read_index`] starts the next
/// pass over the same records.
///
/// All operations take `&self`: a block is meant to be shared between a
/// producer and several consumer threads, and every implementation guards
/// its own storage.
///
/// [`reset_read_index`]: DataBlock::reset_read_index
pub trait DataBlock<V> {
    /// Diagnostic label used in logs and errors.
    fn label(&self) -> &str;

    /// Read-only view of the cursors; mutate them through the block.
    fn cursors(&self) -> &Cursors;

    /// Advance the read cursor and return the record it passed over,
    /// or `None` if every written record has been read.
    fn read(&self) -> Result<Option<V>>;

    /// Read the record at `index` without touching the read cursor.
    /// Returns `None` for indices at or past [`size`](DataBlock::size).
    fn get(&self, index: usize) -> Result<Option<V>>;

    /// Append a record at the write cursor and advance it.
    fn put(&self, value: V) -> Result<()>;

    /// Rewind the read cursor so the next `read` starts from the first
    /// record again.
    fn reset_read_index(&self) -> Result<()>;

    /// Drop all records and reset both cursors.
    fn clean(&self) -> Result<()>;

    /// Randomly permute the stored records.
    /// Must not run concurrently with reads or writes.
    fn shuffle(&self) -> Result<()>;

    /// Make buffered writes visible to readers and durable.
    fn flush(&self) -> Result<()>;

    /// Copy `length` records starting at `start_index` into a new,
    /// independent block.
    fn slice(&self, start_index: usize, length: usize) -> Result<Self>
    where
        Self: Sized;

    fn record_type(&self) -> &'static str {
        std::any::type_name::<V>()
    }

    fn read_index(&self) -> usize {
        self.cursors().read_index()
    }

    /// Restore the read cursor from a checkpoint.
    /// The caller must ensure no other operation is in flight.
    fn set_read_index(&self, index: usize) -> Result<()> {
        self.cursors().set_read_index(index);
        Ok(())
    }

    fn write_index(&self) -> usize {
        self.cursors().write_index()
    }

    /// Restore the write cursor from a checkpoint.
    /// The caller must ensure no other operation is in flight.
    fn set_write_index(&self, index: usize) {
        self.cursors().set_write_index(index);
    }

    /// Skip the next record without returning it.
    fn incr_read_index(&self) -> Result<()> {
        self.cursors().incr_read_index();
        Ok(())
    }

    /// Step the read cursor back so the previous record is read again.
    /// Fails with [`BlockError::CursorUnderflow`] at position zero.
    fn decr_read_index(&self) -> Result<()> {
        self.cursors().decr_read_index()
    }

    /// Commit one more record position without storing anything.
    fn incr_write_index(&self) -> Result<()> {
        self.cursors().incr_write_index();
        Ok(())
    }

    /// Uncommit the last record; the next `put` takes its position.
    fn decr_write_index(&self) -> Result<()> {
        self.cursors().decr_write_index()
    }

    /// Number of committed records.
    fn size(&self) -> usize {
        self.cursors().write_index()
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Fraction of records read in the current pass.
    /// Approximate while other threads are reading or writing.
    fn progress(&self) -> f32 {
        self.cursors().progress()
    }

    /// Read the next record, rewinding once if the block is exhausted.
    ///
    /// Fails with [`BlockError::EmptyOrCorrupted`] when even the first
    /// record cannot be read after the rewind.
    fn looping_read(&self) -> Result<V> {
        if let Some(value) = self.read()? {
            return Ok(value);
        }
        self.reset_read_index()?;
        match self.read()? {
            Some(value) => Ok(value),
            None => {
                log::warn!("{} is empty after rewinding", self.label());
                Err(BlockError::EmptyOrCorrupted(self.label().to_owned()))
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "DataBlock [valueClass={}, readIndex={}, writeIndex={}]",
            self.record_type(),
            self.read_index(),
            self.write_index()
        )
    }
}

/// Slice bounds shared by the random-access backends.
pub(crate) fn check_range(
    start_index: usize,
    length: usize,
    size: usize,
) -> Result<std::ops::Range<usize>> {
    match start_index.checked_add(length) {
        Some(end) if end <= size => Ok(start_index..end),
        _ => Err(BlockError::OutOfRange {
            start: start_index,
            length,
            size,
        }),
    }
}
