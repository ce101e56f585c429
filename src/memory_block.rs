use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::base_block::{check_range, DataBlock};
use crate::cursor::Cursors;
use crate::{BlockError, Result};

/// Random-access data block keeping every record in memory.
pub struct MemoryDataBlock<V> {
    label: String,
    records: RwLock<Vec<V>>,
    cursors: Cursors,
}

impl<V> MemoryDataBlock<V> {
    pub fn new(label: String) -> Self {
        Self::from_records(label, Vec::new())
    }

    pub fn with_capacity(label: String, capacity: usize) -> Self {
        Self::from_records(label, Vec::with_capacity(capacity))
    }

    pub fn from_records(label: String, records: Vec<V>) -> Self {
        Self {
            label,
            cursors: Cursors::with_write_index(records.len()),
            records: RwLock::new(records),
        }
    }

    fn records(&self) -> Result<RwLockReadGuard<'_, Vec<V>>> {
        self.records
            .read()
            .map_err(|e| BlockError::Storage(self.label.clone(), e.to_string()))
    }

    fn records_mut(&self) -> Result<RwLockWriteGuard<'_, Vec<V>>> {
        self.records
            .write()
            .map_err(|e| BlockError::Storage(self.label.clone(), e.to_string()))
    }

    pub(crate) fn has_next(&self) -> bool {
        self.cursors.has_unread()
    }

    /// Shuffle with a fixed seed, so the resulting order is reproducible.
    pub fn shuffle_with_seed(&self, seed: u64) -> Result<()> {
        let mut records = self.records_mut()?;
        fastrand::Rng::with_seed(seed).shuffle(records.as_mut_slice());
        Ok(())
    }

    /// Consume the block, returning its records in stored order.
    pub fn into_records(self) -> Vec<V> {
        self.records
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone> DataBlock<V> for MemoryDataBlock<V> {
    fn label(&self) -> &str {
        &self.label
    }

    fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    fn read(&self) -> Result<Option<V>> {
        match self.cursors.claim_read() {
            Some(index) => Ok(self.records()?.get(index).cloned()),
            None => Ok(None),
        }
    }

    fn get(&self, index: usize) -> Result<Option<V>> {
        if index >= self.size() {
            return Ok(None);
        }
        Ok(self.records()?.get(index).cloned())
    }

    fn put(&self, value: V) -> Result<()> {
        let mut records = self.records_mut()?;
        // Records past the write cursor were uncommitted by
        // `decr_write_index` and are overwritten.
        records.truncate(self.cursors.write_index());
        records.push(value);
        // Advanced under the storage lock, so a reader never claims a
        // position whose record is not there yet.
        self.cursors.incr_write_index();
        Ok(())
    }

    fn incr_write_index(&self) -> Result<()> {
        let records = self.records()?;
        let write = self.cursors.write_index();
        if write >= records.len() {
            return Err(BlockError::OutOfRange {
                start: write,
                length: 1,
                size: records.len(),
            });
        }
        self.cursors.incr_write_index();
        Ok(())
    }

    fn reset_read_index(&self) -> Result<()> {
        self.cursors.reset_read();
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        let mut records = self.records_mut()?;
        records.clear();
        self.cursors.reset();
        log::debug!("{} cleaned", self.label);
        Ok(())
    }

    fn shuffle(&self) -> Result<()> {
        let mut records = self.records_mut()?;
        fastrand::shuffle(records.as_mut_slice());
        log::debug!("{} shuffled {} records", self.label, records.len());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn slice(&self, start_index: usize, length: usize) -> Result<Self> {
        let records = self.records()?;
        let range = check_range(start_index, length, self.size())?;
        let label = format!("{}[{}..{}]", self.label, range.start, range.end);
        match records.get(range) {
            Some(slice) => Ok(Self::from_records(label, slice.to_vec())),
            None => Err(BlockError::OutOfRange {
                start: start_index,
                length,
                size: records.len(),
            }),
        }
    }
}

impl<V> From<Vec<V>> for MemoryDataBlock<V> {
    fn from(records: Vec<V>) -> Self {
        Self::from_records("memory".to_owned(), records)
    }
}

impl<V: Clone> fmt::Display for MemoryDataBlock<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
