use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use crate::base_block::DataBlock;
use crate::cursor::Cursors;
use crate::disk_block::DiskDataBlock;
use crate::memory_block::MemoryDataBlock;
use crate::{BlockError, Result};

/// Data block holding up to `max_memory_records` records in memory
/// and appending the rest to a temporary file.
///
/// Reads go through memory first, then through the spilled records.
pub struct SpillingDataBlock<V> {
    label: String,
    max_memory_records: usize,
    memory: MemoryDataBlock<V>,
    disk: DiskDataBlock<V>,
    put_lock: Mutex<()>,
    cursors: Cursors,
}

impl<V> SpillingDataBlock<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn new(
        label: String,
        dir: &Path,
        max_memory_records: usize,
    ) -> Result<Self> {
        let disk = DiskDataBlock::temporary(format!("{}-spill", label), dir)?;
        Ok(Self {
            memory: MemoryDataBlock::with_capacity(
                format!("{}-memory", label),
                max_memory_records,
            ),
            disk,
            label,
            max_memory_records,
            put_lock: Mutex::new(()),
            cursors: Cursors::new(),
        })
    }

    /// Number of records kept in memory.
    pub fn in_memory(&self) -> usize {
        self.memory.size()
    }

    /// Number of records written to disk.
    pub fn spilled(&self) -> usize {
        self.disk.size()
    }

    pub(crate) fn has_next(&self) -> bool {
        self.memory.has_next() || self.disk.has_next()
    }
}

impl<V> DataBlock<V> for SpillingDataBlock<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    fn read(&self) -> Result<Option<V>> {
        if self.cursors.claim_read().is_none() {
            return Ok(None);
        }
        match self.memory.read()? {
            Some(value) => Ok(Some(value)),
            None => self.disk.read(),
        }
    }

    fn get(&self, index: usize) -> Result<Option<V>> {
        if index >= self.size() {
            return Ok(None);
        }
        if index < self.memory.size() {
            return self.memory.get(index);
        }
        Err(BlockError::unsupported(&self.label, "get on spilled records"))
    }

    fn put(&self, value: V) -> Result<()> {
        let _guard = self.put_lock.lock().map_err(|e| {
            BlockError::Storage(self.label.clone(), e.to_string())
        })?;
        if self.memory.size() < self.max_memory_records {
            self.memory.put(value)?;
        } else {
            if self.disk.is_empty() {
                log::info!(
                    "{} exceeded {} records in memory, spilling to {}",
                    self.label,
                    self.max_memory_records,
                    self.disk.path().display()
                );
            }
            self.disk.put(value)?;
        }
        self.cursors.incr_write_index();
        Ok(())
    }

    fn reset_read_index(&self) -> Result<()> {
        self.memory.reset_read_index()?;
        self.disk.reset_read_index()?;
        self.cursors.reset_read();
        Ok(())
    }

    fn set_read_index(&self, index: usize) -> Result<()> {
        let in_memory = self.memory.size();
        self.memory.set_read_index(index.min(in_memory))?;
        self.disk.set_read_index(index.saturating_sub(in_memory))?;
        self.cursors.set_read_index(index);
        Ok(())
    }

    fn incr_read_index(&self) -> Result<()> {
        if self.cursors.read_index() < self.memory.size() {
            self.memory.incr_read_index()?;
        } else {
            self.disk.incr_read_index()?;
        }
        self.cursors.incr_read_index();
        Ok(())
    }

    fn decr_read_index(&self) -> Result<()> {
        let index = self
            .cursors
            .read_index()
            .checked_sub(1)
            .ok_or(BlockError::CursorUnderflow("read index"))?;
        if index < self.memory.size() {
            self.memory.decr_read_index()?;
        } else {
            self.disk.decr_read_index()?;
        }
        self.cursors.decr_read_index()
    }

    fn incr_write_index(&self) -> Result<()> {
        Err(BlockError::unsupported(&self.label, "incr_write_index"))
    }

    fn decr_write_index(&self) -> Result<()> {
        Err(BlockError::unsupported(&self.label, "decr_write_index"))
    }

    fn clean(&self) -> Result<()> {
        self.memory.clean()?;
        self.disk.clean()?;
        self.cursors.reset();
        Ok(())
    }

    fn shuffle(&self) -> Result<()> {
        Err(BlockError::unsupported(&self.label, "shuffle"))
    }

    fn flush(&self) -> Result<()> {
        self.disk.flush()
    }

    fn slice(&self, _start_index: usize, _length: usize) -> Result<Self> {
        Err(BlockError::unsupported(&self.label, "slice"))
    }
}

impl<V> fmt::Display for SpillingDataBlock<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
