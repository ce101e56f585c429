use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::base_block::DataBlock;
use crate::cursor::Cursors;
use crate::{BlockError, Result};

const BLOCK_FILE_EXTENSION: &str = "block";

/// Data block appending `bincode`-encoded records to a single file.
///
/// Only sequential access is supported: `get`, `shuffle` and `slice`
/// fail with [`BlockError::Unsupported`].
pub struct DiskDataBlock<V> {
    label: String,
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    reader: Mutex<BufReader<File>>,
    /// Set when the writer holds records the reader cannot see yet.
    dirty: AtomicBool,
    cursors: Cursors,
    delete_on_drop: bool,
    _records: PhantomData<fn() -> V>,
}

impl<V> DiskDataBlock<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Create a block backed by the file at `path`.
    /// An existing file is truncated; the file outlives the block.
    pub fn create(label: String, path: &Path) -> Result<Self> {
        Self::open(label, path.to_path_buf(), false)
    }

    /// Create a block backed by a uniquely named file inside `dir`,
    /// removed when the block is dropped.
    pub fn temporary(label: String, dir: &Path) -> Result<Self> {
        let path = dir.join(format!(
            "{}-{}.{}",
            file_stem(&label),
            Uuid::new_v4(),
            BLOCK_FILE_EXTENSION
        ));
        Self::open(label, path, true)
    }

    fn open(
        label: String,
        path: PathBuf,
        delete_on_drop: bool,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let write_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let read_file = File::open(&path)?;
        log::debug!("{} backed by {}", label, path.display());

        Ok(Self {
            label,
            path,
            writer: Mutex::new(BufWriter::new(write_file)),
            reader: Mutex::new(BufReader::new(read_file)),
            dirty: AtomicBool::new(false),
            cursors: Cursors::new(),
            delete_on_drop,
            _records: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn has_next(&self) -> bool {
        self.cursors.has_unread()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|e| BlockError::Storage(self.label.clone(), e.to_string()))
    }

    fn codec_error(&self, err: bincode::Error) -> BlockError {
        BlockError::Storage(self.label.clone(), err.to_string())
    }

    fn flush_pending(&self) -> Result<()> {
        if self.dirty.load(Ordering::Acquire) {
            // Puts hold the writer lock, so none can slip in between the
            // flush and clearing the flag.
            let mut writer = self.lock(&self.writer)?;
            writer.flush()?;
            self.dirty.store(false, Ordering::Release);
        }
        Ok(())
    }

    /// Decode the next record, leaving the reader where it was on failure.
    fn decode(&self, reader: &mut BufReader<File>) -> Result<V> {
        let offset = reader.stream_position()?;
        match bincode::deserialize_from(&mut *reader) {
            Ok(value) => Ok(value),
            Err(err) => {
                reader.seek(SeekFrom::Start(offset))?;
                Err(self.codec_error(err))
            }
        }
    }

    /// Move the reader to the start of record `index`.
    fn reposition(
        &self,
        reader: &mut BufReader<File>,
        index: usize,
    ) -> Result<()> {
        reader.seek(SeekFrom::Start(0))?;
        self.flush_pending()?;
        for _ in 0..index.min(self.cursors.write_index()) {
            self.decode(reader)?;
        }
        Ok(())
    }
}

/// Keep only characters that cannot leave the target directory.
fn file_stem(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

impl<V> DataBlock<V> for DiskDataBlock<V>
where
    V: Serialize + DeserializeOwned,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    fn read(&self) -> Result<Option<V>> {
        // Every read cursor change happens under the reader lock,
        // which keeps file offset and read cursor in step.
        let mut reader = self.lock(&self.reader)?;
        if !self.cursors.has_unread() {
            return Ok(None);
        }
        self.flush_pending()?;
        let value = self.decode(&mut reader)?;
        self.cursors.incr_read_index();
        Ok(Some(value))
    }

    fn get(&self, _index: usize) -> Result<Option<V>> {
        Err(BlockError::unsupported(&self.label, "get"))
    }

    fn put(&self, value: V) -> Result<()> {
        let bytes =
            bincode::serialize(&value).map_err(|e| self.codec_error(e))?;
        let mut writer = self.lock(&self.writer)?;
        writer.write_all(&bytes)?;
        self.dirty.store(true, Ordering::Release);
        self.cursors.incr_write_index();
        Ok(())
    }

    fn reset_read_index(&self) -> Result<()> {
        let mut reader = self.lock(&self.reader)?;
        reader.seek(SeekFrom::Start(0))?;
        self.cursors.reset_read();
        Ok(())
    }

    fn set_read_index(&self, index: usize) -> Result<()> {
        let mut reader = self.lock(&self.reader)?;
        self.reposition(&mut reader, index)?;
        self.cursors.set_read_index(index);
        Ok(())
    }

    fn incr_read_index(&self) -> Result<()> {
        let mut reader = self.lock(&self.reader)?;
        if self.cursors.has_unread() {
            self.flush_pending()?;
            self.decode(&mut reader)?;
        }
        self.cursors.incr_read_index();
        Ok(())
    }

    fn decr_read_index(&self) -> Result<()> {
        let mut reader = self.lock(&self.reader)?;
        let index = self
            .cursors
            .read_index()
            .checked_sub(1)
            .ok_or(BlockError::CursorUnderflow("read index"))?;
        self.reposition(&mut reader, index)?;
        self.cursors.decr_read_index()
    }

    fn incr_write_index(&self) -> Result<()> {
        Err(BlockError::unsupported(&self.label, "incr_write_index"))
    }

    fn decr_write_index(&self) -> Result<()> {
        Err(BlockError::unsupported(&self.label, "decr_write_index"))
    }

    fn clean(&self) -> Result<()> {
        let mut reader = self.lock(&self.reader)?;
        let mut writer = self.lock(&self.writer)?;
        writer.flush()?;
        writer.get_ref().set_len(0)?;
        writer.seek(SeekFrom::Start(0))?;
        reader.seek(SeekFrom::Start(0))?;
        self.dirty.store(false, Ordering::Release);
        self.cursors.reset();
        log::debug!("{} cleaned", self.label);
        Ok(())
    }

    fn shuffle(&self) -> Result<()> {
        Err(BlockError::unsupported(&self.label, "shuffle"))
    }

    fn flush(&self) -> Result<()> {
        let mut writer = self.lock(&self.writer)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        self.dirty.store(false, Ordering::Release);
        log::debug!(
            "{} flushed {} records to {}",
            self.label,
            self.cursors.write_index(),
            self.path.display()
        );
        Ok(())
    }

    fn slice(&self, _start_index: usize, _length: usize) -> Result<Self> {
        Err(BlockError::unsupported(&self.label, "slice"))
    }
}

impl<V> Drop for DiskDataBlock<V> {
    fn drop(&mut self) {
        if self.delete_on_drop {
            if let Err(err) = fs::remove_file(&self.path) {
                log::warn!(
                    "{} failed to remove {}: {}",
                    self.label,
                    self.path.display(),
                    err
                );
            }
        }
    }
}

impl<V> fmt::Display for DiskDataBlock<V>
where
    V: Serialize + DeserializeOwned,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempdir::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        features: Vec<f32>,
        label: i8,
    }

    fn sample(i: usize) -> Sample {
        Sample {
            features: vec![i as f32; i % 4],
            label: (i % 2) as i8,
        }
    }

    #[test_log::test]
    fn test_disk_block_write_read() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let block = DiskDataBlock::create(
            "samples".to_string(),
            &temp_dir.path().join("samples.block"),
        )
        .unwrap();

        for i in 0..10 {
            block.put(sample(i)).unwrap();
        }
        assert_eq!(block.size(), 10);

        for i in 0..10 {
            assert_eq!(block.read().unwrap(), Some(sample(i)));
        }
        assert_eq!(block.read().unwrap(), None);
        assert!(!block.has_next());
        assert_eq!(block.progress(), 1.0);
    }

    #[test]
    fn test_disk_block_interleaved_put_read() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let block =
            DiskDataBlock::temporary("interleaved".to_string(), temp_dir.path())
                .unwrap();

        block.put(1u64).unwrap();
        assert_eq!(block.read().unwrap(), Some(1));
        assert_eq!(block.read().unwrap(), None);
        block.put(2).unwrap();
        block.put(3).unwrap();
        assert_eq!(block.read().unwrap(), Some(2));
        block.put(4).unwrap();
        assert_eq!(block.read().unwrap(), Some(3));
        assert_eq!(block.read().unwrap(), Some(4));
        assert_eq!(block.read().unwrap(), None);
    }

    #[test]
    fn test_disk_block_epochs() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let block =
            DiskDataBlock::temporary("epochs".to_string(), temp_dir.path())
                .unwrap();
        for s in ["A", "B", "C"] {
            block.put(s.to_string()).unwrap();
        }

        assert_eq!(block.read().unwrap().as_deref(), Some("A"));
        assert_eq!(block.read().unwrap().as_deref(), Some("B"));
        block.reset_read_index().unwrap();
        block.reset_read_index().unwrap();
        assert_eq!(block.read_index(), 0);

        let epoch: Vec<String> =
            (0..5).map(|_| block.looping_read().unwrap()).collect();
        assert_eq!(epoch, ["A", "B", "C", "A", "B"]);
    }

    #[test]
    fn test_disk_block_clean() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let path = temp_dir.path().join("clean.block");
        let block = DiskDataBlock::create("clean".to_string(), &path).unwrap();
        for i in 0..5u32 {
            block.put(i).unwrap();
        }
        block.flush().unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);

        block.read().unwrap();
        block.clean().unwrap();
        assert_eq!(block.size(), 0);
        assert_eq!(block.read_index(), 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(block.read().unwrap(), None);
        assert!(matches!(
            block.looping_read(),
            Err(BlockError::EmptyOrCorrupted(_))
        ));

        block.put(42).unwrap();
        assert_eq!(block.looping_read().unwrap(), 42);
        assert_eq!(block.looping_read().unwrap(), 42);
    }

    #[test]
    fn test_disk_block_random_access_unsupported() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let block =
            DiskDataBlock::temporary("seq".to_string(), temp_dir.path())
                .unwrap();
        block.put(1u8).unwrap();

        assert!(matches!(
            block.get(0),
            Err(BlockError::Unsupported { operation: "get", .. })
        ));
        assert!(matches!(
            block.shuffle(),
            Err(BlockError::Unsupported {
                operation: "shuffle",
                ..
            })
        ));
        assert!(matches!(
            block.slice(0, 1),
            Err(BlockError::Unsupported {
                operation: "slice",
                ..
            })
        ));
        assert_eq!(block.read().unwrap(), Some(1));
    }

    #[test]
    fn test_disk_block_restore_read_index() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let block =
            DiskDataBlock::temporary("checkpoint".to_string(), temp_dir.path())
                .unwrap();
        for i in 0..6 {
            block.put(sample(i)).unwrap();
        }
        block.read().unwrap();

        block.set_read_index(4).unwrap();
        assert_eq!(block.read_index(), 4);
        assert_eq!(block.read().unwrap(), Some(sample(4)));
        assert_eq!(block.read().unwrap(), Some(sample(5)));
        assert_eq!(block.read().unwrap(), None);
    }

    #[test]
    fn test_disk_block_read_index_mutators() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let block =
            DiskDataBlock::temporary("mutators".to_string(), temp_dir.path())
                .unwrap();
        for i in 0..3u32 {
            block.put(i).unwrap();
        }

        block.incr_read_index().unwrap();
        assert_eq!(block.read_index(), 1);
        assert_eq!(block.read().unwrap(), Some(1));

        block.decr_read_index().unwrap();
        assert_eq!(block.read().unwrap(), Some(1));
        assert_eq!(block.read().unwrap(), Some(2));
        assert_eq!(block.read().unwrap(), None);

        // Skipping past the end is not a storage fault.
        block.incr_read_index().unwrap();
        assert_eq!(block.read().unwrap(), None);
        block.decr_read_index().unwrap();
        block.decr_read_index().unwrap();
        assert_eq!(block.read().unwrap(), Some(2));

        block.reset_read_index().unwrap();
        assert!(matches!(
            block.decr_read_index(),
            Err(BlockError::CursorUnderflow(_))
        ));
        assert!(matches!(
            block.incr_write_index(),
            Err(BlockError::Unsupported { .. })
        ));
        assert!(matches!(
            block.decr_write_index(),
            Err(BlockError::Unsupported { .. })
        ));
        assert_eq!(block.size(), 3);
    }

    #[test]
    fn test_disk_block_failed_decode_keeps_cursor() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let path = temp_dir.path().join("truncated.block");
        let block = DiskDataBlock::create("truncated".to_string(), &path)
            .unwrap();
        block.put(1u64).unwrap();
        block.put(2u64).unwrap();
        block.flush().unwrap();

        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(4)
            .unwrap();

        let err = block.read().unwrap_err();
        assert!(err.is_storage_fault());
        assert_eq!(block.read_index(), 0);
        assert!(block.read().is_err());
        assert_eq!(block.read_index(), 0);
    }

    #[test]
    fn test_disk_block_label_stays_inside_dir() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let dir = temp_dir.path().join("blocks");
        let block = DiskDataBlock::<u32>::temporary(
            "../../escape/train".to_string(),
            &dir,
        )
        .unwrap();
        assert_eq!(block.path().parent(), Some(dir.as_path()));
        assert_eq!(block.label(), "../../escape/train");
        assert!(!temp_dir.path().join("escape").exists());
    }

    #[test]
    fn test_disk_block_temporary_file_removed() {
        let temp_dir =
            TempDir::new("tmp").expect("Failed to create temporary directory");
        let path = {
            let block = DiskDataBlock::<u32>::temporary(
                "scratch".to_string(),
                temp_dir.path(),
            )
            .unwrap();
            block.put(7).unwrap();
            assert!(block.path().exists());
            block.path().to_path_buf()
        };
        assert!(!path.exists());

        let kept = temp_dir.path().join("kept.block");
        drop(DiskDataBlock::<u32>::create("kept".to_string(), &kept).unwrap());
        assert!(kept.exists());
    }
}
