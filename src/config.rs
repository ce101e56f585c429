use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::base_block::DataBlock;
use crate::disk_block::DiskDataBlock;
use crate::memory_block::MemoryDataBlock;
use crate::spilling_block::SpillingDataBlock;
use crate::{BlockError, Result};

pub const DEFAULT_MAX_MEMORY_RECORDS: usize = 100_000;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    #[default]
    Memory,
    Disk,
    Spilling,
}

/// Which backend stores a data block, and where.
///
/// ```json
/// { "label": "train", "kind": "spilling", "dir": "/tmp/blocks",
///   "max_memory_records": 50000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub label: String,
    pub kind: BlockKind,
    pub dir: Option<PathBuf>,
    pub max_memory_records: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            label: "data-block".to_owned(),
            kind: BlockKind::default(),
            dir: None,
            max_memory_records: DEFAULT_MAX_MEMORY_RECORDS,
        }
    }
}

impl BlockConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        log::info!(
            "Loaded {:?} block config {} from {}",
            config.kind,
            config.label,
            path.display()
        );
        Ok(config)
    }

    fn dir(&self) -> Result<&Path> {
        self.dir.as_deref().ok_or_else(|| {
            BlockError::Config(format!(
                "{:?} block {} requires a directory",
                self.kind, self.label
            ))
        })
    }

    /// Build an empty block of the configured kind.
    pub fn open<V>(&self) -> Result<Box<dyn DataBlock<V> + Send + Sync>>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let label = self.label.clone();
        let block: Box<dyn DataBlock<V> + Send + Sync> = match self.kind {
            BlockKind::Memory => Box::new(MemoryDataBlock::new(label)),
            BlockKind::Disk => {
                Box::new(DiskDataBlock::temporary(label, self.dir()?)?)
            }
            BlockKind::Spilling => Box::new(SpillingDataBlock::new(
                label,
                self.dir()?,
                self.max_memory_records,
            )?),
        };
        Ok(block)
    }
}
