//! Sequential record storage for multi-epoch training.
//!
//! A [`DataBlock`] is written once by a loader and read repeatedly by
//! training workers. Three backends are provided:
//!
//! - [`MemoryDataBlock`] keeps records in memory and supports every
//!   operation, including `get`, `shuffle` and `slice`.
//! - [`DiskDataBlock`] appends records to a file and reads them back
//!   sequentially.
//! - [`SpillingDataBlock`] keeps a bounded number of records in memory and
//!   spills the rest to disk.

pub mod base_block;
pub mod config;
pub mod cursor;
pub mod disk_block;
mod errors;
pub mod memory_block;
pub mod spilling_block;

pub use base_block::DataBlock;
pub use config::{BlockConfig, BlockKind};
pub use cursor::Cursors;
pub use disk_block::DiskDataBlock;
pub use errors::{BlockError, Result};
pub use memory_block::MemoryDataBlock;
pub use spilling_block::SpillingDataBlock;
