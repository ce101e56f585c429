use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlockError>;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0} {1}")]
    Storage(String, String),
    #[error("{label} does not support {operation}")]
    Unsupported {
        label: String,
        operation: &'static str,
    },
    #[error("Range [{start}, {start} + {length}) is out of bounds for size {size}")]
    OutOfRange {
        start: usize,
        length: usize,
        size: usize,
    },
    #[error("Train data storage is empty or corrupted: {0}")]
    EmptyOrCorrupted(String),
    #[error("Cannot decrement {0} below zero")]
    CursorUnderflow(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BlockError {
    /// Whether the error comes from the backing storage itself
    /// (disk fault, codec fault) rather than from misuse of the block.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Storage(_, _))
    }

    pub(crate) fn unsupported(label: &str, operation: &'static str) -> Self {
        Self::Unsupported {
            label: label.to_owned(),
            operation,
        }
    }
}

impl From<serde_json::Error> for BlockError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}
