use thiserror::Error;

use super::types::PageId;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum KarstError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, KarstError>;
