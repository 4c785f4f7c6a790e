//! Storage layer error types.

use crate::storage::page::{PageId, PageKind};
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Buffer pool is full: every frame is pinned")]
    BufferPoolFull,

    #[error("Disk is full: no free page in any extent")]
    OutOfPages,

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Invalid page id: {0}")]
    InvalidPageId(u32),

    #[error("Page {page_id} has kind {actual:?}, expected {expected:?}")]
    WrongPageKind {
        page_id: PageId,
        expected: PageKind,
        actual: PageKind,
    },

    #[error("Unknown page kind tag: {0}")]
    UnknownPageKind(u8),

    #[error("Page is full: requires {required} bytes but only {available} available")]
    PageFull { required: usize, available: usize },

    #[error("Invalid slot: {slot} (slot count: {count})")]
    InvalidSlot { slot: u32, count: u32 },

    #[error("Tuple at slot {0} is deleted")]
    TupleDeleted(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted page: {0}")]
    Corrupted(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
