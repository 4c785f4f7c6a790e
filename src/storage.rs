//! Storage layer for tidedb.
//!
//! - **DiskManager**: one file of fixed-size pages, grouped into extents whose free space is
//!   tracked by a bitmap page; hands out logical page ids
//! - **BufferPoolManager**: fixed set of in-memory frames with LRU eviction, serving pinned,
//!   latched page guards
//! - **Page views**: typed layouts (B+tree nodes, table pages, index roots) over raw page bytes,
//!   each tagged with a [`PageKind`]

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard};
pub use disk::{DiskManager, BITMAP_SIZE, PAGE_SIZE};
pub use page::{PageId, PageKind};
