pub mod disk_manager;

pub use disk_manager::{DiskManager, DiskMetaSnapshot, BITMAP_SIZE, PAGE_SIZE};
