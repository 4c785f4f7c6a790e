//! Bitmap-managed page file.
//!
//! Physical page 0 holds the [`DiskMetaPage`]. The rest of the file is a sequence of extents, each
//! one bitmap page followed by `BITMAP_SIZE` data pages. Callers only ever see logical page ids,
//! which number the data pages densely across extents.

use crate::storage::error::StorageError;
use crate::storage::page::disk_meta_page::MAX_EXTENTS;
use crate::storage::page::{BitmapPage, DiskMetaPage, PageId, INVALID_PAGE_ID};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const PAGE_SIZE: usize = 4096;

/// Number of data pages tracked by one bitmap page.
pub const BITMAP_SIZE: u32 = BitmapPage::<&[u8]>::capacity_for(PAGE_SIZE);

const META_PHYSICAL_PAGE: u64 = 0;

/// Allocation counters read from the meta page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskMetaSnapshot {
    pub num_allocated_pages: u32,
    pub num_extents: u32,
    pub extent_used_pages: Vec<u32>,
}

pub struct DiskManager {
    file: File,
    path: PathBuf,
    meta: Box<[u8; PAGE_SIZE]>,
    closed: bool,
}

impl DiskManager {
    /// Create a fresh database file, truncating anything already at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;

        let mut dm = Self {
            file,
            path: path.to_path_buf(),
            meta: Box::new([0u8; PAGE_SIZE]),
            closed: false,
        };
        dm.write_meta()?;
        log::debug!("created database file {:?}", path);
        Ok(dm)
    }

    /// Open an existing database file, or create it when missing.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::create(path);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open file: {:?}", path))?;

        let mut dm = Self {
            file,
            path: path.to_path_buf(),
            meta: Box::new([0u8; PAGE_SIZE]),
            closed: false,
        };
        let mut meta = Box::new([0u8; PAGE_SIZE]);
        dm.read_physical(META_PHYSICAL_PAGE, &mut meta)
            .context("Failed to read meta page")?;
        dm.meta = meta;

        let snapshot = dm.meta_snapshot();
        log::debug!(
            "opened {:?}: {} pages in {} extents",
            path,
            snapshot.num_allocated_pages,
            snapshot.num_extents
        );
        Ok(dm)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a logical page. Pages beyond the end of the file read as zeros.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let physical = Self::map_page_id(page_id)?;
        self.read_physical(physical, buf)
            .with_context(|| format!("Failed to read page {}", page_id))
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let physical = Self::map_page_id(page_id)?;
        self.write_physical(physical, data)
            .with_context(|| format!("Failed to write page {}", page_id))
    }

    /// Claim the lowest free data page of the first extent with room.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let meta = DiskMetaPage::from_data(&*self.meta);
        let num_extents = meta.num_extents();
        let extent_id = match (0..num_extents).find(|&e| meta.extent_used_page(e) < BITMAP_SIZE) {
            Some(extent_id) => extent_id,
            None if num_extents < MAX_EXTENTS => num_extents,
            None => return Err(StorageError::OutOfPages.into()),
        };

        let bitmap_physical = Self::bitmap_physical(extent_id);
        let mut bitmap = Box::new([0u8; PAGE_SIZE]);
        self.read_physical(bitmap_physical, &mut bitmap)?;

        let original = bitmap.clone();
        let offset = {
            let mut page = BitmapPage::from_data(&mut bitmap[..]);
            page.allocate_page().ok_or_else(|| {
                StorageError::Corrupted(format!(
                    "extent {} bitmap is full but meta reports free pages",
                    extent_id
                ))
            })?
        };
        self.write_physical(bitmap_physical, &bitmap)?;

        let counted = self.update_meta(|meta| {
            if extent_id == num_extents {
                meta.set_num_extents(num_extents + 1);
            }
            meta.set_extent_used_page(extent_id, meta.extent_used_page(extent_id) + 1);
            meta.set_num_allocated_pages(meta.num_allocated_pages() + 1);
        });
        if let Err(e) = counted {
            self.restore_bitmap(bitmap_physical, &original);
            return Err(e);
        }

        let page_id = PageId(extent_id * BITMAP_SIZE + offset);
        log::trace!("allocated page {}", page_id);
        Ok(page_id)
    }

    /// Return a page to its extent and zero its contents. Returns false if it was not allocated.
    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<bool> {
        let (extent_id, offset) = Self::split(page_id);
        if extent_id >= DiskMetaPage::from_data(&*self.meta).num_extents() {
            log::warn!("deallocate of page {} outside any extent", page_id);
            return Ok(false);
        }

        let bitmap_physical = Self::bitmap_physical(extent_id);
        let mut bitmap = Box::new([0u8; PAGE_SIZE]);
        self.read_physical(bitmap_physical, &mut bitmap)?;
        let original = bitmap.clone();
        if !BitmapPage::from_data(&mut bitmap[..]).deallocate_page(offset) {
            log::warn!("deallocate of page {} which is not allocated", page_id);
            return Ok(false);
        }
        self.write_page(page_id, &[0u8; PAGE_SIZE])?;
        self.write_physical(bitmap_physical, &bitmap)?;

        let counted = self.update_meta(|meta| {
            meta.set_extent_used_page(extent_id, meta.extent_used_page(extent_id) - 1);
            meta.set_num_allocated_pages(meta.num_allocated_pages() - 1);
        });
        if let Err(e) = counted {
            self.restore_bitmap(bitmap_physical, &original);
            return Err(e);
        }

        log::trace!("deallocated page {}", page_id);
        Ok(true)
    }

    pub fn is_page_free(&mut self, page_id: PageId) -> Result<bool> {
        let (extent_id, offset) = Self::split(page_id);
        if extent_id >= DiskMetaPage::from_data(&*self.meta).num_extents() {
            return Ok(true);
        }
        let mut bitmap = Box::new([0u8; PAGE_SIZE]);
        self.read_physical(Self::bitmap_physical(extent_id), &mut bitmap)?;
        Ok(BitmapPage::from_data(&bitmap[..]).is_page_free(offset))
    }

    pub fn meta_snapshot(&self) -> DiskMetaSnapshot {
        let meta = DiskMetaPage::from_data(&*self.meta);
        let num_extents = meta.num_extents();
        DiskMetaSnapshot {
            num_allocated_pages: meta.num_allocated_pages(),
            num_extents,
            extent_used_pages: (0..num_extents).map(|e| meta.extent_used_page(e)).collect(),
        }
    }

    /// Logical page id to physical page number in the file.
    pub fn map_page_id(page_id: PageId) -> Result<u64> {
        if page_id.0 == INVALID_PAGE_ID {
            return Err(StorageError::InvalidPageId(page_id.0).into());
        }
        let (extent_id, _) = Self::split(page_id);
        Ok(page_id.0 as u64 + extent_id as u64 + 2)
    }

    /// Persist the meta page and sync the file. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.write_meta()?;
        self.file.sync_all().context("Failed to sync")?;
        self.closed = true;
        log::debug!("closed {:?}", self.path);
        Ok(())
    }

    fn split(page_id: PageId) -> (u32, u32) {
        (page_id.0 / BITMAP_SIZE, page_id.0 % BITMAP_SIZE)
    }

    fn bitmap_physical(extent_id: u32) -> u64 {
        extent_id as u64 * (BITMAP_SIZE as u64 + 1) + 1
    }

    /// Change the cached meta page and persist it. The cache is left untouched if the write fails.
    fn update_meta(&mut self, update: impl FnOnce(&mut DiskMetaPage<&mut [u8; PAGE_SIZE]>)) -> Result<()> {
        let previous = self.meta.clone();
        update(&mut DiskMetaPage::from_data(&mut *self.meta));
        if let Err(e) = self.write_meta() {
            self.meta = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Put back a bitmap page whose change the meta page never recorded.
    fn restore_bitmap(&mut self, bitmap_physical: u64, original: &[u8; PAGE_SIZE]) {
        if let Err(e) = self.write_physical(bitmap_physical, original) {
            log::error!(
                "failed to restore bitmap page {}; it disagrees with the meta page: {:#}",
                bitmap_physical,
                e
            );
        }
    }

    fn write_meta(&mut self) -> Result<()> {
        let meta = self.meta.clone();
        self.write_physical(META_PHYSICAL_PAGE, &meta)
            .context("Failed to write meta page")
    }

    fn read_physical(&mut self, physical: u64, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let offset = physical * PAGE_SIZE as u64;
        let file_size = self.file.metadata()?.len();
        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .context("Failed to seek")?;
        let mut read = 0;
        while read < PAGE_SIZE {
            let n = self.file.read(&mut buf[read..]).context("Failed to read page")?;
            if n == 0 {
                break;
            }
            read += n;
        }
        buf[read..].fill(0);
        Ok(())
    }

    fn write_physical(&mut self, physical: u64, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let offset = physical * PAGE_SIZE as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .context("Failed to seek")?;
        if let Err(e) = self.file.write_all(data) {
            log::error!("write of physical page {} failed: {}", physical, e);
            return Err(StorageError::Io(e).into());
        }
        self.file.flush().context("Failed to flush")?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("failed to close {:?}: {:#}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_map_page_id() -> Result<()> {
        assert_eq!(DiskManager::map_page_id(PageId(0))?, 2);
        assert_eq!(DiskManager::map_page_id(PageId(BITMAP_SIZE - 1))?, BITMAP_SIZE as u64 + 1);
        assert_eq!(DiskManager::map_page_id(PageId(BITMAP_SIZE))?, BITMAP_SIZE as u64 + 3);
        assert_eq!(DiskManager::bitmap_physical(0), 1);
        assert_eq!(DiskManager::bitmap_physical(1), BITMAP_SIZE as u64 + 2);
        assert!(DiskManager::map_page_id(PageId(INVALID_PAGE_ID)).is_err());
        Ok(())
    }

    #[test]
    fn test_sequential_allocation() -> Result<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::create(&dir.path().join("test.db"))?;

        for i in 0..100 {
            assert_eq!(dm.allocate_page()?, PageId(i));
        }
        let meta = dm.meta_snapshot();
        assert_eq!(meta.num_allocated_pages, 100);
        assert_eq!(meta.num_extents, 1);
        assert_eq!(meta.extent_used_pages, vec![100]);

        assert!(!dm.is_page_free(PageId(42))?);
        assert!(dm.is_page_free(PageId(100))?);
        Ok(())
    }

    #[test]
    fn test_deallocate_and_reuse() -> Result<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::create(&dir.path().join("test.db"))?;
        for _ in 0..10 {
            dm.allocate_page()?;
        }

        assert!(dm.deallocate_page(PageId(3))?);
        assert!(dm.deallocate_page(PageId(7))?);
        assert!(!dm.deallocate_page(PageId(7))?);
        assert!(!dm.deallocate_page(PageId(BITMAP_SIZE * 3))?);
        assert!(dm.is_page_free(PageId(3))?);
        assert_eq!(dm.meta_snapshot().num_allocated_pages, 8);

        assert_eq!(dm.allocate_page()?, PageId(3));
        assert_eq!(dm.allocate_page()?, PageId(7));
        assert_eq!(dm.allocate_page()?, PageId(10));
        Ok(())
    }

    #[test]
    fn test_deallocate_zeroes_page() -> Result<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::create(&dir.path().join("test.db"))?;
        let page_id = dm.allocate_page()?;

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[PAGE_SIZE - 1] = 24;
        dm.write_page(page_id, &data)?;

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut buf)?;
        assert_eq!(buf[0], 42);
        assert_eq!(buf[PAGE_SIZE - 1], 24);

        dm.deallocate_page(page_id)?;
        dm.read_page(page_id, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));
        Ok(())
    }

    fn assert_meta_matches_bitmap(dm: &mut DiskManager) -> Result<()> {
        let meta = dm.meta_snapshot();
        let mut total = 0;
        for (extent_id, &used) in meta.extent_used_pages.iter().enumerate() {
            let mut bitmap = Box::new([0u8; PAGE_SIZE]);
            dm.read_physical(DiskManager::bitmap_physical(extent_id as u32), &mut bitmap)?;
            let page = BitmapPage::from_data(&bitmap[..]);
            assert_eq!(page.page_allocated(), used, "extent {}", extent_id);
            total += used;
        }
        assert_eq!(meta.num_allocated_pages, total);
        Ok(())
    }

    #[test]
    fn test_meta_tracks_bitmap() -> Result<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::create(&dir.path().join("test.db"))?;
        for _ in 0..20 {
            dm.allocate_page()?;
            assert_meta_matches_bitmap(&mut dm)?;
        }
        for page_id in [0, 19, 7, 8] {
            assert!(dm.deallocate_page(PageId(page_id))?);
            assert_meta_matches_bitmap(&mut dm)?;
        }
        assert_eq!(dm.allocate_page()?, PageId(0));
        assert_meta_matches_bitmap(&mut dm)?;
        Ok(())
    }

    #[test]
    fn test_failed_writes_leave_allocation_unchanged() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let mut dm = DiskManager::create(&path)?;
        for _ in 0..4 {
            dm.allocate_page()?;
        }
        let before = dm.meta_snapshot();

        // Every write fails on a read-only handle.
        let writable = std::mem::replace(&mut dm.file, File::open(&path)?);
        assert!(dm.deallocate_page(PageId(2)).is_err());
        assert!(dm.allocate_page().is_err());
        assert_eq!(dm.meta_snapshot(), before);
        assert!(!dm.is_page_free(PageId(2))?);
        assert!(dm.is_page_free(PageId(4))?);
        assert_meta_matches_bitmap(&mut dm)?;

        dm.file = writable;
        assert!(dm.deallocate_page(PageId(2))?);
        assert_eq!(dm.meta_snapshot().num_allocated_pages, 3);
        assert_meta_matches_bitmap(&mut dm)?;
        Ok(())
    }

    #[test]
    fn test_read_past_eof_is_zeroed() -> Result<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::create(&dir.path().join("test.db"))?;
        let mut buf = [7u8; PAGE_SIZE];
        dm.read_page(PageId(500), &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_full_extent_rolls_over() -> Result<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::create(&dir.path().join("test.db"))?;
        assert_eq!(dm.allocate_page()?, PageId(0));

        // Pretend extent 0 is full.
        DiskMetaPage::from_data(&mut *dm.meta).set_extent_used_page(0, BITMAP_SIZE);

        assert_eq!(dm.allocate_page()?, PageId(BITMAP_SIZE));
        let meta = dm.meta_snapshot();
        assert_eq!(meta.num_extents, 2);
        assert_eq!(meta.extent_used_pages, vec![BITMAP_SIZE, 1]);
        Ok(())
    }

    #[test]
    fn test_reopen_preserves_meta() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        {
            let mut dm = DiskManager::create(&path)?;
            for _ in 0..5 {
                dm.allocate_page()?;
            }
            let mut data = [0u8; PAGE_SIZE];
            data[10] = 99;
            dm.write_page(PageId(4), &data)?;
            dm.close()?;
        }

        let mut dm = DiskManager::open(&path)?;
        assert_eq!(dm.meta_snapshot().num_allocated_pages, 5);
        assert_eq!(dm.allocate_page()?, PageId(5));
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(PageId(4), &mut buf)?;
        assert_eq!(buf[10], 99);
        Ok(())
    }
}
