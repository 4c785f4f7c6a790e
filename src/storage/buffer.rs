pub mod lru;
pub mod replacer;

use crate::storage::disk::{DiskManager, DiskMetaSnapshot};
use crate::storage::error::StorageError;
use crate::storage::{PageId, PAGE_SIZE};
use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use replacer::{FrameId, Replacer};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Bookkeeping for one frame. Only touched under the pool mutex.
#[derive(Debug, Default, Clone, Copy)]
struct FrameMeta {
    page_id: Option<PageId>,
    pin_count: u32,
    is_dirty: bool,
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    frames: Vec<FrameMeta>,
}

/// Fixed-size page cache over a [`DiskManager`].
///
/// Cloning is cheap and every clone shares the same frames. Pages are handed out as
/// [`PageReadGuard`]/[`PageWriteGuard`], which keep the page pinned and latched until dropped.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    latches: Box<[RwLock<[u8; PAGE_SIZE]>]>,
    state: Mutex<PoolState>,
    replacer: Mutex<Box<dyn Replacer>>,
    disk: Mutex<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(disk: DiskManager, replacer: Box<dyn Replacer>, pool_size: usize) -> Self {
        let latches = (0..pool_size)
            .map(|_| RwLock::new([0u8; PAGE_SIZE]))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        log::info!(
            "buffer pool: {} frames over {:?}",
            pool_size,
            disk.path()
        );

        Self {
            inner: Arc::new(BufferPoolInner {
                latches,
                state: Mutex::new(PoolState {
                    page_table: HashMap::with_capacity(pool_size),
                    free_list: (0..pool_size).collect(),
                    frames: vec![FrameMeta::default(); pool_size],
                }),
                replacer: Mutex::new(replacer),
                disk: Mutex::new(disk),
            }),
        }
    }

    /// Pin `page_id` for reading.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageReadGuard> {
        let frame_id = self.inner.pin_page(page_id)?;
        Ok(PageReadGuard::new(self.inner.clone(), page_id, frame_id))
    }

    /// Pin `page_id` for writing. The page is marked dirty when the guard is dropped.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard> {
        let frame_id = self.inner.pin_page(page_id)?;
        Ok(PageWriteGuard::new(self.inner.clone(), page_id, frame_id))
    }

    /// Allocate a fresh zeroed page on disk and pin it for writing.
    pub fn new_page(&self) -> Result<(PageId, PageWriteGuard)> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let frame_id = inner.acquire_frame(&mut state)?;

        let page_id = match inner.disk.lock().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                log::warn!("page allocation failed: {:#}", e);
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        inner.latches[frame_id].write().fill(0);
        state.page_table.insert(page_id, frame_id);
        state.frames[frame_id] = FrameMeta {
            page_id: Some(page_id),
            pin_count: 1,
            is_dirty: true,
        };
        drop(state);

        Ok((page_id, PageWriteGuard::new(inner.clone(), page_id, frame_id)))
    }

    /// Drop one pin on `page_id`. Returns false if the page is not resident or not pinned.
    ///
    /// Guards call this on drop; calling it directly for a page held through a guard breaks the
    /// pin accounting.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.inner.unpin(page_id, is_dirty)
    }

    /// Evict `page_id` from the pool and release it on disk.
    ///
    /// Returns `Ok(false)` while the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            if state.frames[frame_id].pin_count > 0 {
                log::debug!("refusing to delete pinned page {}", page_id);
                return Ok(false);
            }
            state.page_table.remove(&page_id);
            state.frames[frame_id] = FrameMeta::default();
            inner.replacer.lock().pin(frame_id);
            state.free_list.push_back(frame_id);
        }
        inner.disk.lock().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Write `page_id` back to disk if it is resident. Returns false when it is not.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let frame_id = {
            let mut state = self.inner.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            let frame = &mut state.frames[frame_id];
            // The replacer is left alone so a flush does not change eviction order.
            frame.pin_count += 1;
            // Cleared before the copy so a concurrent writer re-dirties the frame.
            frame.is_dirty = false;
            frame_id
        };

        let guard = PageReadGuard::new(self.inner.clone(), page_id, frame_id);
        let result = self.inner.disk.lock().write_page(page_id, &guard);
        if result.is_err() {
            self.inner.state.lock().frames[frame_id].is_dirty = true;
        }
        drop(guard);
        result.map(|_| true)
    }

    pub fn flush_all_pages(&self) -> Result<()> {
        let dirty: Vec<PageId> = {
            let state = self.inner.state.lock();
            state
                .frames
                .iter()
                .filter(|f| f.is_dirty)
                .filter_map(|f| f.page_id)
                .collect()
        };
        for page_id in dirty {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        self.inner.disk.lock().is_page_free(page_id)
    }

    pub fn disk_meta(&self) -> DiskMetaSnapshot {
        self.inner.disk.lock().meta_snapshot()
    }

    /// Returns true if no frame is pinned. Pinned frames are logged.
    pub fn check_all_unpinned(&self) -> bool {
        let state = self.inner.state.lock();
        let mut all_unpinned = true;
        for (frame_id, frame) in state.frames.iter().enumerate() {
            if frame.pin_count > 0 {
                if let Some(page_id) = frame.page_id {
                    log::warn!(
                        "page {} in frame {} still pinned ({} pins)",
                        page_id,
                        frame_id,
                        frame.pin_count
                    );
                }
                all_unpinned = false;
            }
        }
        all_unpinned
    }

    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| state.frames[frame_id].pin_count)
    }

    pub fn pool_size(&self) -> usize {
        self.inner.latches.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }
}

impl BufferPoolInner {
    /// Pin `page_id` into a frame, reading it from disk if it is not resident.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        DiskManager::map_page_id(page_id)?;

        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.frames[frame_id].pin_count += 1;
            self.replacer.lock().pin(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut state)?;
        {
            let mut data = self.latches[frame_id].write();
            if let Err(e) = self.disk.lock().read_page(page_id, &mut data) {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }
        state.page_table.insert(page_id, frame_id);
        state.frames[frame_id] = FrameMeta {
            page_id: Some(page_id),
            pin_count: 1,
            is_dirty: false,
        };
        Ok(frame_id)
    }

    /// Take a frame from the free list, or evict the replacer's victim.
    ///
    /// A victim is unpinned, so nobody holds its latch.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        // A frame pinned only by a flush is still in the replacer. Skip it; its unpin puts it back.
        let frame_id = loop {
            let frame_id = self
                .replacer
                .lock()
                .victim()
                .ok_or(StorageError::BufferPoolFull)?;
            if state.frames[frame_id].pin_count == 0 {
                break frame_id;
            }
        };

        let victim = state.frames[frame_id];
        if let Some(old_page_id) = victim.page_id {
            if victim.is_dirty {
                let data = self.latches[frame_id].read();
                if let Err(e) = self.disk.lock().write_page(old_page_id, &data) {
                    log::error!("write-back of page {} failed: {:#}", old_page_id, e);
                    self.replacer.lock().unpin(frame_id);
                    return Err(e);
                }
                log::debug!("evicted dirty page {} from frame {}", old_page_id, frame_id);
            }
            state.page_table.remove(&old_page_id);
        }
        state.frames[frame_id] = FrameMeta::default();
        Ok(frame_id)
    }

    fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            log::warn!("unpin of page {} which is not resident", page_id);
            return false;
        };
        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            log::warn!("unpin of page {} which is not pinned", page_id);
            return false;
        }

        frame.pin_count -= 1;
        frame.is_dirty |= is_dirty;
        if frame.pin_count == 0 {
            self.replacer.lock().unpin(frame_id);
        }
        true
    }
}

impl Drop for BufferPoolInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let disk = self.disk.get_mut();
        for (frame_id, frame) in state.frames.iter().enumerate() {
            if let (Some(page_id), true) = (frame.page_id, frame.is_dirty) {
                if let Err(e) = disk.write_page(page_id, self.latches[frame_id].get_mut()) {
                    log::error!("failed to flush page {} on shutdown: {:#}", page_id, e);
                }
            }
        }
        if let Err(e) = disk.close() {
            log::error!("failed to close disk manager: {:#}", e);
        }
    }
}

/// Shared access to a pinned page. Unpins clean on drop.
pub struct PageReadGuard {
    pool: Arc<BufferPoolInner>,
    page_id: PageId,
    frame_id: FrameId,
}

impl PageReadGuard {
    fn new(pool: Arc<BufferPoolInner>, page_id: PageId, frame_id: FrameId) -> Self {
        // Released in `drop`, after which the pin goes too.
        std::mem::forget(pool.latches[frame_id].read());
        Self {
            pool,
            page_id,
            frame_id,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageReadGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.pool.latches[self.frame_id].data_ptr() }
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        unsafe { self.pool.latches[self.frame_id].force_unlock_read() };
        self.pool.unpin(self.page_id, false);
    }
}

/// Exclusive access to a pinned page. Unpins dirty on drop.
pub struct PageWriteGuard {
    pool: Arc<BufferPoolInner>,
    page_id: PageId,
    frame_id: FrameId,
}

impl PageWriteGuard {
    fn new(pool: Arc<BufferPoolInner>, page_id: PageId, frame_id: FrameId) -> Self {
        std::mem::forget(pool.latches[frame_id].write());
        Self {
            pool,
            page_id,
            frame_id,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageWriteGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.pool.latches[self.frame_id].data_ptr() }
    }
}

impl DerefMut for PageWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.pool.latches[self.frame_id].data_ptr() }
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        unsafe { self.pool.latches[self.frame_id].force_unlock_write() };
        self.pool.unpin(self.page_id, true);
    }
}
