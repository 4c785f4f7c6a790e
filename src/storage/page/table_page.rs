//! Slotted page holding table rows.
//!
//! ```text
//! | HEADER | slot directory -> | ... free ... | <- tuple data |
//! ```
//!
//! Header: `kind (u8) | pad (3) | page_id | lsn | prev | next | free_space_pointer | tuple_count`,
//! all u32. Each slot is `(offset u32, size u32)`. Bit 31 of `size` marks a tuple deleted but not
//! yet reclaimed; a slot with size 0 is empty and may be reused.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageKind, PAGE_KIND_OFFSET};
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::{Deref, DerefMut};

const PAGE_ID_OFFSET: usize = 4;
const LSN_OFFSET: usize = 8;
const PREV_PAGE_OFFSET: usize = 12;
const NEXT_PAGE_OFFSET: usize = 16;
const FREE_SPACE_OFFSET: usize = 20;
const TUPLE_COUNT_OFFSET: usize = 24;
const HEADER_SIZE: usize = 28;
const SLOT_SIZE: usize = 8;

const DELETE_MASK: u32 = 1 << 31;

pub struct TablePage<D> {
    data: D,
}

impl<D> TablePage<D> {
    /// Largest tuple that fits in an otherwise empty page.
    pub const MAX_ROW_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

    fn slot_offset(slot: u32) -> usize {
        HEADER_SIZE + slot as usize * SLOT_SIZE
    }

    fn is_deleted(size: u32) -> bool {
        size & DELETE_MASK != 0 || size == 0
    }

    pub fn into_inner(self) -> D {
        self.data
    }
}

impl<D: Deref<Target = [u8; PAGE_SIZE]>> TablePage<D> {
    pub fn from_data(data: D) -> StorageResult<Self> {
        let page = Self { data };
        PageKind::expect(&page.data, page.page_id(), PageKind::Table)?;
        Ok(page)
    }

    fn read_u32(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(&self.data[offset..])
    }

    pub fn page_id(&self) -> PageId {
        PageId(self.read_u32(PAGE_ID_OFFSET))
    }

    pub fn lsn(&self) -> u32 {
        self.read_u32(LSN_OFFSET)
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        PageId::from_raw(self.read_u32(PREV_PAGE_OFFSET))
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        PageId::from_raw(self.read_u32(NEXT_PAGE_OFFSET))
    }

    fn free_space_pointer(&self) -> usize {
        self.read_u32(FREE_SPACE_OFFSET) as usize
    }

    /// Number of slots, including empty and deleted ones.
    pub fn tuple_count(&self) -> u32 {
        self.read_u32(TUPLE_COUNT_OFFSET)
    }

    fn tuple_offset(&self, slot: u32) -> usize {
        self.read_u32(Self::slot_offset(slot)) as usize
    }

    fn tuple_size(&self, slot: u32) -> u32 {
        self.read_u32(Self::slot_offset(slot) + 4)
    }

    pub fn free_space_remaining(&self) -> usize {
        self.free_space_pointer() - HEADER_SIZE - self.tuple_count() as usize * SLOT_SIZE
    }

    fn check_slot(&self, slot: u32) -> StorageResult<()> {
        let count = self.tuple_count();
        if slot >= count {
            return Err(StorageError::InvalidSlot { slot, count });
        }
        Ok(())
    }

    /// Bytes of the live tuple in `slot`.
    pub fn get_tuple(&self, slot: u32) -> StorageResult<&[u8]> {
        self.check_slot(slot)?;
        let size = self.tuple_size(slot);
        if Self::is_deleted(size) {
            return Err(StorageError::TupleDeleted(slot));
        }
        let offset = self.tuple_offset(slot);
        Ok(&self.data[offset..offset + size as usize])
    }

    fn live_slot_from(&self, start: u32) -> Option<u32> {
        (start..self.tuple_count()).find(|&slot| !Self::is_deleted(self.tuple_size(slot)))
    }

    pub fn first_tuple_slot(&self) -> Option<u32> {
        self.live_slot_from(0)
    }

    pub fn next_tuple_slot(&self, current: u32) -> Option<u32> {
        self.live_slot_from(current + 1)
    }
}

impl<D: DerefMut<Target = [u8; PAGE_SIZE]>> TablePage<D> {
    /// Format `data` as an empty table page linked after `prev`.
    pub fn init(mut data: D, page_id: PageId, prev: Option<PageId>) -> Self {
        data[..HEADER_SIZE].fill(0);
        data[PAGE_KIND_OFFSET] = PageKind::Table as u8;
        let mut page = Self { data };
        page.write_u32(PAGE_ID_OFFSET, page_id.0);
        page.set_prev_page_id(prev);
        page.set_next_page_id(None);
        page.set_free_space_pointer(PAGE_SIZE);
        page
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.data[offset..], value);
    }

    pub fn set_prev_page_id(&mut self, prev: Option<PageId>) {
        self.write_u32(PREV_PAGE_OFFSET, PageId::to_raw(prev));
    }

    pub fn set_next_page_id(&mut self, next: Option<PageId>) {
        self.write_u32(NEXT_PAGE_OFFSET, PageId::to_raw(next));
    }

    fn set_free_space_pointer(&mut self, pointer: usize) {
        self.write_u32(FREE_SPACE_OFFSET, pointer as u32);
    }

    fn set_tuple_count(&mut self, count: u32) {
        self.write_u32(TUPLE_COUNT_OFFSET, count);
    }

    fn set_slot(&mut self, slot: u32, offset: usize, size: u32) {
        let at = Self::slot_offset(slot);
        self.write_u32(at, offset as u32);
        self.write_u32(at + 4, size);
    }

    /// Store `tuple` and return its slot. Empty slots are reused before the directory grows.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> StorageResult<u32> {
        if tuple.is_empty() {
            return Err(StorageError::Corrupted("empty tuple".to_string()));
        }

        let count = self.tuple_count();
        let free_slot = (0..count).find(|&slot| self.tuple_size(slot) == 0);
        let required = tuple.len() + if free_slot.is_some() { 0 } else { SLOT_SIZE };
        let available = self.free_space_remaining();
        if required > available {
            return Err(StorageError::PageFull {
                required,
                available,
            });
        }

        let slot = free_slot.unwrap_or(count);
        let offset = self.free_space_pointer() - tuple.len();
        self.data[offset..offset + tuple.len()].copy_from_slice(tuple);
        self.set_free_space_pointer(offset);
        if slot == count {
            self.set_tuple_count(count + 1);
        }
        self.set_slot(slot, offset, tuple.len() as u32);
        Ok(slot)
    }

    /// Flag the tuple as deleted. Its space is kept until [`apply_delete`](Self::apply_delete).
    pub fn mark_delete(&mut self, slot: u32) -> StorageResult<()> {
        self.check_slot(slot)?;
        let size = self.tuple_size(slot);
        if Self::is_deleted(size) {
            return Err(StorageError::TupleDeleted(slot));
        }
        let offset = self.tuple_offset(slot);
        self.set_slot(slot, offset, size | DELETE_MASK);
        Ok(())
    }

    pub fn rollback_delete(&mut self, slot: u32) -> StorageResult<()> {
        self.check_slot(slot)?;
        let size = self.tuple_size(slot);
        if size & DELETE_MASK != 0 {
            let offset = self.tuple_offset(slot);
            self.set_slot(slot, offset, size & !DELETE_MASK);
        }
        Ok(())
    }

    /// Replace the tuple in place and return the old bytes. Fails with `PageFull` when the
    /// page cannot absorb the growth.
    pub fn update_tuple(&mut self, slot: u32, tuple: &[u8]) -> StorageResult<Vec<u8>> {
        let old = self.get_tuple(slot)?.to_vec();
        let available = self.free_space_remaining() + old.len();
        if tuple.len() > available {
            return Err(StorageError::PageFull {
                required: tuple.len(),
                available,
            });
        }

        let offset = self.tuple_offset(slot);
        let free = self.free_space_pointer();
        let new_free = free + old.len() - tuple.len();
        // Slide everything stored below this tuple so it ends where it used to start.
        self.data.copy_within(free..offset, new_free);
        let new_offset = offset + old.len() - tuple.len();
        self.data[new_offset..new_offset + tuple.len()].copy_from_slice(tuple);
        self.set_free_space_pointer(new_free);
        self.set_slot(slot, new_offset, tuple.len() as u32);
        self.relocate_below(offset, old.len() as isize - tuple.len() as isize, slot);
        Ok(old)
    }

    /// Reclaim the tuple's space, marked or not, and leave its slot empty.
    pub fn apply_delete(&mut self, slot: u32) -> StorageResult<()> {
        self.check_slot(slot)?;
        let size = self.tuple_size(slot) & !DELETE_MASK;
        if size == 0 {
            return Err(StorageError::TupleDeleted(slot));
        }
        let size = size as usize;
        let offset = self.tuple_offset(slot);
        let free = self.free_space_pointer();
        self.data.copy_within(free..offset, free + size);
        self.data[free..free + size].fill(0);
        self.set_free_space_pointer(free + size);
        self.set_slot(slot, 0, 0);
        self.relocate_below(offset, size as isize, slot);
        Ok(())
    }

    /// Shift the offsets of tuples stored below `boundary` by `delta` bytes.
    fn relocate_below(&mut self, boundary: usize, delta: isize, skip: u32) {
        for other in 0..self.tuple_count() {
            if other == skip || self.tuple_size(other) == 0 {
                continue;
            }
            let offset = self.tuple_offset(other);
            if offset < boundary {
                let size = self.tuple_size(other);
                self.set_slot(other, (offset as isize + delta) as usize, size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> TablePage<Box<[u8; PAGE_SIZE]>> {
        TablePage::init(Box::new([0u8; PAGE_SIZE]), PageId(3), Some(PageId(2)))
    }

    #[test]
    fn test_init() {
        let page = page();
        assert_eq!(page.page_id(), PageId(3));
        assert_eq!(page.prev_page_id(), Some(PageId(2)));
        assert_eq!(page.next_page_id(), None);
        assert_eq!(page.tuple_count(), 0);
        assert_eq!(page.free_space_remaining(), PAGE_SIZE - HEADER_SIZE);
        assert_eq!(page.first_tuple_slot(), None);
    }

    #[test]
    fn test_insert_and_get() -> StorageResult<()> {
        let mut page = page();
        assert_eq!(page.insert_tuple(b"first")?, 0);
        assert_eq!(page.insert_tuple(b"second")?, 1);
        assert_eq!(page.get_tuple(0)?, b"first");
        assert_eq!(page.get_tuple(1)?, b"second");
        assert!(matches!(
            page.get_tuple(2),
            Err(StorageError::InvalidSlot { slot: 2, count: 2 })
        ));
        Ok(())
    }

    #[test]
    fn test_mark_rollback_apply() -> StorageResult<()> {
        let mut page = page();
        for word in [&b"aaaa"[..], b"bb", b"cccccc"] {
            page.insert_tuple(word)?;
        }

        page.mark_delete(1)?;
        assert!(matches!(page.get_tuple(1), Err(StorageError::TupleDeleted(1))));
        assert!(page.mark_delete(1).is_err());
        assert_eq!(page.next_tuple_slot(0), Some(2));

        page.rollback_delete(1)?;
        assert_eq!(page.get_tuple(1)?, b"bb");

        let before = page.free_space_remaining();
        page.mark_delete(0)?;
        page.apply_delete(0)?;
        assert_eq!(page.free_space_remaining(), before + 4);
        assert_eq!(page.first_tuple_slot(), Some(1));
        assert_eq!(page.get_tuple(1)?, b"bb");
        assert_eq!(page.get_tuple(2)?, b"cccccc");

        // The emptied slot is reused.
        assert_eq!(page.insert_tuple(b"dd")?, 0);
        assert_eq!(page.get_tuple(0)?, b"dd");
        Ok(())
    }

    #[test]
    fn test_update_in_place() -> StorageResult<()> {
        let mut page = page();
        page.insert_tuple(b"one")?;
        page.insert_tuple(b"two")?;
        page.insert_tuple(b"three")?;

        assert_eq!(page.update_tuple(1, b"a much longer value")?, b"two");
        assert_eq!(page.get_tuple(0)?, b"one");
        assert_eq!(page.get_tuple(1)?, b"a much longer value");
        assert_eq!(page.get_tuple(2)?, b"three");

        page.update_tuple(0, b"1")?;
        assert_eq!(page.get_tuple(0)?, b"1");
        assert_eq!(page.get_tuple(1)?, b"a much longer value");
        assert_eq!(page.get_tuple(2)?, b"three");
        Ok(())
    }

    #[test]
    fn test_page_full() -> StorageResult<()> {
        let mut page = page();
        let big = vec![0xAB; 1000];
        let mut inserted = 0;
        loop {
            match page.insert_tuple(&big) {
                Ok(_) => inserted += 1,
                Err(StorageError::PageFull { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        assert_eq!(inserted, 4);
        assert!(page.update_tuple(0, &vec![0; 2000]).is_err());
        assert_eq!(TablePage::<Box<[u8; PAGE_SIZE]>>::MAX_ROW_SIZE, PAGE_SIZE - 36);
        Ok(())
    }
}
