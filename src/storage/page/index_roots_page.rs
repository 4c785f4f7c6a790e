//! Registry of B+tree roots, keyed by index id.
//!
//! Layout: `kind (u8) | pad (3) | count (u32) | (index_id u32, root_page_id u32) * count`.

use crate::storage::error::StorageResult;
use crate::storage::page::{PageId, PageKind, PAGE_KIND_OFFSET};
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::{Deref, DerefMut};

const COUNT_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;
const ENTRY_SIZE: usize = 8;

/// Fixed location of the roots page; logical page 0 holds the catalog meta.
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(1);

/// Maximum number of indexes one roots page can track.
pub const MAX_INDEX_ROOTS: usize = (PAGE_SIZE - ENTRIES_OFFSET) / ENTRY_SIZE;

pub struct IndexRootsPage<D> {
    data: D,
}

impl<D: Deref<Target = [u8; PAGE_SIZE]>> IndexRootsPage<D> {
    pub fn from_data(data: D) -> StorageResult<Self> {
        PageKind::expect(&data, INDEX_ROOTS_PAGE_ID, PageKind::IndexRoots)?;
        Ok(Self { data })
    }

    pub fn count(&self) -> usize {
        LittleEndian::read_u32(&self.data[COUNT_OFFSET..]) as usize
    }

    fn entry(&self, slot: usize) -> (u32, PageId) {
        let offset = ENTRIES_OFFSET + slot * ENTRY_SIZE;
        (
            LittleEndian::read_u32(&self.data[offset..]),
            PageId(LittleEndian::read_u32(&self.data[offset + 4..])),
        )
    }

    fn slot_of(&self, index_id: u32) -> Option<usize> {
        (0..self.count()).find(|&slot| self.entry(slot).0 == index_id)
    }

    pub fn get_root_id(&self, index_id: u32) -> Option<PageId> {
        self.slot_of(index_id).map(|slot| self.entry(slot).1)
    }

    /// All registered `(index_id, root)` pairs.
    pub fn entries(&self) -> Vec<(u32, PageId)> {
        (0..self.count()).map(|slot| self.entry(slot)).collect()
    }
}

impl<D: DerefMut<Target = [u8; PAGE_SIZE]>> IndexRootsPage<D> {
    pub fn init(mut data: D) -> Self {
        data.fill(0);
        data[PAGE_KIND_OFFSET] = PageKind::IndexRoots as u8;
        Self { data }
    }

    fn set_count(&mut self, count: usize) {
        LittleEndian::write_u32(&mut self.data[COUNT_OFFSET..], count as u32);
    }

    fn set_entry(&mut self, slot: usize, index_id: u32, root: PageId) {
        let offset = ENTRIES_OFFSET + slot * ENTRY_SIZE;
        LittleEndian::write_u32(&mut self.data[offset..], index_id);
        LittleEndian::write_u32(&mut self.data[offset + 4..], root.0);
    }

    /// Register a new index. Fails if it is already present or the page is full.
    pub fn insert(&mut self, index_id: u32, root: PageId) -> bool {
        let count = self.count();
        if count >= MAX_INDEX_ROOTS || self.slot_of(index_id).is_some() {
            return false;
        }
        self.set_entry(count, index_id, root);
        self.set_count(count + 1);
        true
    }

    pub fn update(&mut self, index_id: u32, root: PageId) -> bool {
        match self.slot_of(index_id) {
            Some(slot) => {
                self.set_entry(slot, index_id, root);
                true
            }
            None => false,
        }
    }

    /// Forget an index. The last entry takes the freed slot.
    pub fn delete(&mut self, index_id: u32) -> bool {
        let Some(slot) = self.slot_of(index_id) else {
            return false;
        };
        let last = self.count() - 1;
        let (last_id, last_root) = self.entry(last);
        self.set_entry(slot, last_id, last_root);
        self.set_count(last);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_registry() -> StorageResult<()> {
        let mut buf = [0u8; PAGE_SIZE];
        assert!(IndexRootsPage::from_data(&buf).is_err());

        let mut roots = IndexRootsPage::init(&mut buf);
        assert!(roots.insert(1, PageId(10)));
        assert!(roots.insert(2, PageId(20)));
        assert!(roots.insert(3, PageId(30)));
        assert!(!roots.insert(2, PageId(99)));

        assert!(roots.update(2, PageId(21)));
        assert!(!roots.update(7, PageId(70)));
        assert!(roots.delete(1));
        assert!(!roots.delete(1));

        let roots = IndexRootsPage::from_data(&buf)?;
        assert_eq!(roots.count(), 2);
        assert_eq!(roots.get_root_id(1), None);
        assert_eq!(roots.get_root_id(2), Some(PageId(21)));
        assert_eq!(roots.get_root_id(3), Some(PageId(30)));
        Ok(())
    }
}
