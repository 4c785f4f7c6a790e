//! Physical page 0: allocation summary for the whole file.
//!
//! Layout: `num_allocated_pages (u32) | num_extents (u32) | extent_used_page[num_extents] (u32 each)`.

use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::{Deref, DerefMut};

const NUM_ALLOCATED_OFFSET: usize = 0;
const NUM_EXTENTS_OFFSET: usize = 4;
const EXTENT_USED_OFFSET: usize = 8;

/// Upper bound on the number of extents one meta page can describe.
pub const MAX_EXTENTS: u32 = ((PAGE_SIZE - EXTENT_USED_OFFSET) / 4) as u32;

pub struct DiskMetaPage<D> {
    data: D,
}

impl<D: Deref<Target = [u8; PAGE_SIZE]>> DiskMetaPage<D> {
    pub fn from_data(data: D) -> Self {
        Self { data }
    }

    pub fn num_allocated_pages(&self) -> u32 {
        LittleEndian::read_u32(&self.data[NUM_ALLOCATED_OFFSET..])
    }

    pub fn num_extents(&self) -> u32 {
        LittleEndian::read_u32(&self.data[NUM_EXTENTS_OFFSET..])
    }

    pub fn extent_used_page(&self, extent_id: u32) -> u32 {
        if extent_id >= MAX_EXTENTS {
            return 0;
        }
        LittleEndian::read_u32(&self.data[Self::extent_offset(extent_id)..])
    }

    fn extent_offset(extent_id: u32) -> usize {
        EXTENT_USED_OFFSET + extent_id as usize * 4
    }
}

impl<D: DerefMut<Target = [u8; PAGE_SIZE]>> DiskMetaPage<D> {
    pub fn set_num_allocated_pages(&mut self, value: u32) {
        LittleEndian::write_u32(&mut self.data[NUM_ALLOCATED_OFFSET..], value);
    }

    pub fn set_num_extents(&mut self, value: u32) {
        LittleEndian::write_u32(&mut self.data[NUM_EXTENTS_OFFSET..], value);
    }

    pub fn set_extent_used_page(&mut self, extent_id: u32, value: u32) {
        assert!(extent_id < MAX_EXTENTS, "extent {} out of range", extent_id);
        let offset = Self::extent_offset(extent_id);
        LittleEndian::write_u32(&mut self.data[offset..], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_fields() {
        let mut buf = [0u8; PAGE_SIZE];
        {
            let mut meta = DiskMetaPage::from_data(&mut buf);
            assert_eq!(meta.num_extents(), 0);
            meta.set_num_allocated_pages(12);
            meta.set_num_extents(2);
            meta.set_extent_used_page(0, 10);
            meta.set_extent_used_page(1, 2);
        }

        let meta = DiskMetaPage::from_data(&buf);
        assert_eq!(meta.num_allocated_pages(), 12);
        assert_eq!(meta.num_extents(), 2);
        assert_eq!(meta.extent_used_page(0), 10);
        assert_eq!(meta.extent_used_page(1), 2);
        assert_eq!(meta.extent_used_page(MAX_EXTENTS), 0);
    }
}
