//! Extent allocation bitmap.
//!
//! Layout: `page_allocated (u32) | next_free_page (u32) | bit vector`. Bit `i` lives in byte
//! `i / 8` at position `7 - i % 8`, and is set iff data page `i` of the extent is allocated.

use byteorder::{ByteOrder, LittleEndian};

const PAGE_ALLOCATED_OFFSET: usize = 0;
const NEXT_FREE_PAGE_OFFSET: usize = 4;
const BITMAP_HEADER_SIZE: usize = 8;

/// Bitmap view over a page-sized buffer.
pub struct BitmapPage<D> {
    data: D,
}

impl<D: AsRef<[u8]>> BitmapPage<D> {
    pub fn from_data(data: D) -> Self {
        debug_assert!(data.as_ref().len() > BITMAP_HEADER_SIZE);
        Self { data }
    }

    /// Number of data pages one bitmap of `page_size` bytes can track.
    pub const fn capacity_for(page_size: usize) -> u32 {
        ((page_size - BITMAP_HEADER_SIZE) * 8) as u32
    }

    pub fn max_supported_size(&self) -> u32 {
        Self::capacity_for(self.data.as_ref().len())
    }

    pub fn page_allocated(&self) -> u32 {
        LittleEndian::read_u32(&self.data.as_ref()[PAGE_ALLOCATED_OFFSET..])
    }

    pub fn next_free_page(&self) -> u32 {
        LittleEndian::read_u32(&self.data.as_ref()[NEXT_FREE_PAGE_OFFSET..])
    }

    pub fn is_page_free(&self, page_offset: u32) -> bool {
        if page_offset >= self.max_supported_size() {
            return false;
        }
        let (byte_index, mask) = Self::locate(page_offset);
        self.data.as_ref()[BITMAP_HEADER_SIZE + byte_index] & mask == 0
    }

    fn locate(page_offset: u32) -> (usize, u8) {
        let byte_index = (page_offset / 8) as usize;
        let bit_index = page_offset % 8;
        (byte_index, 0x80u8 >> bit_index)
    }

    fn first_free_from(&self, start: u32) -> Option<u32> {
        (start..self.max_supported_size()).find(|&offset| self.is_page_free(offset))
    }

    pub fn into_inner(self) -> D {
        self.data
    }
}

impl<D: AsRef<[u8]> + AsMut<[u8]>> BitmapPage<D> {
    /// Claim a free slot and return its offset, or `None` when the extent is full.
    pub fn allocate_page(&mut self) -> Option<u32> {
        let capacity = self.max_supported_size();
        if self.page_allocated() >= capacity {
            return None;
        }

        // The hint only narrows the search; fall back to a full scan when it is stale.
        let offset = self
            .first_free_from(self.next_free_page())
            .or_else(|| self.first_free_from(0))?;

        let (byte_index, mask) = Self::locate(offset);
        self.data.as_mut()[BITMAP_HEADER_SIZE + byte_index] |= mask;
        self.set_page_allocated(self.page_allocated() + 1);

        let next = self.first_free_from(offset).unwrap_or(capacity);
        self.set_next_free_page(next);
        Some(offset)
    }

    /// Release a slot. Returns false if it was not allocated.
    pub fn deallocate_page(&mut self, page_offset: u32) -> bool {
        if page_offset >= self.max_supported_size()
            || self.page_allocated() == 0
            || self.is_page_free(page_offset)
        {
            return false;
        }

        let (byte_index, mask) = Self::locate(page_offset);
        self.data.as_mut()[BITMAP_HEADER_SIZE + byte_index] &= !mask;
        self.set_page_allocated(self.page_allocated() - 1);
        if page_offset < self.next_free_page() {
            self.set_next_free_page(page_offset);
        }
        true
    }

    fn set_page_allocated(&mut self, value: u32) {
        LittleEndian::write_u32(&mut self.data.as_mut()[PAGE_ALLOCATED_OFFSET..], value);
    }

    fn set_next_free_page(&mut self, value: u32) {
        LittleEndian::write_u32(&mut self.data.as_mut()[NEXT_FREE_PAGE_OFFSET..], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_capacity() {
        assert_eq!(BitmapPage::<Vec<u8>>::capacity_for(512), 4032);
        assert_eq!(BitmapPage::<Vec<u8>>::capacity_for(4096), 32704);
    }

    #[test]
    fn test_fresh_bitmap_is_free() {
        let bitmap = BitmapPage::from_data(vec![0u8; 64]);
        for i in 0..bitmap.max_supported_size() {
            assert!(bitmap.is_page_free(i));
        }
        assert_eq!(bitmap.page_allocated(), 0);
    }

    #[test]
    fn test_fill_then_reuse_freed_slot() {
        let mut bitmap = BitmapPage::from_data(vec![0u8; 512]);
        let capacity = bitmap.max_supported_size();

        let mut seen = HashSet::new();
        for _ in 0..capacity {
            let offset = bitmap.allocate_page().expect("bitmap should have room");
            assert!(seen.insert(offset), "offset {} handed out twice", offset);
        }
        assert_eq!(bitmap.page_allocated(), capacity);
        assert_eq!(bitmap.allocate_page(), None);

        assert!(bitmap.deallocate_page(233));
        assert_eq!(bitmap.allocate_page(), Some(233));

        for offset in seen {
            assert!(bitmap.deallocate_page(offset));
            assert!(!bitmap.deallocate_page(offset));
        }
        assert_eq!(bitmap.page_allocated(), 0);

        for _ in 0..capacity {
            assert!(bitmap.allocate_page().is_some());
        }
        assert_eq!(bitmap.allocate_page(), None);
    }

    #[test]
    fn test_allocate_deallocate_allocate_same_offset() {
        let mut bitmap = BitmapPage::from_data(vec![0u8; 64]);
        let first = bitmap.allocate_page().unwrap();
        assert!(bitmap.deallocate_page(first));
        assert_eq!(bitmap.allocate_page(), Some(first));
    }

    #[test]
    fn test_deallocate_unallocated_fails() {
        let mut bitmap = BitmapPage::from_data(vec![0u8; 64]);
        assert!(!bitmap.deallocate_page(3));

        bitmap.allocate_page().unwrap();
        assert!(!bitmap.deallocate_page(3));
        assert!(!bitmap.deallocate_page(bitmap.max_supported_size()));
    }

    #[test]
    fn test_hint_rewinds_to_lowest_freed() {
        let mut bitmap = BitmapPage::from_data(vec![0u8; 64]);
        for _ in 0..10 {
            bitmap.allocate_page().unwrap();
        }
        assert_eq!(bitmap.next_free_page(), 10);

        assert!(bitmap.deallocate_page(7));
        assert!(bitmap.deallocate_page(2));
        assert_eq!(bitmap.next_free_page(), 2);

        assert_eq!(bitmap.allocate_page(), Some(2));
        assert_eq!(bitmap.allocate_page(), Some(7));
        assert_eq!(bitmap.allocate_page(), Some(10));
    }

    #[test]
    fn test_stale_hint_falls_back_to_scan() {
        let mut data = vec![0u8; 64];
        // Hint pointing past the end of the bit vector.
        LittleEndian::write_u32(&mut data[NEXT_FREE_PAGE_OFFSET..], 10_000);
        let mut bitmap = BitmapPage::from_data(data);
        assert_eq!(bitmap.allocate_page(), Some(0));
    }
}
