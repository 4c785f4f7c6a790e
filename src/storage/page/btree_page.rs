//! Header shared by B+tree internal and leaf pages.
//!
//! Layout: `kind (u8) | pad (3) | lsn (u32) | size (u32) | max_size (u32) | parent (u32) | page_id (u32)`.
//! Leaf pages follow it with `next_page_id (u32)`.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageKind, PAGE_KIND_OFFSET};
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::{Deref, DerefMut};

const LSN_OFFSET: usize = 4;
const SIZE_OFFSET: usize = 8;
const MAX_SIZE_OFFSET: usize = 12;
const PARENT_OFFSET: usize = 16;
const PAGE_ID_OFFSET: usize = 20;

pub const BTREE_HEADER_SIZE: usize = 24;

/// View over the common header of any B+tree page.
pub struct BTreePageHeader<D> {
    data: D,
}

impl<D: Deref<Target = [u8; PAGE_SIZE]>> BTreePageHeader<D> {
    /// Fails unless the page is tagged as a leaf or internal node.
    pub fn from_data(data: D) -> StorageResult<Self> {
        match PageKind::of(&data)? {
            PageKind::BTreeLeaf | PageKind::BTreeInternal => Ok(Self { data }),
            actual => Err(StorageError::WrongPageKind {
                page_id: PageId(LittleEndian::read_u32(&data[PAGE_ID_OFFSET..])),
                expected: PageKind::BTreeLeaf,
                actual,
            }),
        }
    }

    pub(crate) fn wrap(data: D) -> Self {
        Self { data }
    }

    pub fn kind(&self) -> PageKind {
        if self.data[PAGE_KIND_OFFSET] == PageKind::BTreeLeaf as u8 {
            PageKind::BTreeLeaf
        } else {
            PageKind::BTreeInternal
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == PageKind::BTreeLeaf
    }

    pub fn lsn(&self) -> u32 {
        LittleEndian::read_u32(&self.data[LSN_OFFSET..])
    }

    pub fn size(&self) -> usize {
        LittleEndian::read_u32(&self.data[SIZE_OFFSET..]) as usize
    }

    pub fn max_size(&self) -> usize {
        LittleEndian::read_u32(&self.data[MAX_SIZE_OFFSET..]) as usize
    }

    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        PageId::from_raw(LittleEndian::read_u32(&self.data[PARENT_OFFSET..]))
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id().is_none()
    }

    pub fn page_id(&self) -> PageId {
        PageId(LittleEndian::read_u32(&self.data[PAGE_ID_OFFSET..]))
    }
}

impl<D: DerefMut<Target = [u8; PAGE_SIZE]>> BTreePageHeader<D> {
    pub(crate) fn init(
        &mut self,
        kind: PageKind,
        page_id: PageId,
        parent: Option<PageId>,
        max_size: usize,
    ) {
        self.data[..BTREE_HEADER_SIZE].fill(0);
        self.data[PAGE_KIND_OFFSET] = kind as u8;
        self.set_size(0);
        self.set_max_size(max_size);
        self.set_parent_page_id(parent);
        LittleEndian::write_u32(&mut self.data[PAGE_ID_OFFSET..], page_id.0);
    }

    pub fn set_lsn(&mut self, lsn: u32) {
        LittleEndian::write_u32(&mut self.data[LSN_OFFSET..], lsn);
    }

    pub fn set_size(&mut self, size: usize) {
        LittleEndian::write_u32(&mut self.data[SIZE_OFFSET..], size as u32);
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        LittleEndian::write_u32(&mut self.data[MAX_SIZE_OFFSET..], max_size as u32);
    }

    pub fn set_parent_page_id(&mut self, parent: Option<PageId>) {
        LittleEndian::write_u32(&mut self.data[PARENT_OFFSET..], PageId::to_raw(parent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields() -> StorageResult<()> {
        let mut buf = [0u8; PAGE_SIZE];
        assert!(BTreePageHeader::from_data(&buf).is_err());

        BTreePageHeader::wrap(&mut buf).init(PageKind::BTreeInternal, PageId(9), None, 6);
        let header = BTreePageHeader::from_data(&buf)?;
        assert!(!header.is_leaf());
        assert!(header.is_root());
        assert_eq!(header.page_id(), PageId(9));
        assert_eq!(header.max_size(), 6);
        assert_eq!(header.min_size(), 3);
        assert_eq!(header.size(), 0);

        let mut header = BTreePageHeader::wrap(&mut buf);
        header.set_parent_page_id(Some(PageId(2)));
        header.set_size(4);
        assert_eq!(header.parent_page_id(), Some(PageId(2)));
        assert_eq!(header.size(), 4);
        Ok(())
    }
}
