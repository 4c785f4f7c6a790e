pub mod bitmap_page;
pub mod btree_internal_page;
pub mod btree_leaf_page;
pub mod btree_page;
pub mod disk_meta_page;
pub mod index_roots_page;
pub mod table_page;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::PAGE_SIZE;
use std::fmt;

/// On-disk encoding of "no page".
pub const INVALID_PAGE_ID: u32 = u32::MAX;

/// Logical page id, as handed out by the disk manager's allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Decode a page id field, mapping the invalid sentinel to `None`.
    pub fn from_raw(raw: u32) -> Option<PageId> {
        if raw == INVALID_PAGE_ID {
            None
        } else {
            Some(PageId(raw))
        }
    }

    /// Encode an optional page id for storage in a page field.
    pub fn to_raw(page_id: Option<PageId>) -> u32 {
        page_id.map(|p| p.0).unwrap_or(INVALID_PAGE_ID)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Offset of the kind tag shared by every structured buffer-pool page.
pub const PAGE_KIND_OFFSET: usize = 0;

/// Layout tag written at offset 0 of every structured page served by the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKind {
    Free = 0,
    BTreeInternal = 1,
    BTreeLeaf = 2,
    Table = 3,
    IndexRoots = 4,
    CatalogMeta = 5,
    Metadata = 6,
}

impl PageKind {
    pub fn from_u8(tag: u8) -> StorageResult<Self> {
        match tag {
            0 => Ok(PageKind::Free),
            1 => Ok(PageKind::BTreeInternal),
            2 => Ok(PageKind::BTreeLeaf),
            3 => Ok(PageKind::Table),
            4 => Ok(PageKind::IndexRoots),
            5 => Ok(PageKind::CatalogMeta),
            6 => Ok(PageKind::Metadata),
            other => Err(StorageError::UnknownPageKind(other)),
        }
    }

    /// Read the tag of a page image.
    pub fn of(data: &[u8; PAGE_SIZE]) -> StorageResult<Self> {
        Self::from_u8(data[PAGE_KIND_OFFSET])
    }

    /// Fail unless `data` carries the `expected` tag.
    pub fn expect(data: &[u8; PAGE_SIZE], page_id: PageId, expected: PageKind) -> StorageResult<()> {
        let actual = Self::of(data)?;
        if actual != expected {
            return Err(StorageError::WrongPageKind {
                page_id,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

pub use bitmap_page::BitmapPage;
pub use btree_internal_page::BTreeInternalPage;
pub use btree_leaf_page::BTreeLeafPage;
pub use btree_page::BTreePageHeader;
pub use disk_meta_page::DiskMetaPage;
pub use index_roots_page::{IndexRootsPage, INDEX_ROOTS_PAGE_ID};
pub use table_page::TablePage;
