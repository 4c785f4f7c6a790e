//! The catalog meta page: where every table and index keeps its metadata record.
//!
//! Layout of the page:
//!
//! ```text
//! | kind (1) | pad (3) | magic (4) | payload_len (4) | bincode payload ... |
//! ```

use crate::access::RecordError;
use crate::catalog::{IndexId, TableId, CATALOG_META_PAGE_ID};
use crate::storage::page::{PageId, PageKind, PAGE_KIND_OFFSET};
use crate::storage::PAGE_SIZE;
use anyhow::{ensure, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CATALOG_META_MAGIC_NUM: u32 = 89849;

const MAGIC_OFFSET: usize = 4;
const PAYLOAD_LEN_OFFSET: usize = 8;
const HEADER_SIZE: usize = 12;

/// Maps each table and index to the page holding its metadata record.
///
/// Ids are never reused: the counters only move forward, even when the newest table or index
/// is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMeta {
    table_meta_pages: BTreeMap<TableId, u32>,
    index_meta_pages: BTreeMap<IndexId, u32>,
    next_table_id: u32,
    next_index_id: u32,
}

impl CatalogMeta {
    pub fn table_meta_pages(&self) -> impl Iterator<Item = (TableId, PageId)> + '_ {
        self.table_meta_pages.iter().map(|(&id, &page)| (id, PageId(page)))
    }

    pub fn index_meta_pages(&self) -> impl Iterator<Item = (IndexId, PageId)> + '_ {
        self.index_meta_pages.iter().map(|(&id, &page)| (id, PageId(page)))
    }

    pub fn add_table(&mut self, table_id: TableId, page_id: PageId) {
        self.table_meta_pages.insert(table_id, page_id.0);
        self.next_table_id = self.next_table_id.max(table_id.0 + 1);
    }

    pub fn add_index(&mut self, index_id: IndexId, page_id: PageId) {
        self.index_meta_pages.insert(index_id, page_id.0);
        self.next_index_id = self.next_index_id.max(index_id.0 + 1);
    }

    /// Forget the table, returning its metadata page.
    pub fn remove_table(&mut self, table_id: TableId) -> Option<PageId> {
        self.table_meta_pages.remove(&table_id).map(PageId)
    }

    pub fn remove_index(&mut self, index_id: IndexId) -> Option<PageId> {
        self.index_meta_pages.remove(&index_id).map(PageId)
    }

    /// Id the next [`add_table`](Self::add_table) should use.
    pub fn next_table_id(&self) -> TableId {
        TableId(self.next_table_id)
    }

    pub fn next_index_id(&self) -> IndexId {
        IndexId(self.next_index_id)
    }

    /// Overwrite `data` with this meta, tagged as [`PageKind::CatalogMeta`].
    pub fn write_to(&self, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let payload = bincode::serialize(self)?;
        ensure!(
            payload.len() <= PAGE_SIZE - HEADER_SIZE,
            "catalog meta of {} bytes overflows its page",
            payload.len()
        );
        data.fill(0);
        data[PAGE_KIND_OFFSET] = PageKind::CatalogMeta as u8;
        LittleEndian::write_u32(&mut data[MAGIC_OFFSET..], CATALOG_META_MAGIC_NUM);
        LittleEndian::write_u32(&mut data[PAYLOAD_LEN_OFFSET..], payload.len() as u32);
        data[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(&payload);
        Ok(())
    }

    pub fn read_from(data: &[u8; PAGE_SIZE]) -> Result<Self> {
        PageKind::expect(data, CATALOG_META_PAGE_ID, PageKind::CatalogMeta)?;
        let magic = LittleEndian::read_u32(&data[MAGIC_OFFSET..]);
        if magic != CATALOG_META_MAGIC_NUM {
            return Err(RecordError::MagicMismatch {
                what: "catalog meta",
                expected: CATALOG_META_MAGIC_NUM,
                actual: magic,
            }
            .into());
        }
        let len = LittleEndian::read_u32(&data[PAYLOAD_LEN_OFFSET..]) as usize;
        ensure!(
            len <= PAGE_SIZE - HEADER_SIZE,
            "catalog meta payload length {} is out of bounds",
            len
        );
        Ok(bincode::deserialize(&data[HEADER_SIZE..HEADER_SIZE + len])?)
    }
}
