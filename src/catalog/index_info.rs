//! Index metadata and the catalog's handle on an open index.
//!
//! Catalog indexes map the order-preserving key encoding of a row's key columns to its
//! [`RowId`]. The tree is instantiated with the narrowest [`GenericKey`] width that holds the
//! encoded key, so each width is its own variant of [`IndexTree`].

use crate::access::btree::BTreeStatistics;
use crate::access::error::RecordResult;
use crate::access::schema::{check_magic, get_string, put_string};
use crate::access::value::ensure_remaining;
use crate::access::{BPlusTree, Field, GenericKey, Row, RowId, Schema};
use crate::catalog::{CatalogError, IndexId, TableId};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::PageId;
use anyhow::{Context, Result};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

pub const INDEX_METADATA_MAGIC_NUM: u32 = 344529;

/// Widest encoded key an index accepts.
pub const MAX_KEY_WIDTH: usize = 64;

/// Persisted description of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub index_id: IndexId,
    pub name: String,
    pub table_id: TableId,
    /// Positions of the key columns in the table schema.
    pub key_columns: Vec<u32>,
}

impl IndexMetadata {
    pub fn serialized_size(&self) -> usize {
        4 + 4 + 4 + self.name.len() + 4 + 4 + 4 * self.key_columns.len()
    }

    pub fn serialize_to(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(INDEX_METADATA_MAGIC_NUM);
        buf.put_u32_le(self.index_id.0);
        put_string(buf, &self.name);
        buf.put_u32_le(self.table_id.0);
        buf.put_u32_le(self.key_columns.len() as u32);
        for &column in &self.key_columns {
            buf.put_u32_le(column);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.serialize_to(&mut buf);
        buf
    }

    pub fn deserialize_from(buf: &mut impl Buf) -> RecordResult<Self> {
        check_magic(buf, "index metadata", INDEX_METADATA_MAGIC_NUM)?;
        ensure_remaining(buf, 4)?;
        let index_id = IndexId(buf.get_u32_le());
        let name = get_string(buf)?;
        ensure_remaining(buf, 8)?;
        let table_id = TableId(buf.get_u32_le());
        let count = buf.get_u32_le() as usize;
        ensure_remaining(buf, count * 4)?;
        let key_columns = (0..count).map(|_| buf.get_u32_le()).collect();
        Ok(Self {
            index_id,
            name,
            table_id,
            key_columns,
        })
    }
}

/// Node sizes for the trees the catalog opens. `None` picks the page-derived default for the
/// tree's key width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSizes {
    pub leaf_max_size: Option<usize>,
    pub internal_max_size: Option<usize>,
}

/// A B+tree from encoded keys to row ids, sized to the key width.
pub enum IndexTree {
    Key4(BPlusTree<GenericKey<4>, RowId>),
    Key8(BPlusTree<GenericKey<8>, RowId>),
    Key16(BPlusTree<GenericKey<16>, RowId>),
    Key32(BPlusTree<GenericKey<32>, RowId>),
    Key64(BPlusTree<GenericKey<64>, RowId>),
}

macro_rules! with_tree {
    ($index:expr, $tree:ident => $body:expr) => {
        match $index {
            IndexTree::Key4($tree) => $body,
            IndexTree::Key8($tree) => $body,
            IndexTree::Key16($tree) => $body,
            IndexTree::Key32($tree) => $body,
            IndexTree::Key64($tree) => $body,
        }
    };
}

fn open_tree<const N: usize>(
    index_id: IndexId,
    buffer_pool: BufferPoolManager,
    sizes: NodeSizes,
) -> Result<BPlusTree<GenericKey<N>, RowId>> {
    let (leaf_max, internal_max) = BPlusTree::<GenericKey<N>, RowId>::default_sizes();
    BPlusTree::new(
        index_id.0,
        buffer_pool,
        sizes.leaf_max_size.unwrap_or(leaf_max),
        sizes.internal_max_size.unwrap_or(internal_max),
    )
}

fn make_key<const N: usize>(bytes: &[u8]) -> Result<GenericKey<N>> {
    GenericKey::from_bytes(bytes).ok_or_else(|| {
        CatalogError::KeyTooWide {
            width: bytes.len(),
            max: N,
        }
        .into()
    })
}

impl IndexTree {
    /// Open the tree of `index_id` for keys of `key_width` bytes.
    pub fn open(
        index_id: IndexId,
        buffer_pool: BufferPoolManager,
        key_width: usize,
        sizes: NodeSizes,
    ) -> Result<Self> {
        Ok(match key_width {
            0..=4 => IndexTree::Key4(open_tree(index_id, buffer_pool, sizes)?),
            5..=8 => IndexTree::Key8(open_tree(index_id, buffer_pool, sizes)?),
            9..=16 => IndexTree::Key16(open_tree(index_id, buffer_pool, sizes)?),
            17..=32 => IndexTree::Key32(open_tree(index_id, buffer_pool, sizes)?),
            33..=MAX_KEY_WIDTH => IndexTree::Key64(open_tree(index_id, buffer_pool, sizes)?),
            width => {
                return Err(CatalogError::KeyTooWide {
                    width,
                    max: MAX_KEY_WIDTH,
                }
                .into())
            }
        })
    }

    /// Width of the keys stored in the tree.
    pub fn key_capacity(&self) -> usize {
        match self {
            IndexTree::Key4(_) => 4,
            IndexTree::Key8(_) => 8,
            IndexTree::Key16(_) => 16,
            IndexTree::Key32(_) => 32,
            IndexTree::Key64(_) => 64,
        }
    }

    pub fn insert(&mut self, key: &[u8], rid: RowId) -> Result<bool> {
        with_tree!(self, tree => tree.insert(&make_key(key)?, &rid))
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        with_tree!(self, tree => tree.remove(&make_key(key)?))
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<RowId>> {
        with_tree!(self, tree => tree.get_value(&make_key(key)?))
    }

    /// Row ids in key order.
    pub fn row_ids(&self) -> Result<Vec<RowId>> {
        self.scan_from(None, usize::MAX)
    }

    /// Up to `limit` row ids in key order, starting at the first key not less than `from`.
    pub fn scan_from(&self, from: Option<&[u8]>, limit: usize) -> Result<Vec<RowId>> {
        with_tree!(self, tree => {
            let cursor = match from {
                Some(key) => tree.lower_bound(&make_key(key)?)?,
                None => tree.begin()?,
            };
            cursor.take(limit).map(|entry| entry.map(|(_, rid)| rid)).collect()
        })
    }

    pub fn is_empty(&self) -> bool {
        with_tree!(self, tree => tree.is_empty())
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        with_tree!(self, tree => tree.root_page_id())
    }

    pub fn destroy(&mut self) -> Result<()> {
        with_tree!(self, tree => tree.destroy())
    }

    pub fn check(&self) -> Result<()> {
        with_tree!(self, tree => tree.check())
    }

    pub fn statistics(&self) -> Result<BTreeStatistics> {
        with_tree!(self, tree => tree.statistics())
    }
}

/// An open index: its metadata, the projected key schema and the tree.
pub struct IndexInfo {
    meta: IndexMetadata,
    key_schema: Schema,
    tree: IndexTree,
}

impl IndexInfo {
    /// Open the index described by `meta` over a table with `table_schema`.
    pub fn open(
        meta: IndexMetadata,
        table_schema: &Schema,
        buffer_pool: BufferPoolManager,
        sizes: NodeSizes,
    ) -> Result<Self> {
        let key_schema = table_schema.key_schema(&meta.key_columns)?;
        let tree = IndexTree::open(meta.index_id, buffer_pool, key_schema.key_width(), sizes)?;
        Ok(Self {
            meta,
            key_schema,
            tree,
        })
    }

    pub fn index_id(&self) -> IndexId {
        self.meta.index_id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id
    }

    pub fn key_columns(&self) -> &[u32] {
        &self.meta.key_columns
    }

    pub fn key_schema(&self) -> &Schema {
        &self.key_schema
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.meta
    }

    pub fn tree(&self) -> &IndexTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut IndexTree {
        &mut self.tree
    }

    /// Encoded key of a full table row.
    pub fn key_of(&self, row: &Row) -> Result<Vec<u8>> {
        Ok(row.key_row(&self.meta.key_columns)?.encode_key(&self.key_schema))
    }

    /// Index a stored row. Returns false if its key is already present.
    pub fn insert_row(&mut self, row: &Row) -> Result<bool> {
        let rid = row.rid.context("row has not been stored")?;
        let key = self.key_of(row)?;
        self.tree.insert(&key, rid)
    }

    pub fn remove_row(&mut self, row: &Row) -> Result<bool> {
        let key = self.key_of(row)?;
        self.tree.remove(&key)
    }

    /// Find the row whose key columns equal `key`, given in key column order.
    pub fn lookup(&self, key: &[Field]) -> Result<Option<RowId>> {
        self.key_schema.check_fields(key)?;
        let key = Row::new(key.to_vec()).encode_key(&self.key_schema);
        self.tree.get(&key)
    }

    /// Up to `limit` row ids in key order, from the first key not less than `from`.
    pub fn scan_from(&self, from: Option<&[Field]>, limit: usize) -> Result<Vec<RowId>> {
        let Some(from) = from else {
            return self.tree.scan_from(None, limit);
        };
        self.key_schema.check_fields(from)?;
        let key = Row::new(from.to_vec()).encode_key(&self.key_schema);
        self.tree.scan_from(Some(&key), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Column, TypeId};
    use crate::storage::buffer::lru::LruReplacer;
    use crate::storage::disk::DiskManager;
    use crate::storage::page::{IndexRootsPage, INDEX_ROOTS_PAGE_ID};
    use tempfile::{tempdir, TempDir};

    fn setup(dir: &TempDir) -> Result<BufferPoolManager> {
        let disk = DiskManager::create(&dir.path().join("index.db"))?;
        let bpm = BufferPoolManager::new(disk, Box::new(LruReplacer::new(16)), 16);
        drop(bpm.new_page()?);
        let (page_id, guard) = bpm.new_page()?;
        assert_eq!(page_id, INDEX_ROOTS_PAGE_ID);
        IndexRootsPage::init(guard);
        Ok(bpm)
    }

    #[test]
    fn test_metadata_serialize_deserialize() -> Result<()> {
        let meta = IndexMetadata {
            index_id: IndexId(2),
            name: "by_name".to_string(),
            table_id: TableId(1),
            key_columns: vec![1, 0],
        };
        let bytes = meta.to_bytes();
        assert_eq!(bytes.len(), meta.serialized_size());
        assert_eq!(IndexMetadata::deserialize_from(&mut bytes.as_slice())?, meta);
        Ok(())
    }

    #[test]
    fn test_picks_narrowest_key_width() -> Result<()> {
        let dir = tempdir()?;
        let bpm = setup(&dir)?;
        let sizes = NodeSizes::default();
        for (width, capacity) in [(0, 4), (4, 4), (5, 8), (9, 16), (32, 32), (33, 64), (64, 64)] {
            let tree = IndexTree::open(IndexId(0), bpm.clone(), width, sizes)?;
            assert_eq!(tree.key_capacity(), capacity, "width {}", width);
        }
        let err = IndexTree::open(IndexId(0), bpm, 65, sizes).err().expect("too wide");
        assert_eq!(
            err.downcast_ref::<CatalogError>(),
            Some(&CatalogError::KeyTooWide { width: 65, max: 64 })
        );
        Ok(())
    }

    #[test]
    fn test_index_rows_by_key() -> Result<()> {
        let dir = tempdir()?;
        let bpm = setup(&dir)?;
        let schema = Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, true),
            Column::new_char("name", 10, 1, false, false),
        ]);
        let meta = IndexMetadata {
            index_id: IndexId(0),
            name: "by_name".to_string(),
            table_id: TableId(0),
            key_columns: vec![1],
        };
        let sizes = NodeSizes {
            leaf_max_size: Some(3),
            internal_max_size: Some(4),
        };
        let mut index = IndexInfo::open(meta, &schema, bpm.clone(), sizes)?;
        assert_eq!(index.tree().key_capacity(), 16);

        let names = ["mallory", "alice", "trent", "bob", "carol", "dave", "eve"];
        for (slot, name) in names.iter().enumerate() {
            let mut row = Row::new(vec![Field::Int(slot as i32), Field::Char(name.to_string())]);
            row.rid = Some(RowId::new(PageId(9), slot as u32));
            assert!(index.insert_row(&row)?);
            assert!(!index.insert_row(&row)?);
        }
        index.tree().check()?;

        let found = index.lookup(&[Field::Char("carol".to_string())])?;
        assert_eq!(found, Some(RowId::new(PageId(9), 4)));
        assert_eq!(index.lookup(&[Field::Char("zed".to_string())])?, None);
        assert!(index.lookup(&[Field::Int(1)]).is_err());

        // Sorted by name: alice, bob, carol, dave, eve, mallory, trent.
        let slots: Vec<u32> = index.tree().row_ids()?.iter().map(|rid| rid.slot).collect();
        assert_eq!(slots, vec![1, 3, 4, 5, 6, 0, 2]);

        let from_c: Vec<u32> = index
            .scan_from(Some(&[Field::Char("c".to_string())]), 3)?
            .iter()
            .map(|rid| rid.slot)
            .collect();
        assert_eq!(from_c, vec![4, 5, 6]);
        assert!(index.scan_from(Some(&[Field::Char("z".to_string())]), 3)?.is_empty());

        index.tree_mut().destroy()?;
        assert!(index.tree().is_empty());
        assert!(bpm.check_all_unpinned());
        Ok(())
    }
}
