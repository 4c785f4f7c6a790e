//! System catalog: tables, indexes and where their metadata lives.
//!
//! Logical page 0 holds the [`CatalogMeta`], which maps every table and index id to a page
//! holding its metadata record. Logical page 1 is the index-roots page shared by all trees.
//! Metadata record pages are tagged [`PageKind::Metadata`] and carry the record after the tag.

pub mod error;
pub mod index_info;
pub mod meta;
pub mod table_info;

pub use error::CatalogError;
pub use index_info::{IndexInfo, IndexMetadata, IndexTree, NodeSizes, MAX_KEY_WIDTH};
pub use meta::CatalogMeta;
pub use table_info::{TableInfo, TableMetadata};

pub use crate::storage::page::INDEX_ROOTS_PAGE_ID;

use crate::access::error::RecordResult;
use crate::access::{Row, RowId, Schema, TableHeap};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{IndexRootsPage, PageId, PageKind, PAGE_KIND_OFFSET};
use crate::storage::PAGE_SIZE;
use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const CATALOG_META_PAGE_ID: PageId = PageId(0);

/// Offset of the record on a metadata page, after the kind tag.
const METADATA_OFFSET: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-memory catalog over the meta page and the metadata pages it points to.
///
/// DDL takes `&mut self` and rewrites the meta page before returning.
pub struct Catalog {
    buffer_pool: BufferPoolManager,
    node_sizes: NodeSizes,
    meta: CatalogMeta,
    tables: BTreeMap<TableId, TableInfo>,
    table_names: HashMap<String, TableId>,
    indexes: BTreeMap<IndexId, IndexInfo>,
}

impl Catalog {
    /// Lay out a fresh database: the catalog meta page, then the index-roots page.
    pub fn initialize(buffer_pool: BufferPoolManager, node_sizes: NodeSizes) -> Result<Self> {
        let meta = CatalogMeta::default();
        {
            let (page_id, mut guard) = buffer_pool.new_page()?;
            if page_id != CATALOG_META_PAGE_ID {
                bail!("expected catalog meta at page {}, got {}", CATALOG_META_PAGE_ID, page_id);
            }
            meta.write_to(&mut guard)?;
        }
        {
            let (page_id, guard) = buffer_pool.new_page()?;
            if page_id != INDEX_ROOTS_PAGE_ID {
                bail!("expected index roots at page {}, got {}", INDEX_ROOTS_PAGE_ID, page_id);
            }
            IndexRootsPage::init(guard);
        }
        log::info!("catalog initialized");

        Ok(Self {
            buffer_pool,
            node_sizes,
            meta,
            tables: BTreeMap::new(),
            table_names: HashMap::new(),
            indexes: BTreeMap::new(),
        })
    }

    /// Load every table and index recorded in the catalog meta page.
    pub fn open(buffer_pool: BufferPoolManager, node_sizes: NodeSizes) -> Result<Self> {
        let meta = {
            let guard = buffer_pool.fetch_page(CATALOG_META_PAGE_ID)?;
            CatalogMeta::read_from(&guard).context("catalog meta page is not initialized")?
        };

        let mut tables = BTreeMap::new();
        let mut table_names = HashMap::new();
        for (table_id, page_id) in meta.table_meta_pages() {
            let table = read_metadata(&buffer_pool, page_id, |buf| {
                TableMetadata::deserialize_from(buf)
            })
            .with_context(|| format!("loading metadata of table {}", table_id))?;
            let heap = TableHeap::open(
                buffer_pool.clone(),
                table.first_page_id,
                table.schema.deep_copy(),
            );
            table_names.insert(table.name.clone(), table_id);
            tables.insert(table_id, TableInfo::new(table, heap));
        }

        let mut indexes = BTreeMap::new();
        for (index_id, page_id) in meta.index_meta_pages() {
            let index = read_metadata(&buffer_pool, page_id, |buf| {
                IndexMetadata::deserialize_from(buf)
            })
            .with_context(|| format!("loading metadata of index {}", index_id))?;
            let Some(table) = tables.get(&index.table_id) else {
                bail!("index {} refers to missing table {}", index_id, index.table_id);
            };
            let info = IndexInfo::open(index, table.schema(), buffer_pool.clone(), node_sizes)?;
            indexes.insert(index_id, info);
        }
        log::info!(
            "catalog opened: {} tables, {} indexes",
            tables.len(),
            indexes.len()
        );

        Ok(Self {
            buffer_pool,
            node_sizes,
            meta,
            tables,
            table_names,
            indexes,
        })
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.buffer_pool
    }

    pub fn meta(&self) -> &CatalogMeta {
        &self.meta
    }

    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<&TableInfo> {
        if self.table_names.contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()).into());
        }
        let table_id = self.meta.next_table_id();
        let heap = TableHeap::create(self.buffer_pool.clone(), schema.deep_copy())?;
        let metadata = TableMetadata {
            table_id,
            name: name.to_string(),
            first_page_id: heap.first_page_id(),
            schema,
        };
        let page_id = self.store_metadata(&metadata.to_bytes())?;
        self.meta.add_table(table_id, page_id);
        self.flush_meta()?;
        log::info!(
            "created table {} (id {}, heap at page {})",
            name,
            table_id,
            heap.first_page_id()
        );

        self.table_names.insert(name.to_string(), table_id);
        Ok(&*self
            .tables
            .entry(table_id)
            .or_insert(TableInfo::new(metadata, heap)))
    }

    pub fn get_table(&self, name: &str) -> Result<&TableInfo> {
        self.table_names
            .get(name)
            .and_then(|id| self.tables.get(id))
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()).into())
    }

    pub fn get_table_by_id(&self, table_id: TableId) -> Option<&TableInfo> {
        self.tables.get(&table_id)
    }

    /// Every table, in id order.
    pub fn tables(&self) -> Vec<&TableInfo> {
        self.tables.values().collect()
    }

    /// Build a unique index on `columns` of `table_name` and fill it from the rows already in
    /// the table. Fails without leaving anything behind if two rows share a key.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        columns: &[&str],
    ) -> Result<&IndexInfo> {
        let table = self.get_table(table_name)?;
        let table_id = table.table_id();
        if self.find_index(table_id, index_name).is_some() {
            return Err(CatalogError::IndexExists {
                table: table_name.to_string(),
                index: index_name.to_string(),
            }
            .into());
        }
        let key_columns = columns
            .iter()
            .map(|&column| {
                table
                    .schema()
                    .column_index(column)
                    .map(|i| i as u32)
                    .ok_or_else(|| CatalogError::ColumnNotFound {
                        table: table_name.to_string(),
                        column: column.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = IndexMetadata {
            index_id: self.meta.next_index_id(),
            name: index_name.to_string(),
            table_id,
            key_columns,
        };
        let mut index = IndexInfo::open(
            metadata,
            table.schema(),
            self.buffer_pool.clone(),
            self.node_sizes,
        )?;
        if let Err(e) = backfill(&mut index, table.heap()) {
            index.tree_mut().destroy()?;
            return Err(e);
        }

        let index_id = index.index_id();
        let page_id = self.store_metadata(&index.metadata().to_bytes())?;
        self.meta.add_index(index_id, page_id);
        self.flush_meta()?;
        log::info!(
            "created index {} (id {}) on {}{:?}",
            index_name,
            index_id,
            table_name,
            columns
        );
        Ok(&*self.indexes.entry(index_id).or_insert(index))
    }

    fn find_index(&self, table_id: TableId, index_name: &str) -> Option<IndexId> {
        self.indexes
            .values()
            .find(|index| index.table_id() == table_id && index.name() == index_name)
            .map(|index| index.index_id())
    }

    fn index_not_found(table_name: &str, index_name: &str) -> CatalogError {
        CatalogError::IndexNotFound {
            table: table_name.to_string(),
            index: index_name.to_string(),
        }
    }

    pub fn get_index(&self, table_name: &str, index_name: &str) -> Result<&IndexInfo> {
        let table_id = self.get_table(table_name)?.table_id();
        self.find_index(table_id, index_name)
            .and_then(|id| self.indexes.get(&id))
            .ok_or_else(|| Self::index_not_found(table_name, index_name).into())
    }

    pub fn get_index_mut(&mut self, table_name: &str, index_name: &str) -> Result<&mut IndexInfo> {
        let table_id = self.get_table(table_name)?.table_id();
        self.find_index(table_id, index_name)
            .and_then(|id| self.indexes.get_mut(&id))
            .ok_or_else(|| Self::index_not_found(table_name, index_name).into())
    }

    /// Indexes of a table, in id order.
    pub fn table_indexes(&self, table_name: &str) -> Result<Vec<&IndexInfo>> {
        let table_id = self.get_table(table_name)?.table_id();
        Ok(self
            .indexes
            .values()
            .filter(|index| index.table_id() == table_id)
            .collect())
    }

    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> Result<()> {
        let table_id = self.get_table(table_name)?.table_id();
        let index_id = self
            .find_index(table_id, index_name)
            .ok_or_else(|| Self::index_not_found(table_name, index_name))?;
        self.remove_index(index_id)?;
        self.flush_meta()
    }

    fn remove_index(&mut self, index_id: IndexId) -> Result<()> {
        let Some(mut index) = self.indexes.remove(&index_id) else {
            return Ok(());
        };
        index.tree_mut().destroy()?;
        if let Some(page_id) = self.meta.remove_index(index_id) {
            self.delete_metadata(page_id)?;
        }
        log::info!("dropped index {} (id {})", index.name(), index_id);
        Ok(())
    }

    /// Drop the table's indexes, then free its heap and its metadata page.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let table_id = self.get_table(name)?.table_id();
        let index_ids: Vec<IndexId> = self
            .indexes
            .values()
            .filter(|index| index.table_id() == table_id)
            .map(|index| index.index_id())
            .collect();
        for index_id in index_ids {
            self.remove_index(index_id)?;
        }

        self.table_names.remove(name);
        if let Some(table) = self.tables.remove(&table_id) {
            table.into_heap().free_heap()?;
        }
        if let Some(page_id) = self.meta.remove_table(table_id) {
            self.delete_metadata(page_id)?;
        }
        self.flush_meta()?;
        log::info!("dropped table {} (id {})", name, table_id);
        Ok(())
    }

    /// Store a row and index it in every index of the table. A key collision undoes the insert.
    pub fn insert_row(&mut self, table_name: &str, row: &mut Row) -> Result<RowId> {
        let table_id = self.get_table(table_name)?.table_id();
        let Some(table) = self.tables.get(&table_id) else {
            return Err(CatalogError::TableNotFound(table_name.to_string()).into());
        };
        let rid = table.heap().insert_tuple(row)?;

        let mut indexed: Vec<&mut IndexInfo> = Vec::new();
        for index in self.indexes.values_mut() {
            if index.table_id() != table_id {
                continue;
            }
            if !index.insert_row(row)? {
                let name = index.name().to_string();
                for done in indexed {
                    done.remove_row(row)?;
                }
                table.heap().apply_delete(rid)?;
                row.rid = None;
                return Err(CatalogError::DuplicateKey(name).into());
            }
            indexed.push(index);
        }
        Ok(rid)
    }

    /// Remove a row from the table and from every index of the table.
    pub fn delete_row(&mut self, table_name: &str, rid: RowId) -> Result<Row> {
        let table_id = self.get_table(table_name)?.table_id();
        let Some(table) = self.tables.get(&table_id) else {
            return Err(CatalogError::TableNotFound(table_name.to_string()).into());
        };
        let row = table.heap().get_tuple(rid)?;
        for index in self.indexes.values_mut() {
            if index.table_id() == table_id {
                index.remove_row(&row)?;
            }
        }
        table.heap().mark_delete(rid)?;
        table.heap().apply_delete(rid)?;
        Ok(row)
    }

    fn flush_meta(&self) -> Result<()> {
        let mut guard = self.buffer_pool.fetch_page_write(CATALOG_META_PAGE_ID)?;
        self.meta.write_to(&mut guard)
    }

    /// Write a metadata record onto a fresh page.
    fn store_metadata(&self, record: &[u8]) -> Result<PageId> {
        ensure!(
            record.len() <= PAGE_SIZE - METADATA_OFFSET,
            "metadata record of {} bytes does not fit in a page",
            record.len()
        );
        let (page_id, mut guard) = self.buffer_pool.new_page()?;
        guard[PAGE_KIND_OFFSET] = PageKind::Metadata as u8;
        guard[METADATA_OFFSET..METADATA_OFFSET + record.len()].copy_from_slice(record);
        Ok(page_id)
    }

    fn delete_metadata(&self, page_id: PageId) -> Result<()> {
        if !self.buffer_pool.delete_page(page_id)? {
            bail!("metadata page {} is still pinned", page_id);
        }
        Ok(())
    }
}

fn read_metadata<T>(
    buffer_pool: &BufferPoolManager,
    page_id: PageId,
    read: impl FnOnce(&mut &[u8]) -> RecordResult<T>,
) -> Result<T> {
    let guard = buffer_pool.fetch_page(page_id)?;
    PageKind::expect(&guard, page_id, PageKind::Metadata)?;
    let mut buf = &guard[METADATA_OFFSET..];
    Ok(read(&mut buf)?)
}

fn backfill(index: &mut IndexInfo, heap: &TableHeap) -> Result<()> {
    let mut count = 0;
    for row in heap {
        let row = row?;
        if !index.insert_row(&row)? {
            return Err(CatalogError::DuplicateKey(index.name().to_string()).into());
        }
        count += 1;
    }
    log::debug!("index {} back-filled with {} rows", index.name(), count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Column, Field, TypeId};
    use crate::storage::buffer::lru::LruReplacer;
    use crate::storage::disk::DiskManager;
    use tempfile::{tempdir, TempDir};

    fn pool(dir: &TempDir, create: bool) -> Result<BufferPoolManager> {
        let path = dir.path().join("catalog.db");
        let disk = if create {
            DiskManager::create(&path)?
        } else {
            DiskManager::open(&path)?
        };
        Ok(BufferPoolManager::new(disk, Box::new(LruReplacer::new(32)), 32))
    }

    fn accounts() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, true),
            Column::new_char("owner", 12, 1, false, false),
            Column::new("balance", TypeId::Float, 2, true, false),
        ])
    }

    fn account(id: i32, owner: &str) -> Row {
        Row::new(vec![
            Field::Int(id),
            Field::Char(owner.to_string()),
            Field::Float(id as f32 * 1.5),
        ])
    }

    fn catalog_error(err: &anyhow::Error) -> Option<&CatalogError> {
        err.downcast_ref::<CatalogError>()
    }

    #[test]
    fn test_initialize_reserves_meta_pages() -> Result<()> {
        let dir = tempdir()?;
        let bpm = pool(&dir, true)?;
        let catalog = Catalog::initialize(bpm.clone(), NodeSizes::default())?;
        assert!(catalog.tables().is_empty());
        assert_eq!(bpm.disk_meta().num_allocated_pages, 2);

        let guard = bpm.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        assert_eq!(IndexRootsPage::from_data(&*guard)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_create_and_get_table() -> Result<()> {
        let dir = tempdir()?;
        let mut catalog = Catalog::initialize(pool(&dir, true)?, NodeSizes::default())?;

        let table_id = catalog.create_table("accounts", accounts())?.table_id();
        let second = catalog.create_table("audit", accounts())?.table_id();
        assert_eq!(table_id, TableId(0));
        assert_eq!(second, TableId(1));

        let table = catalog.get_table("accounts")?;
        assert_eq!(table.schema(), &accounts());
        assert_eq!(catalog.tables().len(), 2);

        let err = catalog.create_table("accounts", accounts()).err().expect("duplicate");
        assert_eq!(
            catalog_error(&err),
            Some(&CatalogError::TableExists("accounts".into()))
        );
        let err = catalog.get_table("missing").err().expect("missing");
        assert_eq!(
            catalog_error(&err),
            Some(&CatalogError::TableNotFound("missing".into()))
        );
        Ok(())
    }

    #[test]
    fn test_create_index_backfills() -> Result<()> {
        let dir = tempdir()?;
        let mut catalog = Catalog::initialize(pool(&dir, true)?, NodeSizes::default())?;
        catalog.create_table("accounts", accounts())?;
        let mut rids = Vec::new();
        for id in 0..200 {
            let mut row = account(id, &format!("owner{}", id));
            rids.push(catalog.get_table("accounts")?.heap().insert_tuple(&mut row)?);
        }

        let index = catalog.create_index("accounts", "by_id", &["id"])?;
        assert_eq!(index.key_columns(), &[0]);
        assert_eq!(index.tree().key_capacity(), 8);
        index.tree().check()?;
        for (id, rid) in rids.iter().enumerate() {
            assert_eq!(index.lookup(&[Field::Int(id as i32)])?, Some(*rid));
        }
        assert_eq!(index.tree().row_ids()?, rids);

        let err = catalog
            .create_index("accounts", "by_id", &["owner"])
            .err()
            .expect("duplicate index");
        assert!(matches!(catalog_error(&err), Some(CatalogError::IndexExists { .. })));
        let err = catalog
            .create_index("accounts", "by_x", &["x"])
            .err()
            .expect("unknown column");
        assert!(matches!(catalog_error(&err), Some(CatalogError::ColumnNotFound { .. })));
        Ok(())
    }

    #[test]
    fn test_backfill_rejects_duplicate_keys() -> Result<()> {
        let dir = tempdir()?;
        let bpm = pool(&dir, true)?;
        let mut catalog = Catalog::initialize(bpm.clone(), NodeSizes::default())?;
        catalog.create_table("accounts", accounts())?;
        for id in 0..10 {
            let mut row = account(id, if id % 2 == 0 { "even" } else { "odd" });
            catalog.insert_row("accounts", &mut row)?;
        }
        let allocated = bpm.disk_meta().num_allocated_pages;

        let err = catalog
            .create_index("accounts", "by_owner", &["owner"])
            .err()
            .expect("duplicate owners");
        assert_eq!(
            catalog_error(&err),
            Some(&CatalogError::DuplicateKey("by_owner".into()))
        );
        assert!(catalog.table_indexes("accounts")?.is_empty());
        assert_eq!(bpm.disk_meta().num_allocated_pages, allocated);
        assert!(bpm.check_all_unpinned());
        Ok(())
    }

    #[test]
    fn test_key_too_wide() -> Result<()> {
        let dir = tempdir()?;
        let mut catalog = Catalog::initialize(pool(&dir, true)?, NodeSizes::default())?;
        let schema = Schema::new(vec![Column::new_char("blob", 100, 0, false, false)]);
        catalog.create_table("blobs", schema)?;
        let err = catalog
            .create_index("blobs", "by_blob", &["blob"])
            .err()
            .expect("too wide");
        assert_eq!(
            catalog_error(&err),
            Some(&CatalogError::KeyTooWide { width: 101, max: 64 })
        );
        Ok(())
    }

    #[test]
    fn test_insert_and_delete_rows_maintain_indexes() -> Result<()> {
        let dir = tempdir()?;
        let mut catalog = Catalog::initialize(pool(&dir, true)?, NodeSizes::default())?;
        catalog.create_table("accounts", accounts())?;
        catalog.create_index("accounts", "by_id", &["id"])?;
        catalog.create_index("accounts", "by_owner", &["owner"])?;

        let alice = catalog.insert_row("accounts", &mut account(1, "alice"))?;
        let bob = catalog.insert_row("accounts", &mut account(2, "bob"))?;

        // Unique on id, duplicate on owner: neither the heap nor by_id keeps the row.
        let mut clash = account(3, "alice");
        let err = catalog.insert_row("accounts", &mut clash).err().expect("clash");
        assert_eq!(
            catalog_error(&err),
            Some(&CatalogError::DuplicateKey("by_owner".into()))
        );
        assert_eq!(clash.rid, None);
        assert_eq!(catalog.get_table("accounts")?.heap().iter().count(), 2);
        let by_id = catalog.get_index("accounts", "by_id")?;
        assert_eq!(by_id.lookup(&[Field::Int(3)])?, None);

        let removed = catalog.delete_row("accounts", alice)?;
        assert_eq!(removed.fields[1], Field::Char("alice".into()));
        let by_owner = catalog.get_index("accounts", "by_owner")?;
        assert_eq!(by_owner.lookup(&[Field::Char("alice".into())])?, None);
        assert_eq!(by_owner.lookup(&[Field::Char("bob".into())])?, Some(bob));
        assert_eq!(catalog.get_table("accounts")?.heap().iter().count(), 1);
        Ok(())
    }

    #[test]
    fn test_drop_index_and_table_release_pages() -> Result<()> {
        let dir = tempdir()?;
        let bpm = pool(&dir, true)?;
        let mut catalog = Catalog::initialize(bpm.clone(), NodeSizes::default())?;
        let baseline = bpm.disk_meta().num_allocated_pages;

        catalog.create_table("accounts", accounts())?;
        for id in 0..300 {
            catalog.insert_row("accounts", &mut account(id, &format!("o{}", id)))?;
        }
        catalog.create_index("accounts", "by_id", &["id"])?;
        catalog.create_index("accounts", "by_owner", &["owner"])?;

        catalog.drop_index("accounts", "by_owner")?;
        assert_eq!(catalog.table_indexes("accounts")?.len(), 1);
        let err = catalog.drop_index("accounts", "by_owner").err().expect("gone");
        assert!(matches!(catalog_error(&err), Some(CatalogError::IndexNotFound { .. })));

        catalog.drop_table("accounts")?;
        assert!(catalog.tables().is_empty());
        assert!(catalog.get_table("accounts").is_err());
        assert_eq!(bpm.disk_meta().num_allocated_pages, baseline);
        assert_eq!(catalog.meta().table_meta_pages().count(), 0);
        assert_eq!(catalog.meta().index_meta_pages().count(), 0);
        assert_eq!(catalog.meta().next_table_id(), TableId(1));
        assert_eq!(catalog.meta().next_index_id(), IndexId(2));

        let guard = bpm.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        assert_eq!(IndexRootsPage::from_data(&*guard)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_reopen() -> Result<()> {
        let dir = tempdir()?;
        let rids = {
            let mut catalog = Catalog::initialize(pool(&dir, true)?, NodeSizes::default())?;
            catalog.create_table("accounts", accounts())?;
            catalog.create_table("empty", accounts())?;
            catalog.create_table("scratch", accounts())?;
            let mut rids = Vec::new();
            for id in 0..50 {
                rids.push(catalog.insert_row("accounts", &mut account(id, &format!("o{}", id)))?);
            }
            catalog.create_index("accounts", "by_owner", &["owner"])?;
            catalog.drop_table("scratch")?;
            rids
        };

        let mut catalog = Catalog::open(pool(&dir, false)?, NodeSizes::default())?;
        let names: Vec<&str> = catalog.tables().into_iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["accounts", "empty"]);
        // The dropped table's id stays retired.
        assert_eq!(catalog.create_table("fresh", accounts())?.table_id(), TableId(3));
        assert_eq!(catalog.get_table("accounts")?.schema(), &accounts());
        assert_eq!(catalog.get_table("accounts")?.heap().iter().count(), 50);

        let index = catalog.get_index("accounts", "by_owner")?;
        index.tree().check()?;
        assert_eq!(index.lookup(&[Field::Char("o7".into())])?, Some(rids[7]));
        Ok(())
    }
}
