use crate::access::scan::TableIterator;
use crate::access::schema::Schema;
use crate::access::tuple::{Row, RowId};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PageId, TablePage};
use anyhow::{bail, Result};

/// A table stored as a doubly linked chain of [`TablePage`]s.
pub struct TableHeap {
    buffer_pool: BufferPoolManager,
    first_page_id: PageId,
    schema: Schema,
}

impl TableHeap {
    /// Allocate the first page of a new, empty table.
    pub fn create(buffer_pool: BufferPoolManager, schema: Schema) -> Result<Self> {
        let (first_page_id, guard) = buffer_pool.new_page()?;
        TablePage::init(guard, first_page_id, None);
        log::debug!("table heap created at page {}", first_page_id);
        Ok(Self {
            buffer_pool,
            first_page_id,
            schema,
        })
    }

    /// Attach to an existing heap whose chain starts at `first_page_id`.
    pub fn open(buffer_pool: BufferPoolManager, first_page_id: PageId, schema: Schema) -> Self {
        Self {
            buffer_pool,
            first_page_id,
            schema,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn buffer_pool(&self) -> &BufferPoolManager {
        &self.buffer_pool
    }

    fn encode(&self, row: &Row) -> Result<Vec<u8>> {
        self.schema.check_fields(&row.fields)?;
        let bytes = row.to_bytes();
        if bytes.len() > TablePage::<()>::MAX_ROW_SIZE {
            bail!(
                "row of {} bytes exceeds the maximum of {}",
                bytes.len(),
                TablePage::<()>::MAX_ROW_SIZE
            );
        }
        Ok(bytes)
    }

    /// Store `row` in the first page with room, appending a page when every page is full.
    /// Sets `row.rid` and returns it.
    pub fn insert_tuple(&self, row: &mut Row) -> Result<RowId> {
        let bytes = self.encode(row)?;
        let rid = self.insert_bytes(&bytes)?;
        row.rid = Some(rid);
        Ok(rid)
    }

    fn insert_bytes(&self, bytes: &[u8]) -> Result<RowId> {
        let mut page_id = self.first_page_id;
        loop {
            let mut page = TablePage::from_data(self.buffer_pool.fetch_page_write(page_id)?)?;
            match page.insert_tuple(bytes) {
                Ok(slot) => return Ok(RowId::new(page_id, slot)),
                Err(StorageError::PageFull { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            match page.next_page_id() {
                Some(next) => page_id = next,
                None => {
                    let (new_page_id, guard) = self.buffer_pool.new_page()?;
                    let mut new_page = TablePage::init(guard, new_page_id, Some(page_id));
                    page.set_next_page_id(Some(new_page_id));
                    let slot = new_page.insert_tuple(bytes)?;
                    log::trace!("table heap grew to page {}", new_page_id);
                    return Ok(RowId::new(new_page_id, slot));
                }
            }
        }
    }

    fn page_write(&self, page_id: PageId) -> Result<TablePage<crate::storage::PageWriteGuard>> {
        Ok(TablePage::from_data(self.buffer_pool.fetch_page_write(page_id)?)?)
    }

    /// Flag the row as deleted without reclaiming its space.
    pub fn mark_delete(&self, rid: RowId) -> Result<()> {
        self.page_write(rid.page_id)?.mark_delete(rid.slot)?;
        Ok(())
    }

    /// Replace the row at `rid`. The row stays in place when its page has room; otherwise it is
    /// inserted anew and only then removed from its old slot. Returns the row's id afterwards.
    ///
    /// If the new copy cannot be stored the old row is left as it was.
    pub fn update_tuple(&self, row: &mut Row, rid: RowId) -> Result<RowId> {
        let bytes = self.encode(row)?;
        {
            let mut page = self.page_write(rid.page_id)?;
            match page.update_tuple(rid.slot, &bytes) {
                Ok(_) => {
                    row.rid = Some(rid);
                    return Ok(rid);
                }
                Err(StorageError::PageFull { .. }) => page.mark_delete(rid.slot)?,
                Err(e) => return Err(e.into()),
            }
        }

        let new_rid = match self.insert_bytes(&bytes) {
            Ok(new_rid) => new_rid,
            Err(e) => {
                if let Err(undo) = self.rollback_delete(rid) {
                    log::error!("failed to restore row {} after a failed move: {:#}", rid, undo);
                }
                return Err(e);
            }
        };
        self.apply_delete(rid)?;
        row.rid = Some(new_rid);
        Ok(new_rid)
    }

    /// Reclaim the row's space. Its slot may be reused by a later insert.
    pub fn apply_delete(&self, rid: RowId) -> Result<()> {
        self.page_write(rid.page_id)?.apply_delete(rid.slot)?;
        Ok(())
    }

    /// Undo a [`mark_delete`](Self::mark_delete).
    pub fn rollback_delete(&self, rid: RowId) -> Result<()> {
        self.page_write(rid.page_id)?.rollback_delete(rid.slot)?;
        Ok(())
    }

    pub fn get_tuple(&self, rid: RowId) -> Result<Row> {
        let guard = self.buffer_pool.fetch_page(rid.page_id)?;
        let page = TablePage::from_data(&*guard)?;
        let mut bytes = page.get_tuple(rid.slot)?;
        let mut row = Row::deserialize_from(&mut bytes, &self.schema)?;
        row.rid = Some(rid);
        Ok(row)
    }

    /// Delete every page of the heap.
    pub fn free_heap(self) -> Result<()> {
        let mut next = Some(self.first_page_id);
        let mut freed = 0;
        while let Some(page_id) = next {
            next = {
                let guard = self.buffer_pool.fetch_page(page_id)?;
                TablePage::from_data(&*guard)?.next_page_id()
            };
            if !self.buffer_pool.delete_page(page_id)? {
                bail!("table page {} is still pinned", page_id);
            }
            freed += 1;
        }
        log::debug!("freed {} table pages from {}", freed, self.first_page_id);
        Ok(())
    }

    /// Iterate over the live rows in page order.
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator::new(self)
    }
}

impl<'a> IntoIterator for &'a TableHeap {
    type Item = Result<Row>;
    type IntoIter = TableIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
