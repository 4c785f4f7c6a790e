//! Sequential scan over a table heap.

use crate::access::heap::TableHeap;
use crate::access::tuple::{Row, RowId};
use crate::storage::page::{PageId, TablePage};
use anyhow::Result;

enum Cursor {
    /// Continue on `page`, after `slot` (or from the start of the page).
    Page { page_id: PageId, after: Option<u32> },
    Done,
}

/// Forward iterator over the live rows of a [`TableHeap`], following the page chain.
///
/// Pages are pinned only while a row is being read, so the heap may be modified between calls;
/// rows inserted behind the cursor are not revisited.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    cursor: Cursor,
}

impl<'a> TableIterator<'a> {
    pub fn new(heap: &'a TableHeap) -> Self {
        Self {
            heap,
            cursor: Cursor::Page {
                page_id: heap.first_page_id(),
                after: None,
            },
        }
    }

    fn try_next(&mut self) -> Result<Option<Row>> {
        while let Cursor::Page { page_id, after } = self.cursor {
            let guard = self.heap.buffer_pool().fetch_page(page_id)?;
            let page = TablePage::from_data(&*guard)?;

            let slot = match after {
                Some(slot) => page.next_tuple_slot(slot),
                None => page.first_tuple_slot(),
            };
            match slot {
                Some(slot) => {
                    self.cursor = Cursor::Page {
                        page_id,
                        after: Some(slot),
                    };
                    let mut bytes = page.get_tuple(slot)?;
                    let mut row = Row::deserialize_from(&mut bytes, self.heap.schema())?;
                    row.rid = Some(RowId::new(page_id, slot));
                    return Ok(Some(row));
                }
                None => {
                    self.cursor = match page.next_page_id() {
                        Some(next) => Cursor::Page {
                            page_id: next,
                            after: None,
                        },
                        None => Cursor::Done,
                    };
                }
            }
        }
        Ok(None)
    }
}

impl Iterator for TableIterator<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.try_next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.cursor = Cursor::Done;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::{Column, Schema};
    use crate::access::value::{Field, TypeId};
    use crate::storage::buffer::lru::LruReplacer;
    use crate::storage::buffer::BufferPoolManager;
    use crate::storage::disk::DiskManager;
    use tempfile::tempdir;

    fn heap(dir: &tempfile::TempDir) -> Result<TableHeap> {
        let disk = DiskManager::create(&dir.path().join("scan.db"))?;
        let pool = BufferPoolManager::new(disk, Box::new(LruReplacer::new(4)), 4);
        let schema = Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, true),
            Column::new_char("pad", 512, 1, false, false),
        ]);
        TableHeap::create(pool, schema)
    }

    #[test]
    fn test_empty_scan() -> Result<()> {
        let dir = tempdir()?;
        let heap = heap(&dir)?;
        assert!(heap.iter().next().is_none());
        Ok(())
    }

    #[test]
    fn test_scan_skips_deleted_rows_across_pages() -> Result<()> {
        let dir = tempdir()?;
        let heap = heap(&dir)?;
        let pad = "p".repeat(500);
        let mut rids = Vec::new();
        for id in 0..30 {
            let mut row = Row::new(vec![Field::Int(id), Field::Char(pad.clone())]);
            rids.push(heap.insert_tuple(&mut row)?);
        }
        for rid in rids.iter().step_by(3) {
            heap.mark_delete(*rid)?;
        }

        let mut seen = Vec::new();
        for row in &heap {
            let row = row?;
            assert!(row.rid.is_some());
            if let Field::Int(id) = row.fields[0] {
                seen.push(id);
            }
        }
        let expected: Vec<i32> = (0..30).filter(|id| id % 3 != 0).collect();
        assert_eq!(seen, expected);
        assert!(heap.buffer_pool().check_all_unpinned());
        Ok(())
    }
}
