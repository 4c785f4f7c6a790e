use crate::access::btree::key::{IndexKey, IndexValue};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{BTreeLeafPage, PageId};
use anyhow::Result;
use std::fmt;
use std::marker::PhantomData;

/// Forward cursor over the leaf chain of a [`BPlusTree`](super::BPlusTree).
///
/// The cursor remembers a `(leaf, slot)` position and pins the leaf only while reading it.
/// It is single-pass and is invalidated by structural changes to the tree; no isolation is
/// provided. Two cursors compare equal when they sit at the same position, and every exhausted
/// cursor equals [`BPlusTree::end`](super::BPlusTree::end).
pub struct IndexIterator<K, V> {
    buffer_pool: BufferPoolManager,
    position: Option<(PageId, usize)>,
    _entry: PhantomData<(K, V)>,
}

impl<K: IndexKey, V: IndexValue> IndexIterator<K, V> {
    pub(crate) fn new(buffer_pool: BufferPoolManager, position: Option<(PageId, usize)>) -> Self {
        Self {
            buffer_pool,
            position,
            _entry: PhantomData,
        }
    }

    pub fn is_end(&self) -> bool {
        self.position.is_none()
    }

    /// Current `(leaf page, slot)`, or None at the end.
    pub fn position(&self) -> Option<(PageId, usize)> {
        self.position
    }

    fn advance(&mut self) -> Result<Option<(K, V)>> {
        let Some((page_id, index)) = self.position else {
            return Ok(None);
        };
        let guard = self.buffer_pool.fetch_page(page_id)?;
        let leaf = BTreeLeafPage::<K, V, _>::from_data(&*guard)?;
        if index >= leaf.size() {
            // Only reachable if the tree changed under the cursor.
            self.position = leaf.next_page_id().map(|next| (next, 0));
            drop(guard);
            return self.advance();
        }

        let item = leaf.item(index);
        self.position = if index + 1 < leaf.size() {
            Some((page_id, index + 1))
        } else {
            leaf.next_page_id().map(|next| (next, 0))
        };
        Ok(Some(item))
    }
}

impl<K: IndexKey, V: IndexValue> Iterator for IndexIterator<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.position = None;
                Some(Err(e))
            }
        }
    }
}

impl<K, V> PartialEq for IndexIterator<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

impl<K, V> fmt::Debug for IndexIterator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexIterator")
            .field("position", &self.position)
            .finish()
    }
}
