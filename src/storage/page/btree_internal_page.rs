//! B+tree internal node.
//!
//! After the common header comes a packed array of `(key, child page id)` entries. The key in
//! slot 0 is unused: child `i` covers keys in `[key(i), key(i + 1))`, with the first child
//! covering everything below `key(1)`.

use crate::access::btree::key::{IndexKey, IndexValue};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::btree_page::{BTreePageHeader, BTREE_HEADER_SIZE};
use crate::storage::page::{PageId, PageKind};
use crate::storage::PAGE_SIZE;
use anyhow::Result;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

const CHILD_LEN: usize = 4;

pub struct BTreeInternalPage<K, D> {
    data: D,
    _key: PhantomData<K>,
}

impl<K: IndexKey, D> BTreeInternalPage<K, D> {
    const ENTRY_SIZE: usize = K::ENCODED_LEN + CHILD_LEN;

    /// Number of entries that physically fit in a page.
    pub fn capacity() -> usize {
        (PAGE_SIZE - BTREE_HEADER_SIZE) / Self::ENTRY_SIZE
    }

    fn entry_offset(index: usize) -> usize {
        BTREE_HEADER_SIZE + index * Self::ENTRY_SIZE
    }

    pub fn into_inner(self) -> D {
        self.data
    }
}

impl<K: IndexKey, D: Deref<Target = [u8; PAGE_SIZE]>> BTreeInternalPage<K, D> {
    pub fn from_data(data: D) -> StorageResult<Self> {
        let page = Self {
            data,
            _key: PhantomData,
        };
        PageKind::expect(&page.data, page.page_id(), PageKind::BTreeInternal)?;
        Ok(page)
    }

    pub fn header(&self) -> BTreePageHeader<&[u8; PAGE_SIZE]> {
        BTreePageHeader::wrap(&*self.data)
    }

    pub fn page_id(&self) -> PageId {
        self.header().page_id()
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        self.header().parent_page_id()
    }

    pub fn is_root(&self) -> bool {
        self.header().is_root()
    }

    pub fn size(&self) -> usize {
        self.header().size()
    }

    pub fn max_size(&self) -> usize {
        self.header().max_size()
    }

    pub fn min_size(&self) -> usize {
        self.header().min_size()
    }

    pub fn key_at(&self, index: usize) -> K {
        let offset = Self::entry_offset(index);
        K::decode(&self.data[offset..offset + K::ENCODED_LEN])
    }

    pub fn value_at(&self, index: usize) -> PageId {
        let offset = Self::entry_offset(index) + K::ENCODED_LEN;
        PageId::decode(&self.data[offset..offset + CHILD_LEN])
    }

    /// Slot holding `child`, if any.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Child whose range covers `key`.
    pub fn lookup(&self, key: &K) -> PageId {
        let size = self.size();
        // First slot in [1, size) whose key is greater than `key`.
        let (mut lo, mut hi) = (1, size);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid) <= *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        self.value_at(lo - 1)
    }
}

impl<K: IndexKey, D: DerefMut<Target = [u8; PAGE_SIZE]>> BTreeInternalPage<K, D> {
    /// Format `data` as an empty internal node.
    pub fn init(mut data: D, page_id: PageId, parent: Option<PageId>, max_size: usize) -> Self {
        BTreePageHeader::wrap(&mut *data).init(PageKind::BTreeInternal, page_id, parent, max_size);
        Self {
            data,
            _key: PhantomData,
        }
    }

    fn header_mut(&mut self) -> BTreePageHeader<&mut [u8; PAGE_SIZE]> {
        BTreePageHeader::wrap(&mut *self.data)
    }

    pub fn set_parent_page_id(&mut self, parent: Option<PageId>) {
        self.header_mut().set_parent_page_id(parent);
    }

    fn set_size(&mut self, size: usize) {
        self.header_mut().set_size(size);
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        let offset = Self::entry_offset(index);
        key.encode(&mut self.data[offset..offset + K::ENCODED_LEN]);
    }

    fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = Self::entry_offset(index) + K::ENCODED_LEN;
        child.encode(&mut self.data[offset..offset + CHILD_LEN]);
    }

    fn set_entry(&mut self, index: usize, key: &K, child: PageId) {
        self.set_key_at(index, key);
        self.set_value_at(index, child);
    }

    /// Shift entries `[from, size)` by one slot to the right.
    fn shift_right(&mut self, from: usize) {
        let size = self.size();
        debug_assert!(size < Self::capacity(), "internal page overflow");
        let start = Self::entry_offset(from);
        let end = Self::entry_offset(size);
        self.data.copy_within(start..end, start + Self::ENTRY_SIZE);
    }

    /// Fill a fresh root with two children separated by `key`.
    pub fn populate_new_root(&mut self, left: PageId, key: &K, right: PageId) {
        self.set_value_at(0, left);
        self.set_entry(1, key, right);
        self.set_size(2);
    }

    /// Insert `(key, new_child)` right after the slot holding `old_child`. The node may end up one
    /// entry over `max_size`; splitting is the caller's job. Returns the new size.
    pub fn insert_node_after(&mut self, old_child: PageId, key: &K, new_child: PageId) -> StorageResult<usize> {
        let index = self
            .value_index(old_child)
            .ok_or_else(|| {
                StorageError::Corrupted(format!(
                    "page {} is not a child of internal page {}",
                    old_child,
                    self.page_id()
                ))
            })?
            + 1;
        self.shift_right(index);
        self.set_entry(index, key, new_child);
        let size = self.size() + 1;
        self.set_size(size);
        Ok(size)
    }

    /// Drop the entry at `index`, compacting the array. Removing slot 0 promotes child 1 to the
    /// first child.
    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);
        let start = Self::entry_offset(index + 1);
        let end = Self::entry_offset(size);
        self.data.copy_within(start..end, Self::entry_offset(index));
        self.set_size(size - 1);
    }

    /// Empty a node that has exactly one child and return that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        debug_assert_eq!(self.size(), 1);
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    fn append<D2: Deref<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        src: &BTreeInternalPage<K, D2>,
        from: usize,
        to: usize,
    ) {
        let size = self.size();
        let count = to - from;
        debug_assert!(size + count <= Self::capacity());
        let dst = Self::entry_offset(size);
        let src_range = Self::entry_offset(from)..Self::entry_offset(to);
        self.data[dst..dst + src_range.len()].copy_from_slice(&src.data[src_range]);
        self.set_size(size + count);
    }

    /// Point each child in `children` back at this node.
    fn adopt(&self, children: impl IntoIterator<Item = PageId>, bpm: &BufferPoolManager) -> Result<()> {
        let parent = Some(self.page_id());
        for child in children {
            let mut guard = bpm.fetch_page_write(child)?;
            BTreePageHeader::from_data(&mut *guard)?.set_parent_page_id(parent);
        }
        Ok(())
    }

    /// Move the upper half of the entries into the empty `recipient`. The recipient's slot 0 key
    /// is the separator to push into the parent.
    pub fn move_half_to<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeInternalPage<K, D2>,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size();
        let keep = size / 2;
        recipient.append(self, keep, size);
        self.set_size(keep);
        let moved: Vec<PageId> = (0..recipient.size()).map(|i| recipient.value_at(i)).collect();
        recipient.adopt(moved, bpm)
    }

    /// Merge every entry into the left sibling `recipient`, using `middle_key` (the parent's
    /// separator for this node) as the key of our first child.
    pub fn move_all_to<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeInternalPage<K, D2>,
        middle_key: &K,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let size = self.size();
        self.set_key_at(0, middle_key);
        let moved: Vec<PageId> = (0..size).map(|i| self.value_at(i)).collect();
        recipient.append(self, 0, size);
        self.set_size(0);
        recipient.adopt(moved, bpm)
    }

    /// Hand our first child to the left sibling `recipient`. Afterwards `key_at(0)` is the new
    /// separator between the two nodes.
    pub fn move_first_to_end_of<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeInternalPage<K, D2>,
        middle_key: &K,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let child = self.value_at(0);
        let size = recipient.size();
        recipient.set_entry(size, middle_key, child);
        recipient.set_size(size + 1);
        self.remove(0);
        recipient.adopt([child], bpm)
    }

    /// Hand our last child to the right sibling `recipient`. Afterwards the recipient's
    /// `key_at(0)` is the new separator between the two nodes.
    pub fn move_last_to_front_of<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeInternalPage<K, D2>,
        middle_key: &K,
        bpm: &BufferPoolManager,
    ) -> Result<()> {
        let last = self.size() - 1;
        let (key, child) = (self.key_at(last), self.value_at(last));
        self.set_size(last);

        recipient.set_key_at(0, middle_key);
        recipient.shift_right(0);
        recipient.set_entry(0, &key, child);
        let size = recipient.size() + 1;
        recipient.set_size(size);
        recipient.adopt([child], bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::buffer::lru::LruReplacer;
    use crate::storage::disk::DiskManager;
    use crate::storage::page::BTreeLeafPage;
    use tempfile::tempdir;

    type Internal<D> = BTreeInternalPage<i32, D>;

    fn internal_with(keys: &[i32], children: &[u32]) -> Internal<Box<[u8; PAGE_SIZE]>> {
        let mut page = Internal::init(Box::new([0u8; PAGE_SIZE]), PageId(100), None, 8);
        page.set_value_at(0, PageId(children[0]));
        for (i, (key, child)) in keys.iter().zip(&children[1..]).enumerate() {
            page.set_entry(i + 1, key, PageId(*child));
        }
        page.set_size(children.len());
        page
    }

    #[test]
    fn test_lookup() {
        let page = internal_with(&[10, 20, 30], &[1, 2, 3, 4]);
        assert_eq!(page.lookup(&-5), PageId(1));
        assert_eq!(page.lookup(&9), PageId(1));
        assert_eq!(page.lookup(&10), PageId(2));
        assert_eq!(page.lookup(&25), PageId(3));
        assert_eq!(page.lookup(&30), PageId(4));
        assert_eq!(page.lookup(&1000), PageId(4));
    }

    #[test]
    fn test_insert_and_remove() -> StorageResult<()> {
        let mut page = internal_with(&[10, 30], &[1, 2, 3]);
        assert_eq!(page.insert_node_after(PageId(2), &20, PageId(5))?, 4);
        assert_eq!(page.key_at(2), 20);
        assert_eq!(page.value_at(2), PageId(5));
        assert_eq!(page.value_at(3), PageId(3));
        assert!(page.insert_node_after(PageId(77), &1, PageId(6)).is_err());

        page.remove(0);
        assert_eq!(page.size(), 3);
        assert_eq!(page.value_at(0), PageId(2));
        assert_eq!(page.lookup(&0), PageId(2));
        assert_eq!(page.lookup(&25), PageId(5));

        page.remove(1);
        page.remove(1);
        assert_eq!(page.remove_and_return_only_child(), PageId(2));
        assert_eq!(page.size(), 0);
        Ok(())
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let buf = [0u8; PAGE_SIZE];
        assert!(matches!(
            Internal::from_data(&buf),
            Err(StorageError::WrongPageKind { .. })
        ));
    }

    #[test]
    fn test_moves_reparent_children() -> Result<()> {
        let dir = tempdir()?;
        let disk = DiskManager::create(&dir.path().join("test.db"))?;
        let bpm = BufferPoolManager::new(disk, Box::new(LruReplacer::new(16)), 16);

        let (left_id, left_guard) = bpm.new_page()?;
        let (right_id, right_guard) = bpm.new_page()?;
        let mut left = Internal::init(left_guard, left_id, None, 4);
        let mut right = Internal::init(right_guard, right_id, None, 4);

        let mut children = Vec::new();
        for _ in 0..5 {
            let (page_id, guard) = bpm.new_page()?;
            BTreeLeafPage::<i32, i32, _>::init(guard, page_id, Some(left_id), 4);
            children.push(page_id);
        }
        let parent_of = |child: PageId| -> Result<Option<PageId>> {
            let guard = bpm.fetch_page(child)?;
            Ok(BTreePageHeader::from_data(&*guard)?.parent_page_id())
        };

        left.set_value_at(0, children[0]);
        left.set_size(1);
        for (i, child) in children[1..].iter().enumerate() {
            left.insert_node_after(children[i], &((i as i32 + 1) * 10), *child)?;
        }
        assert_eq!(left.size(), 5);

        left.move_half_to(&mut right, &bpm)?;
        assert_eq!(left.size(), 2);
        assert_eq!(right.size(), 3);
        assert_eq!(right.key_at(0), 20);
        assert_eq!(parent_of(children[2])?, Some(right_id));
        assert_eq!(parent_of(children[4])?, Some(right_id));

        right.move_first_to_end_of(&mut left, &20, &bpm)?;
        assert_eq!(left.size(), 3);
        assert_eq!(left.key_at(2), 20);
        assert_eq!(right.key_at(0), 30);
        assert_eq!(parent_of(children[2])?, Some(left_id));

        left.move_last_to_front_of(&mut right, &30, &bpm)?;
        assert_eq!(right.size(), 3);
        assert_eq!(right.key_at(0), 20);
        assert_eq!(right.key_at(1), 30);
        assert_eq!(parent_of(children[2])?, Some(right_id));

        right.move_all_to(&mut left, &20, &bpm)?;
        assert_eq!(right.size(), 0);
        assert_eq!(left.size(), 5);
        let keys: Vec<i32> = (1..5).map(|i| left.key_at(i)).collect();
        assert_eq!(keys, vec![10, 20, 30, 40]);
        for child in &children {
            assert_eq!(parent_of(*child)?, Some(left_id));
        }
        Ok(())
    }
}
