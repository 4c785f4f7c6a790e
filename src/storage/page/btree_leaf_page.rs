//! B+tree leaf node: sorted unique `(key, value)` entries plus a link to the next leaf.

use crate::access::btree::key::{IndexKey, IndexValue};
use crate::storage::error::StorageResult;
use crate::storage::page::btree_page::{BTreePageHeader, BTREE_HEADER_SIZE};
use crate::storage::page::{PageId, PageKind};
use crate::storage::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

const NEXT_PAGE_OFFSET: usize = BTREE_HEADER_SIZE;
const LEAF_HEADER_SIZE: usize = BTREE_HEADER_SIZE + 4;

pub struct BTreeLeafPage<K, V, D> {
    data: D,
    _entry: PhantomData<(K, V)>,
}

impl<K: IndexKey, V: IndexValue, D> BTreeLeafPage<K, V, D> {
    const ENTRY_SIZE: usize = K::ENCODED_LEN + V::ENCODED_LEN;

    /// Number of entries that physically fit in a page.
    pub fn capacity() -> usize {
        (PAGE_SIZE - LEAF_HEADER_SIZE) / Self::ENTRY_SIZE
    }

    fn entry_offset(index: usize) -> usize {
        LEAF_HEADER_SIZE + index * Self::ENTRY_SIZE
    }

    pub fn into_inner(self) -> D {
        self.data
    }
}

impl<K: IndexKey, V: IndexValue, D: Deref<Target = [u8; PAGE_SIZE]>> BTreeLeafPage<K, V, D> {
    pub fn from_data(data: D) -> StorageResult<Self> {
        let page = Self {
            data,
            _entry: PhantomData,
        };
        PageKind::expect(&page.data, page.page_id(), PageKind::BTreeLeaf)?;
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

    pub fn next_page_id(&self) -> Option<PageId> {
        PageId::from_raw(LittleEndian::read_u32(&self.data[NEXT_PAGE_OFFSET..]))
    }

    pub fn key_at(&self, index: usize) -> K {
        let offset = Self::entry_offset(index);
        K::decode(&self.data[offset..offset + K::ENCODED_LEN])
    }

    pub fn value_at(&self, index: usize) -> V {
        let offset = Self::entry_offset(index) + K::ENCODED_LEN;
        V::decode(&self.data[offset..offset + V::ENCODED_LEN])
    }

    pub fn item(&self, index: usize) -> (K, V) {
        (self.key_at(index), self.value_at(index))
    }

    /// First slot whose key is not less than `key`; `size()` if there is none.
    pub fn key_index(&self, key: &K) -> usize {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid) < *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        let index = self.key_index(key);
        if index < self.size() && self.key_at(index) == *key {
            Some(self.value_at(index))
        } else {
            None
        }
    }
}

impl<K: IndexKey, V: IndexValue, D: DerefMut<Target = [u8; PAGE_SIZE]>> BTreeLeafPage<K, V, D> {
    /// Format `data` as an empty leaf with no successor.
    pub fn init(mut data: D, page_id: PageId, parent: Option<PageId>, max_size: usize) -> Self {
        BTreePageHeader::wrap(&mut *data).init(PageKind::BTreeLeaf, page_id, parent, max_size);
        let mut page = Self {
            data,
            _entry: PhantomData,
        };
        page.set_next_page_id(None);
        page
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

    pub fn set_next_page_id(&mut self, next: Option<PageId>) {
        LittleEndian::write_u32(&mut self.data[NEXT_PAGE_OFFSET..], PageId::to_raw(next));
    }

    fn set_entry(&mut self, index: usize, key: &K, value: &V) {
        let offset = Self::entry_offset(index);
        key.encode(&mut self.data[offset..offset + K::ENCODED_LEN]);
        value.encode(&mut self.data[offset + K::ENCODED_LEN..offset + Self::ENTRY_SIZE]);
    }

    fn insert_at(&mut self, index: usize, key: &K, value: &V) {
        let size = self.size();
        debug_assert!(size < Self::capacity(), "leaf page overflow");
        let start = Self::entry_offset(index);
        let end = Self::entry_offset(size);
        self.data.copy_within(start..end, start + Self::ENTRY_SIZE);
        self.set_entry(index, key, value);
        self.set_size(size + 1);
    }

    fn remove_at(&mut self, index: usize) {
        let size = self.size();
        let start = Self::entry_offset(index + 1);
        let end = Self::entry_offset(size);
        self.data.copy_within(start..end, Self::entry_offset(index));
        self.set_size(size - 1);
    }

    /// Insert keeping the entries sorted and return the new size. The caller rejects duplicates
    /// beforehand and splits when the size exceeds `max_size`.
    pub fn insert(&mut self, key: &K, value: &V) -> usize {
        let index = self.key_index(key);
        debug_assert!(index == self.size() || self.key_at(index) != *key);
        self.insert_at(index, key, value);
        self.size()
    }

    /// Delete `key` if present and return the resulting size.
    pub fn remove_and_delete_record(&mut self, key: &K) -> usize {
        let index = self.key_index(key);
        if index < self.size() && self.key_at(index) == *key {
            self.remove_at(index);
        }
        self.size()
    }

    fn append<D2: Deref<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        src: &BTreeLeafPage<K, V, D2>,
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

    /// Move the upper half of the entries into the empty right sibling `recipient` and link it
    /// into the leaf chain after this page.
    pub fn move_half_to<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeLeafPage<K, V, D2>,
    ) {
        let size = self.size();
        let keep = size / 2;
        recipient.append(self, keep, size);
        self.set_size(keep);
        recipient.set_next_page_id(self.next_page_id());
        self.set_next_page_id(Some(recipient.page_id()));
    }

    /// Merge every entry into the left sibling `recipient`, which inherits our successor.
    pub fn move_all_to<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeLeafPage<K, V, D2>,
    ) {
        let size = self.size();
        recipient.append(self, 0, size);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Hand our first entry to the left sibling `recipient`.
    pub fn move_first_to_end_of<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeLeafPage<K, V, D2>,
    ) {
        let (key, value) = self.item(0);
        self.remove_at(0);
        let size = recipient.size();
        recipient.insert_at(size, &key, &value);
    }

    /// Hand our last entry to the right sibling `recipient`.
    pub fn move_last_to_front_of<D2: DerefMut<Target = [u8; PAGE_SIZE]>>(
        &mut self,
        recipient: &mut BTreeLeafPage<K, V, D2>,
    ) {
        let (key, value) = self.item(self.size() - 1);
        self.set_size(self.size() - 1);
        recipient.insert_at(0, &key, &value);
    }
}
