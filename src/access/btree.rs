//! Disk-resident B+tree with unique keys.
//!
//! Nodes live in buffer-pool pages and refer to each other by page id only: internal entries
//! point down at children, every node records its parent, and leaves are chained left to right.
//! The root of each index is persisted in the index-roots page under the index id.
//!
//! Split, merge and redistribution are written once against [`Node`], which both page kinds
//! implement; only the entry moves differ between leaves and internal nodes.

pub mod iterator;
pub mod key;

pub use iterator::IndexIterator;
pub use key::{GenericKey, IndexKey, IndexValue};

use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{
    BTreeInternalPage, BTreeLeafPage, BTreePageHeader, IndexRootsPage, PageId, INDEX_ROOTS_PAGE_ID,
};
use crate::storage::{PageWriteGuard, PAGE_SIZE};
use anyhow::{anyhow, bail, ensure, Context, Result};
use std::collections::VecDeque;
use std::marker::PhantomData;

type LeafNode<K, V> = BTreeLeafPage<K, V, PageWriteGuard>;
type InternalNode<K> = BTreeInternalPage<K, PageWriteGuard>;

/// Operations the tree needs from a write-latched node of either kind.
trait Node<K: IndexKey>: Sized {
    const IS_LEAF: bool;

    fn load(guard: PageWriteGuard) -> Result<Self>;

    fn create(guard: PageWriteGuard, page_id: PageId, parent: Option<PageId>, max_size: usize) -> Self;

    fn header(&self) -> BTreePageHeader<&[u8; PAGE_SIZE]>;

    fn set_parent(&mut self, parent: Option<PageId>);

    fn key_at(&self, index: usize) -> K;

    /// The single child of an internal node that has shrunk to one entry.
    fn only_child(&self) -> Option<PageId>;

    /// Move the upper half into the empty right sibling `recipient`.
    fn split_to(&mut self, recipient: &mut Self, bpm: &BufferPoolManager) -> Result<()>;

    /// Move everything into the left sibling `recipient`.
    fn merge_into(&mut self, recipient: &mut Self, middle_key: &K, bpm: &BufferPoolManager) -> Result<()>;

    /// Move our first entry to the end of the left sibling `recipient`.
    fn give_first_to(&mut self, recipient: &mut Self, middle_key: &K, bpm: &BufferPoolManager) -> Result<()>;

    /// Move our last entry to the front of the right sibling `recipient`.
    fn give_last_to(&mut self, recipient: &mut Self, middle_key: &K, bpm: &BufferPoolManager) -> Result<()>;
}

impl<K: IndexKey, V: IndexValue> Node<K> for LeafNode<K, V> {
    const IS_LEAF: bool = true;

    fn load(guard: PageWriteGuard) -> Result<Self> {
        Ok(Self::from_data(guard)?)
    }

    fn create(guard: PageWriteGuard, page_id: PageId, parent: Option<PageId>, max_size: usize) -> Self {
        Self::init(guard, page_id, parent, max_size)
    }

    fn header(&self) -> BTreePageHeader<&[u8; PAGE_SIZE]> {
        BTreeLeafPage::header(self)
    }

    fn set_parent(&mut self, parent: Option<PageId>) {
        self.set_parent_page_id(parent);
    }

    fn key_at(&self, index: usize) -> K {
        BTreeLeafPage::key_at(self, index)
    }

    fn only_child(&self) -> Option<PageId> {
        None
    }

    fn split_to(&mut self, recipient: &mut Self, _bpm: &BufferPoolManager) -> Result<()> {
        self.move_half_to(recipient);
        Ok(())
    }

    fn merge_into(&mut self, recipient: &mut Self, _middle_key: &K, _bpm: &BufferPoolManager) -> Result<()> {
        self.move_all_to(recipient);
        Ok(())
    }

    fn give_first_to(&mut self, recipient: &mut Self, _middle_key: &K, _bpm: &BufferPoolManager) -> Result<()> {
        self.move_first_to_end_of(recipient);
        Ok(())
    }

    fn give_last_to(&mut self, recipient: &mut Self, _middle_key: &K, _bpm: &BufferPoolManager) -> Result<()> {
        self.move_last_to_front_of(recipient);
        Ok(())
    }
}

impl<K: IndexKey> Node<K> for InternalNode<K> {
    const IS_LEAF: bool = false;

    fn load(guard: PageWriteGuard) -> Result<Self> {
        Ok(Self::from_data(guard)?)
    }

    fn create(guard: PageWriteGuard, page_id: PageId, parent: Option<PageId>, max_size: usize) -> Self {
        Self::init(guard, page_id, parent, max_size)
    }

    fn header(&self) -> BTreePageHeader<&[u8; PAGE_SIZE]> {
        BTreeInternalPage::header(self)
    }

    fn set_parent(&mut self, parent: Option<PageId>) {
        self.set_parent_page_id(parent);
    }

    fn key_at(&self, index: usize) -> K {
        BTreeInternalPage::key_at(self, index)
    }

    fn only_child(&self) -> Option<PageId> {
        (self.size() == 1).then(|| self.value_at(0))
    }

    fn split_to(&mut self, recipient: &mut Self, bpm: &BufferPoolManager) -> Result<()> {
        self.move_half_to(recipient, bpm)
    }

    fn merge_into(&mut self, recipient: &mut Self, middle_key: &K, bpm: &BufferPoolManager) -> Result<()> {
        self.move_all_to(recipient, middle_key, bpm)
    }

    fn give_first_to(&mut self, recipient: &mut Self, middle_key: &K, bpm: &BufferPoolManager) -> Result<()> {
        self.move_first_to_end_of(recipient, middle_key, bpm)
    }

    fn give_last_to(&mut self, recipient: &mut Self, middle_key: &K, bpm: &BufferPoolManager) -> Result<()> {
        self.move_last_to_front_of(recipient, middle_key, bpm)
    }
}

/// Shape of a tree, as gathered by [`BPlusTree::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BTreeStatistics {
    pub height: usize,
    pub internal_pages: usize,
    pub leaf_pages: usize,
    pub entries: usize,
}

#[derive(Default)]
struct Walk {
    leaves: Vec<PageId>,
    leaf_depth: Option<usize>,
    stats: BTreeStatistics,
}

/// A unique-key B+tree over fixed-width keys and values.
///
/// Mutations take `&mut self` since they may move the root. Single-writer discipline across
/// handles opened on the same index is up to the caller.
pub struct BPlusTree<K, V> {
    index_id: u32,
    buffer_pool: BufferPoolManager,
    root_page_id: Option<PageId>,
    leaf_max_size: usize,
    internal_max_size: usize,
    _entry: PhantomData<(K, V)>,
}

impl<K: IndexKey, V: IndexValue> BPlusTree<K, V> {
    /// Open index `index_id`, reading its root from the index-roots page. A tree with no
    /// registered root is empty.
    ///
    /// Leaves split once they exceed `leaf_max_size` entries and internal nodes once they exceed
    /// `internal_max_size` children; a page must hold one entry beyond its maximum.
    pub fn new(
        index_id: u32,
        buffer_pool: BufferPoolManager,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let leaf_capacity = BTreeLeafPage::<K, V, ()>::capacity();
        let internal_capacity = BTreeInternalPage::<K, ()>::capacity();
        ensure!(
            (2..leaf_capacity).contains(&leaf_max_size),
            "leaf max size {} must be in 2..{}",
            leaf_max_size,
            leaf_capacity
        );
        ensure!(
            (4..internal_capacity).contains(&internal_max_size),
            "internal max size {} must be in 4..{}",
            internal_max_size,
            internal_capacity
        );

        let root_page_id = {
            let guard = buffer_pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
            IndexRootsPage::from_data(&*guard)
                .context("index roots page is not initialized")?
                .get_root_id(index_id)
        };
        log::debug!("index {} opened with root {:?}", index_id, root_page_id);

        Ok(Self {
            index_id,
            buffer_pool,
            root_page_id,
            leaf_max_size,
            internal_max_size,
            _entry: PhantomData,
        })
    }

    /// Open with the largest node sizes a page allows.
    pub fn with_default_sizes(index_id: u32, buffer_pool: BufferPoolManager) -> Result<Self> {
        let (leaf_max, internal_max) = Self::default_sizes();
        Self::new(index_id, buffer_pool, leaf_max, internal_max)
    }

    /// Page capacity minus the one slot of split slack.
    pub fn default_sizes() -> (usize, usize) {
        (
            BTreeLeafPage::<K, V, ()>::capacity() - 1,
            BTreeInternalPage::<K, ()>::capacity() - 1,
        )
    }

    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id.is_none()
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    /// Record a new root in memory and in the index-roots page.
    fn set_root(&mut self, root: Option<PageId>) -> Result<()> {
        let guard = self.buffer_pool.fetch_page_write(INDEX_ROOTS_PAGE_ID)?;
        let mut roots = IndexRootsPage::from_data(guard)?;
        match root {
            Some(page_id) => {
                if !roots.update(self.index_id, page_id) && !roots.insert(self.index_id, page_id) {
                    bail!("index roots page is full");
                }
            }
            None => {
                roots.delete(self.index_id);
            }
        }
        log::debug!(
            "index {}: root {:?} -> {:?}",
            self.index_id,
            self.root_page_id,
            root
        );
        self.root_page_id = root;
        Ok(())
    }

    fn delete_node(&self, page_id: PageId) -> Result<()> {
        if !self.buffer_pool.delete_page(page_id)? {
            bail!("B+tree page {} is still pinned", page_id);
        }
        Ok(())
    }

    /// Leaf whose range covers `key`, or the leftmost leaf when `key` is None. Internal pages
    /// are unpinned as soon as the next child is known.
    fn find_leaf(&self, key: Option<&K>) -> Result<Option<PageId>> {
        let Some(mut page_id) = self.root_page_id else {
            return Ok(None);
        };
        loop {
            let guard = self.buffer_pool.fetch_page(page_id)?;
            if BTreePageHeader::from_data(&*guard)?.is_leaf() {
                return Ok(Some(page_id));
            }
            let internal = BTreeInternalPage::<K, _>::from_data(&*guard)?;
            page_id = match key {
                Some(key) => internal.lookup(key),
                None => internal.value_at(0),
            };
        }
    }

    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let Some(leaf_id) = self.find_leaf(Some(key))? else {
            return Ok(None);
        };
        let guard = self.buffer_pool.fetch_page(leaf_id)?;
        Ok(BTreeLeafPage::<K, V, _>::from_data(&*guard)?.lookup(key))
    }

    /// Insert a unique key. Returns false, leaving the tree untouched, if the key exists.
    pub fn insert(&mut self, key: &K, value: &V) -> Result<bool> {
        let Some(leaf_id) = self.find_leaf(Some(key))? else {
            self.start_new_tree(key, value)?;
            return Ok(true);
        };

        let mut leaf = LeafNode::<K, V>::load(self.buffer_pool.fetch_page_write(leaf_id)?)?;
        if leaf.lookup(key).is_some() {
            return Ok(false);
        }
        if leaf.insert(key, value) > leaf.max_size() {
            let sibling = self.split(&mut leaf)?;
            let separator = sibling.key_at(0);
            self.insert_into_parent(leaf, separator, sibling)?;
        }
        Ok(true)
    }

    fn start_new_tree(&mut self, key: &K, value: &V) -> Result<()> {
        let (page_id, guard) = self.buffer_pool.new_page()?;
        let mut root = LeafNode::<K, V>::init(guard, page_id, None, self.leaf_max_size);
        root.insert(key, value);
        drop(root);
        self.set_root(Some(page_id))
    }

    /// Allocate a right sibling for an overflowing node and move its upper half there.
    fn split<N: Node<K>>(&self, node: &mut N) -> Result<N> {
        let (parent, max_size) = {
            let header = node.header();
            (header.parent_page_id(), header.max_size())
        };
        let (page_id, guard) = self.buffer_pool.new_page()?;
        let mut sibling = N::create(guard, page_id, parent, max_size);
        node.split_to(&mut sibling, &self.buffer_pool)?;
        Ok(sibling)
    }

    /// Hook a freshly split `right` into the parent of `left`, splitting upwards as needed.
    fn insert_into_parent<N: Node<K>>(&mut self, mut left: N, key: K, mut right: N) -> Result<()> {
        let left_id = left.header().page_id();
        let right_id = right.header().page_id();

        let Some(parent_id) = left.header().parent_page_id() else {
            let (root_id, guard) = self.buffer_pool.new_page()?;
            let mut root = InternalNode::<K>::init(guard, root_id, None, self.internal_max_size);
            root.populate_new_root(left_id, &key, right_id);
            left.set_parent(Some(root_id));
            right.set_parent(Some(root_id));
            drop((left, right, root));
            return self.set_root(Some(root_id));
        };

        // A parent split re-parents children, which latches them.
        drop((left, right));
        let mut parent = InternalNode::<K>::load(self.buffer_pool.fetch_page_write(parent_id)?)?;
        if parent.insert_node_after(left_id, &key, right_id)? <= parent.max_size() {
            return Ok(());
        }
        let sibling = self.split(&mut parent)?;
        let separator = sibling.key_at(0);
        self.insert_into_parent(parent, separator, sibling)
    }

    /// Delete `key`. Returns false if it was not present.
    pub fn remove(&mut self, key: &K) -> Result<bool> {
        let Some(leaf_id) = self.find_leaf(Some(key))? else {
            return Ok(false);
        };
        let mut leaf = LeafNode::<K, V>::load(self.buffer_pool.fetch_page_write(leaf_id)?)?;
        let before = leaf.size();
        if leaf.remove_and_delete_record(key) == before {
            return Ok(false);
        }
        self.coalesce_or_redistribute(leaf)?;
        Ok(true)
    }

    /// Restore the occupancy of `node` after a removal.
    ///
    /// An underfull node merges with a sibling when both fit in one page, the right node always
    /// folding into the left, and the parent is then checked in turn. Otherwise the sibling
    /// lends a single entry, which always suffices.
    fn coalesce_or_redistribute<N: Node<K>>(&mut self, mut node: N) -> Result<()> {
        let (node_id, size, min_size, max_size, parent_id) = {
            let header = node.header();
            (
                header.page_id(),
                header.size(),
                header.min_size(),
                header.max_size(),
                header.parent_page_id(),
            )
        };
        let Some(parent_id) = parent_id else {
            return self.adjust_root(node);
        };
        if size >= min_size {
            return Ok(());
        }

        let mut parent = InternalNode::<K>::load(self.buffer_pool.fetch_page_write(parent_id)?)?;
        let index = parent
            .value_index(node_id)
            .ok_or_else(|| anyhow!("page {} is not a child of {}", node_id, parent_id))?;
        // Borrow from the left only when we are the rightmost child.
        let sibling_index = if index + 1 == parent.size() {
            index
                .checked_sub(1)
                .ok_or_else(|| anyhow!("internal page {} has a single child", parent_id))?
        } else {
            index + 1
        };
        let mut sibling = N::load(
            self.buffer_pool
                .fetch_page_write(parent.value_at(sibling_index))?,
        )?;

        if size + sibling.header().size() <= max_size {
            let (mut left, mut right, right_index) = if sibling_index < index {
                (sibling, node, index)
            } else {
                (node, sibling, sibling_index)
            };
            let middle_key = parent.key_at(right_index);
            right.merge_into(&mut left, &middle_key, &self.buffer_pool)?;
            let right_id = right.header().page_id();
            drop((left, right));

            parent.remove(right_index);
            self.delete_node(right_id)?;
            log::trace!("merged page {} into its left sibling", right_id);
            return self.coalesce_or_redistribute(parent);
        }

        if sibling_index < index {
            let middle_key = parent.key_at(index);
            sibling.give_last_to(&mut node, &middle_key, &self.buffer_pool)?;
            parent.set_key_at(index, &node.key_at(0));
        } else {
            let middle_key = parent.key_at(sibling_index);
            sibling.give_first_to(&mut node, &middle_key, &self.buffer_pool)?;
            parent.set_key_at(sibling_index, &sibling.key_at(0));
        }
        Ok(())
    }

    /// Shrink the tree at the root: an internal root left with one child hands the root to that
    /// child, and an emptied root leaf empties the tree.
    fn adjust_root<N: Node<K>>(&mut self, root: N) -> Result<()> {
        let root_id = root.header().page_id();
        if let Some(child) = root.only_child() {
            drop(root);
            {
                let mut guard = self.buffer_pool.fetch_page_write(child)?;
                BTreePageHeader::from_data(&mut *guard)?.set_parent_page_id(None);
            }
            self.delete_node(root_id)?;
            return self.set_root(Some(child));
        }
        if N::IS_LEAF && root.header().size() == 0 {
            drop(root);
            self.delete_node(root_id)?;
            return self.set_root(None);
        }
        Ok(())
    }

    /// Free every page of the tree and unregister its root.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(root) = self.root_page_id else {
            return Ok(());
        };
        let mut queue = VecDeque::from([root]);
        let mut freed = 0;
        while let Some(page_id) = queue.pop_front() {
            {
                let guard = self.buffer_pool.fetch_page(page_id)?;
                if !BTreePageHeader::from_data(&*guard)?.is_leaf() {
                    let internal = BTreeInternalPage::<K, _>::from_data(&*guard)?;
                    queue.extend((0..internal.size()).map(|i| internal.value_at(i)));
                }
            }
            self.delete_node(page_id)?;
            freed += 1;
        }
        log::debug!("index {} destroyed, {} pages freed", self.index_id, freed);
        self.set_root(None)
    }

    /// Cursor at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<K, V>> {
        let position = self.find_leaf(None)?.map(|leaf| (leaf, 0));
        Ok(IndexIterator::new(self.buffer_pool.clone(), position))
    }

    /// Cursor at `key`, or the end cursor if `key` is absent.
    pub fn begin_at(&self, key: &K) -> Result<IndexIterator<K, V>> {
        let Some(leaf_id) = self.find_leaf(Some(key))? else {
            return Ok(self.end());
        };
        let guard = self.buffer_pool.fetch_page(leaf_id)?;
        let leaf = BTreeLeafPage::<K, V, _>::from_data(&*guard)?;
        let index = leaf.key_index(key);
        let position = (index < leaf.size() && leaf.key_at(index) == *key).then_some((leaf_id, index));
        Ok(IndexIterator::new(self.buffer_pool.clone(), position))
    }

    /// Cursor at the first key not less than `key`.
    pub fn lower_bound(&self, key: &K) -> Result<IndexIterator<K, V>> {
        let Some(leaf_id) = self.find_leaf(Some(key))? else {
            return Ok(self.end());
        };
        let guard = self.buffer_pool.fetch_page(leaf_id)?;
        let leaf = BTreeLeafPage::<K, V, _>::from_data(&*guard)?;
        let index = leaf.key_index(key);
        let position = if index < leaf.size() {
            Some((leaf_id, index))
        } else {
            leaf.next_page_id().map(|next| (next, 0))
        };
        Ok(IndexIterator::new(self.buffer_pool.clone(), position))
    }

    pub fn end(&self) -> IndexIterator<K, V> {
        IndexIterator::new(self.buffer_pool.clone(), None)
    }

    pub fn iter(&self) -> Result<IndexIterator<K, V>> {
        self.begin()
    }

    /// Number of levels, counting the leaves; 0 for an empty tree.
    pub fn height(&self) -> Result<usize> {
        let Some(mut page_id) = self.root_page_id else {
            return Ok(0);
        };
        let mut height = 1;
        loop {
            let guard = self.buffer_pool.fetch_page(page_id)?;
            if BTreePageHeader::from_data(&*guard)?.is_leaf() {
                return Ok(height);
            }
            page_id = BTreeInternalPage::<K, _>::from_data(&*guard)?.value_at(0);
            height += 1;
        }
    }

    /// Verify the whole structure: key order and bounds, node occupancy, parent links, uniform
    /// leaf depth and the leaf chain.
    pub fn check(&self) -> Result<()> {
        self.walk().map(|_| ())
    }

    /// Validate the tree and report its shape.
    pub fn statistics(&self) -> Result<BTreeStatistics> {
        self.walk()
    }

    fn walk(&self) -> Result<BTreeStatistics> {
        let Some(root) = self.root_page_id else {
            return Ok(BTreeStatistics::default());
        };
        let mut walk = Walk::default();
        self.check_node(root, None, None, None, 0, &mut walk)?;

        let mut chain = Vec::with_capacity(walk.leaves.len());
        let mut next = walk.leaves.first().copied();
        while let Some(page_id) = next {
            ensure!(
                chain.len() < walk.leaves.len(),
                "leaf chain is longer than the tree's {} leaves",
                walk.leaves.len()
            );
            chain.push(page_id);
            let guard = self.buffer_pool.fetch_page(page_id)?;
            next = BTreeLeafPage::<K, V, _>::from_data(&*guard)?.next_page_id();
        }
        ensure!(
            chain == walk.leaves,
            "leaf chain {:?} does not match tree order {:?}",
            chain,
            walk.leaves
        );

        walk.stats.height = walk.leaf_depth.unwrap_or(0) + 1;
        Ok(walk.stats)
    }

    fn check_node(
        &self,
        page_id: PageId,
        parent: Option<PageId>,
        lower: Option<K>,
        upper: Option<K>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<()> {
        let guard = self.buffer_pool.fetch_page(page_id)?;
        let header = BTreePageHeader::from_data(&*guard)?;
        let size = header.size();
        ensure!(
            header.page_id() == page_id,
            "page {} records id {}",
            page_id,
            header.page_id()
        );
        ensure!(
            header.parent_page_id() == parent,
            "page {} has parent {:?}, expected {:?}",
            page_id,
            header.parent_page_id(),
            parent
        );
        ensure!(
            size <= header.max_size(),
            "page {} holds {} entries, max {}",
            page_id,
            size,
            header.max_size()
        );
        if parent.is_some() {
            ensure!(
                size >= header.min_size(),
                "page {} holds {} entries, min {}",
                page_id,
                size,
                header.min_size()
            );
        }
        let in_range =
            |key: &K| lower.map_or(true, |l| *key >= l) && upper.map_or(true, |u| *key < u);

        if header.is_leaf() {
            let leaf = BTreeLeafPage::<K, V, _>::from_data(&*guard)?;
            ensure!(size > 0, "leaf {} is empty", page_id);
            for i in 0..size {
                let key = leaf.key_at(i);
                ensure!(in_range(&key), "leaf {} key {:?} out of range", page_id, key);
                if i > 0 {
                    ensure!(
                        leaf.key_at(i - 1) < key,
                        "leaf {} keys out of order at slot {}",
                        page_id,
                        i
                    );
                }
            }
            match walk.leaf_depth {
                None => walk.leaf_depth = Some(depth),
                Some(d) => {
                    ensure!(d == depth, "leaf {} at depth {}, expected {}", page_id, depth, d);
                }
            }
            walk.leaves.push(page_id);
            walk.stats.leaf_pages += 1;
            walk.stats.entries += size;
            return Ok(());
        }

        let internal = BTreeInternalPage::<K, _>::from_data(&*guard)?;
        ensure!(size >= 2, "internal page {} has {} children", page_id, size);
        for i in 1..size {
            let key = internal.key_at(i);
            ensure!(in_range(&key), "internal {} key {:?} out of range", page_id, key);
            if i > 1 {
                ensure!(
                    internal.key_at(i - 1) < key,
                    "internal {} keys out of order at slot {}",
                    page_id,
                    i
                );
            }
        }
        let children: Vec<(PageId, Option<K>, Option<K>)> = (0..size)
            .map(|i| {
                let lo = if i == 0 { lower } else { Some(internal.key_at(i)) };
                let hi = if i + 1 == size {
                    upper
                } else {
                    Some(internal.key_at(i + 1))
                };
                (internal.value_at(i), lo, hi)
            })
            .collect();
        walk.stats.internal_pages += 1;
        drop(guard);

        for (child, lo, hi) in children {
            self.check_node(child, Some(page_id), lo, hi, depth + 1, walk)?;
        }
        Ok(())
    }
}
