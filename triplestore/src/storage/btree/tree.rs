//! Disk-based B-tree over the transactional pager.
//!
//! Each tree owns one root slot in the superblock. Keys are 32 bytes and
//! values are arbitrary bytes; values larger than `MAX_INLINE_VALUE_SIZE`
//! (1024 bytes) go to overflow pages and the leaf keeps a reference.
//!
//! Mutation goes through [`BTree`], which needs the pager mutably and an
//! open transaction. Lookups and scans go through [`BTreeReader`], which only
//! borrows the pager, so any number of readers can run concurrently.
//!
//! Deletes never merge nodes; an emptied leaf stays linked and scans step
//! over it.

use crate::storage::btree::node::{
    InternalNode, KEY_SIZE, Key, LeafEntry, LeafNode, MAX_INLINE_VALUE_SIZE, Node, NodeError,
    StoredValue,
};
use crate::storage::file::{DatabaseFile, FileError};
use crate::storage::io::Storage;
use crate::storage::overflow::{OverflowError, free_overflow, read_overflow, write_overflow};
use crate::storage::page::PageId;

/// Read-only view of one tree.
pub struct BTreeReader<'a, S: Storage> {
    file: &'a DatabaseFile<S>,
    root_page: PageId,
}

impl<'a, S: Storage> BTreeReader<'a, S> {
    /// View the tree in `slot`. A slot whose tree was never created reads as
    /// an empty tree.
    #[must_use]
    pub const fn new(file: &'a DatabaseFile<S>, slot: usize) -> Self {
        Self {
            file,
            root_page: file.root(slot),
        }
    }

    /// Look up a value by key.
    pub fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, BTreeError> {
        if self.root_page == 0 {
            return Ok(None);
        }
        let (_, leaf) = self.find_leaf(key)?;
        leaf.get(key)
            .map(|stored| resolve(self.file, stored))
            .transpose()
    }

    /// Iterate entries with keys >= `start`, in key order.
    pub fn iter_from(&self, start: &Key) -> Result<BTreeIterator<'a, S>, BTreeError> {
        if self.root_page == 0 {
            return Ok(BTreeIterator::empty(self.file));
        }
        let (_, mut leaf) = self.find_leaf(start)?;
        let first = leaf.find_index(start).unwrap_or_else(|i| i);
        let entries = leaf.entries.split_off(first);
        Ok(BTreeIterator {
            file: self.file,
            entries: entries.into_iter(),
            next_leaf: leaf.next_leaf,
            failed: false,
        })
    }

    /// Iterate all entries in key order.
    pub fn iter(&self) -> Result<BTreeIterator<'a, S>, BTreeError> {
        self.iter_from(&[0u8; KEY_SIZE])
    }

    /// Count entries by walking the leaves.
    pub fn count(&self) -> Result<usize, BTreeError> {
        let mut count = 0;
        for entry in self.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn find_leaf(&self, key: &Key) -> Result<(PageId, LeafNode), BTreeError> {
        let mut current = self.root_page;
        // Depth is bounded by the page count; a longer descent is a cycle.
        for _ in 0..=self.file.superblock().total_page_count {
            match read_node(self.file, current)? {
                Node::Leaf(leaf) => return Ok((current, leaf)),
                Node::Internal(node) => current = node.children[node.find_child_index(key)],
            }
        }
        Err(BTreeError::Cycle(self.root_page))
    }
}

/// Lazy iterator over B-tree entries, loading one leaf at a time.
pub struct BTreeIterator<'a, S: Storage> {
    file: &'a DatabaseFile<S>,
    entries: std::vec::IntoIter<LeafEntry>,
    next_leaf: PageId,
    failed: bool,
}

impl<'a, S: Storage> BTreeIterator<'a, S> {
    fn empty(file: &'a DatabaseFile<S>) -> Self {
        Self {
            file,
            entries: Vec::new().into_iter(),
            next_leaf: 0,
            failed: false,
        }
    }
}

impl<S: Storage> Iterator for BTreeIterator<'_, S> {
    type Item = Result<(Key, Vec<u8>), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(entry) = self.entries.next() {
                let result = resolve(self.file, &entry.value).map(|value| (entry.key, value));
                self.failed = result.is_err();
                return Some(result);
            }
            if self.next_leaf == 0 {
                return None;
            }
            match read_node(self.file, self.next_leaf) {
                Ok(Node::Leaf(leaf)) => {
                    self.next_leaf = leaf.next_leaf;
                    self.entries = leaf.entries.into_iter();
                }
                Ok(Node::Internal(_)) => {
                    self.failed = true;
                    return Some(Err(BTreeError::Node {
                        page_id: self.next_leaf,
                        source: NodeError::Malformed("leaf chain reaches an internal node"),
                    }));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Mutable handle on one tree. Requires an open pager transaction.
pub struct BTree<'a, S: Storage> {
    file: &'a mut DatabaseFile<S>,
    slot: usize,
}

impl<'a, S: Storage> BTree<'a, S> {
    /// Open the tree in `slot`, creating an empty root leaf if needed.
    pub fn open(file: &'a mut DatabaseFile<S>, slot: usize) -> Result<Self, BTreeError> {
        if file.root(slot) == 0 {
            let page_id = file.allocate_page()?;
            let mut page = file.new_page();
            LeafNode::new().write_to_page(&mut page);
            file.write_page(page_id, page)?;
            file.set_root(slot, page_id)?;
            tracing::debug!(slot, root = page_id, "created tree");
        }
        Ok(Self { file, slot })
    }

    #[must_use]
    pub const fn root_page(&self) -> PageId {
        self.file.root(self.slot)
    }

    /// Read-only view seeing this transaction's writes.
    #[must_use]
    pub fn reader(&self) -> BTreeReader<'_, S> {
        BTreeReader::new(&*self.file, self.slot)
    }

    pub fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, BTreeError> {
        self.reader().get(key)
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: Key, value: &[u8]) -> Result<(), BTreeError> {
        let stored = if value.len() > MAX_INLINE_VALUE_SIZE {
            StoredValue::Overflow(write_overflow(self.file, value)?)
        } else {
            StoredValue::Inline(value.to_vec())
        };

        let (mut path, leaf_page_id, mut leaf) = self.descend(&key)?;
        if let Some(StoredValue::Overflow(old)) = leaf.insert(key, stored) {
            free_overflow(self.file, old)?;
        }

        if !leaf.is_overfull() {
            return self.write_leaf(leaf_page_id, &leaf);
        }

        let (split_key, mut right) = leaf.split();
        let right_page_id = self.file.allocate_page()?;
        right.next_leaf = leaf.next_leaf;
        leaf.next_leaf = right_page_id;
        self.write_leaf(leaf_page_id, &leaf)?;
        self.write_leaf(right_page_id, &right)?;

        let mut promoted = (split_key, right_page_id);
        let mut left_page_id = leaf_page_id;
        while let Some((parent_page_id, mut parent)) = path.pop() {
            parent.insert(promoted.0, promoted.1);
            if !parent.is_overfull() {
                return self.write_internal(parent_page_id, &parent);
            }
            let (median, right_parent) = parent.split();
            let right_parent_id = self.file.allocate_page()?;
            self.write_internal(parent_page_id, &parent)?;
            self.write_internal(right_parent_id, &right_parent)?;
            promoted = (median, right_parent_id);
            left_page_id = parent_page_id;
        }

        // The root split.
        let new_root = InternalNode::with_children(left_page_id, promoted.0, promoted.1);
        let new_root_id = self.file.allocate_page()?;
        self.write_internal(new_root_id, &new_root)?;
        self.file.set_root(self.slot, new_root_id)?;
        tracing::trace!(slot = self.slot, root = new_root_id, "tree grew a level");
        Ok(())
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&mut self, key: &Key) -> Result<bool, BTreeError> {
        let (_, leaf_page_id, mut leaf) = self.descend(key)?;
        match leaf.remove(key) {
            None => Ok(false),
            Some(old) => {
                self.write_leaf(leaf_page_id, &leaf)?;
                if let StoredValue::Overflow(old) = old {
                    free_overflow(self.file, old)?;
                }
                Ok(true)
            }
        }
    }

    /// Descend to the leaf for `key`, recording the internal nodes on the way.
    #[allow(clippy::type_complexity)]
    fn descend(
        &self,
        key: &Key,
    ) -> Result<(Vec<(PageId, InternalNode)>, PageId, LeafNode), BTreeError> {
        let mut path = Vec::new();
        let mut current = self.root_page();
        for _ in 0..=self.file.superblock().total_page_count {
            match read_node(&*self.file, current)? {
                Node::Leaf(leaf) => return Ok((path, current, leaf)),
                Node::Internal(node) => {
                    let next = node.children[node.find_child_index(key)];
                    path.push((current, node));
                    current = next;
                }
            }
        }
        Err(BTreeError::Cycle(self.root_page()))
    }

    fn write_leaf(&mut self, page_id: PageId, leaf: &LeafNode) -> Result<(), BTreeError> {
        let mut page = self.file.new_page();
        leaf.write_to_page(&mut page);
        self.file.write_page(page_id, page)?;
        Ok(())
    }

    fn write_internal(&mut self, page_id: PageId, node: &InternalNode) -> Result<(), BTreeError> {
        let mut page = self.file.new_page();
        node.write_to_page(&mut page);
        self.file.write_page(page_id, page)?;
        Ok(())
    }
}

fn read_node<S: Storage>(file: &DatabaseFile<S>, page_id: PageId) -> Result<Node, BTreeError> {
    let page = file.read_page(page_id)?;
    Node::from_page(&page).map_err(|source| BTreeError::Node { page_id, source })
}

fn resolve<S: Storage>(file: &DatabaseFile<S>, stored: &StoredValue) -> Result<Vec<u8>, BTreeError> {
    match stored {
        StoredValue::Inline(bytes) => Ok(bytes.clone()),
        StoredValue::Overflow(overflow_ref) => Ok(read_overflow(file, *overflow_ref)?),
    }
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    File(FileError),
    Node { page_id: PageId, source: NodeError },
    Overflow(OverflowError),
    /// Descent did not reach a leaf.
    Cycle(PageId),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(e) => write!(f, "file error: {e}"),
            Self::Node { page_id, source } => write!(f, "node {page_id}: {source}"),
            Self::Overflow(e) => write!(f, "overflow error: {e}"),
            Self::Cycle(root) => write!(f, "tree rooted at page {root} does not terminate"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(e) => Some(e),
            Self::Node { source, .. } => Some(source),
            Self::Overflow(e) => Some(e),
            Self::Cycle(_) => None,
        }
    }
}

impl From<FileError> for BTreeError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

impl From<OverflowError> for BTreeError {
    fn from(e: OverflowError) -> Self {
        Self::Overflow(e)
    }
}
