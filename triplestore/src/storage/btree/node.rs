//! B-tree node types and serialization.
//!
//! Nodes occupy one page each. The page type in the common page header says
//! whether a page is an internal node or a leaf.
//!
//! # Layout
//!
//! ```text
//! +-------------+-----------+-----------+----------------------------+
//! | Page header | key count | next leaf | entries                    |
//! | (8 bytes)   | (u16 LE)  | (u64 LE)  |                            |
//! +-------------+-----------+-----------+----------------------------+
//! internal entries: child0, then (key, child) pairs
//! leaf entries:     (key, flags, value length u16 LE, value bytes)
//! ```

#![allow(clippy::cast_possible_truncation)]

use crate::storage::overflow::{OVERFLOW_REF_SIZE, OverflowError, OverflowRef};
use crate::storage::page::{PAGE_SIZE, Page, PageError, PageHeader, PageId, PageType};

/// Size of a key in bytes.
pub const KEY_SIZE: usize = 32;

/// A fixed-width key. Keys compare bytewise.
pub type Key = [u8; KEY_SIZE];

/// Node header after the page header: key count (2) + next leaf (8).
const NODE_HEADER_SIZE: usize = 10;

const KEY_COUNT_OFFSET: usize = PageHeader::SIZE;
const NEXT_LEAF_OFFSET: usize = PageHeader::SIZE + 2;

/// Offset where node data starts.
const DATA_OFFSET: usize = PageHeader::SIZE + NODE_HEADER_SIZE;

/// Available space for node data.
const DATA_SPACE: usize = PAGE_SIZE - DATA_OFFSET;

/// Internal node entry size: key + child pointer.
const INTERNAL_ENTRY_SIZE: usize = KEY_SIZE + 8;

/// Maximum number of keys in an internal node: N keys and N+1 children.
pub const MAX_INTERNAL_KEYS: usize = (DATA_SPACE - 8) / INTERNAL_ENTRY_SIZE;

/// Leaf entry overhead: key + flags + value length.
const LEAF_ENTRY_OVERHEAD: usize = KEY_SIZE + 1 + 2;

/// Largest value stored inline in a leaf.
pub const MAX_INLINE_VALUE_SIZE: usize = 1024;

const FLAG_OVERFLOW: u8 = 0x01;

/// A value as stored in a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Inline(Vec<u8>),
    Overflow(OverflowRef),
}

impl StoredValue {
    fn stored_len(&self) -> usize {
        match self {
            Self::Inline(bytes) => bytes.len(),
            Self::Overflow(_) => OVERFLOW_REF_SIZE,
        }
    }
}

/// A key-value entry in a leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: Key,
    pub value: StoredValue,
}

impl LeafEntry {
    fn size(&self) -> usize {
        LEAF_ENTRY_OVERHEAD + self.value.stored_len()
    }
}

/// An internal node: N keys and N+1 children.
///
/// `children[i]` holds keys < `keys[i]`; `children[i+1]` holds keys >= `keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub keys: Vec<Key>,
    pub children: Vec<PageId>,
}

impl InternalNode {
    /// A root created by splitting the old root.
    #[must_use]
    pub fn with_children(left_child: PageId, key: Key, right_child: PageId) -> Self {
        Self {
            keys: vec![key],
            children: vec![left_child, right_child],
        }
    }

    /// Index of the child whose subtree may contain `key`.
    #[must_use]
    pub fn find_child_index(&self, key: &Key) -> usize {
        match self.keys.binary_search(key) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Insert a separator and the child to its right.
    pub fn insert(&mut self, key: Key, right_child: PageId) {
        let idx = self.find_child_index(&key);
        self.keys.insert(idx, key);
        self.children.insert(idx + 1, right_child);
    }

    #[must_use]
    pub fn is_overfull(&self) -> bool {
        self.keys.len() > MAX_INTERNAL_KEYS
    }

    /// Split in half, returning the promoted median and the right node.
    #[must_use]
    pub fn split(&mut self) -> (Key, Self) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let median = self.keys.pop().unwrap_or([0; KEY_SIZE]);

        (
            median,
            Self {
                keys: right_keys,
                children: right_children,
            },
        )
    }

    pub fn write_to_page(&self, page: &mut Page) {
        debug_assert!(!self.is_overfull());
        debug_assert_eq!(self.children.len(), self.keys.len() + 1);

        page.write_bytes(0, &PageHeader::new(PageType::BTreeInternal).to_bytes());
        page.write_u16(KEY_COUNT_OFFSET, self.keys.len() as u16);
        page.write_u64(NEXT_LEAF_OFFSET, 0);

        let mut offset = DATA_OFFSET;
        page.write_u64(offset, self.children[0]);
        offset += 8;
        for (key, child) in self.keys.iter().zip(&self.children[1..]) {
            page.write_bytes(offset, key);
            offset += KEY_SIZE;
            page.write_u64(offset, *child);
            offset += 8;
        }
    }

    fn from_page(page: &Page) -> Result<Self, NodeError> {
        let key_count = page.read_u16(KEY_COUNT_OFFSET) as usize;
        if key_count > MAX_INTERNAL_KEYS {
            return Err(NodeError::Malformed("internal key count exceeds capacity"));
        }

        let mut keys = Vec::with_capacity(key_count);
        let mut children = Vec::with_capacity(key_count + 1);
        let mut offset = DATA_OFFSET;
        children.push(page.read_u64(offset));
        offset += 8;
        for _ in 0..key_count {
            let mut key = [0u8; KEY_SIZE];
            key.copy_from_slice(page.read_bytes(offset, KEY_SIZE));
            keys.push(key);
            offset += KEY_SIZE;
            children.push(page.read_u64(offset));
            offset += 8;
        }

        if children.contains(&0) {
            return Err(NodeError::Malformed("internal node links to page 0"));
        }
        Ok(Self { keys, children })
    }
}

/// A leaf node: sorted entries plus a link to the next leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafNode {
    pub entries: Vec<LeafEntry>,
    /// Next leaf in key order, 0 for the last leaf.
    pub next_leaf: PageId,
}

impl LeafNode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries_size(&self) -> usize {
        self.entries.iter().map(LeafEntry::size).sum()
    }

    #[must_use]
    pub fn is_overfull(&self) -> bool {
        self.entries_size() > DATA_SPACE
    }

    pub fn find_index(&self, key: &Key) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(key))
    }

    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&StoredValue> {
        self.find_index(key).ok().map(|i| &self.entries[i].value)
    }

    /// Insert or replace an entry, returning the replaced value.
    pub fn insert(&mut self, key: Key, value: StoredValue) -> Option<StoredValue> {
        match self.find_index(&key) {
            Ok(i) => Some(std::mem::replace(&mut self.entries[i].value, value)),
            Err(i) => {
                self.entries.insert(i, LeafEntry { key, value });
                None
            }
        }
    }

    pub fn remove(&mut self, key: &Key) -> Option<StoredValue> {
        self.find_index(key)
            .ok()
            .map(|i| self.entries.remove(i).value)
    }

    /// Split by encoded size, returning the first key of the right node and
    /// the right node. Both halves fit in a page afterwards.
    #[must_use]
    pub fn split(&mut self) -> (Key, Self) {
        let half = self.entries_size() / 2;
        let mut acc = 0;
        let mut split_at = self.entries.len() / 2;
        for (i, entry) in self.entries.iter().enumerate() {
            acc += entry.size();
            if acc >= half {
                split_at = i + 1;
                break;
            }
        }
        let split_at = split_at.clamp(1, self.entries.len().saturating_sub(1).max(1));

        let right_entries = self.entries.split_off(split_at);
        let split_key = right_entries.first().map_or([0; KEY_SIZE], |e| e.key);
        let right = Self {
            entries: right_entries,
            next_leaf: self.next_leaf,
        };
        (split_key, right)
    }

    pub fn write_to_page(&self, page: &mut Page) {
        debug_assert!(!self.is_overfull());

        page.write_bytes(0, &PageHeader::new(PageType::BTreeLeaf).to_bytes());
        page.write_u16(KEY_COUNT_OFFSET, self.entries.len() as u16);
        page.write_u64(NEXT_LEAF_OFFSET, self.next_leaf);

        let mut offset = DATA_OFFSET;
        for entry in &self.entries {
            page.write_bytes(offset, &entry.key);
            offset += KEY_SIZE;
            match &entry.value {
                StoredValue::Inline(bytes) => {
                    page.write_u8(offset, 0);
                    page.write_u16(offset + 1, bytes.len() as u16);
                    page.write_bytes(offset + 3, bytes);
                    offset += 3 + bytes.len();
                }
                StoredValue::Overflow(overflow_ref) => {
                    page.write_u8(offset, FLAG_OVERFLOW);
                    page.write_u16(offset + 1, OVERFLOW_REF_SIZE as u16);
                    page.write_bytes(offset + 3, &overflow_ref.to_bytes());
                    offset += 3 + OVERFLOW_REF_SIZE;
                }
            }
        }
    }

    fn from_page(page: &Page) -> Result<Self, NodeError> {
        let entry_count = page.read_u16(KEY_COUNT_OFFSET) as usize;
        let next_leaf = page.read_u64(NEXT_LEAF_OFFSET);
        let mut entries = Vec::with_capacity(entry_count);

        let mut offset = DATA_OFFSET;
        for _ in 0..entry_count {
            if offset + LEAF_ENTRY_OVERHEAD > PAGE_SIZE {
                return Err(NodeError::Malformed("leaf entry header past page end"));
            }
            let mut key = [0u8; KEY_SIZE];
            key.copy_from_slice(page.read_bytes(offset, KEY_SIZE));
            offset += KEY_SIZE;

            let flags = page.read_u8(offset);
            let len = page.read_u16(offset + 1) as usize;
            offset += 3;
            if offset + len > PAGE_SIZE {
                return Err(NodeError::Malformed("leaf value past page end"));
            }
            let bytes = page.read_bytes(offset, len);
            offset += len;

            let value = match flags {
                0 => StoredValue::Inline(bytes.to_vec()),
                FLAG_OVERFLOW => StoredValue::Overflow(OverflowRef::from_bytes(bytes)?),
                _ => return Err(NodeError::Malformed("unknown leaf entry flags")),
            };

            if entries
                .last()
                .is_some_and(|prev: &LeafEntry| prev.key >= key)
            {
                return Err(NodeError::Malformed("leaf keys out of order"));
            }
            entries.push(LeafEntry { key, value });
        }

        Ok(Self { entries, next_leaf })
    }
}

/// A decoded node page.
#[derive(Debug)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    pub fn from_page(page: &Page) -> Result<Self, NodeError> {
        match page.header()?.page_type {
            PageType::BTreeInternal => Ok(Self::Internal(InternalNode::from_page(page)?)),
            PageType::BTreeLeaf => Ok(Self::Leaf(LeafNode::from_page(page)?)),
            other => Err(NodeError::WrongPageType(other)),
        }
    }

    #[cfg(test)]
    pub fn leaf_from_page(page: &Page) -> Result<LeafNode, NodeError> {
        match Self::from_page(page)? {
            Self::Leaf(leaf) => Ok(leaf),
            Self::Internal(_) => Err(NodeError::WrongPageType(PageType::BTreeInternal)),
        }
    }
}

/// Errors that can occur when decoding B-tree nodes.
#[derive(Debug)]
pub enum NodeError {
    Page(PageError),
    /// A non-node page where a node was expected.
    WrongPageType(PageType),
    Malformed(&'static str),
    Overflow(OverflowError),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Page(e) => write!(f, "page error: {e}"),
            Self::WrongPageType(t) => write!(f, "expected a B-tree node, found {t:?} page"),
            Self::Malformed(msg) => write!(f, "malformed node: {msg}"),
            Self::Overflow(e) => write!(f, "overflow reference: {e}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Page(e) => Some(e),
            Self::Overflow(e) => Some(e),
            Self::WrongPageType(_) | Self::Malformed(_) => None,
        }
    }
}

impl From<PageError> for NodeError {
    fn from(e: PageError) -> Self {
        Self::Page(e)
    }
}

impl From<OverflowError> for NodeError {
    fn from(e: OverflowError) -> Self {
        Self::Overflow(e)
    }
}
