//! Ordered key-value backends.
//!
//! A backend holds a fixed set of named keyspaces, each an ordered map from
//! 32-byte keys to byte values. The store only needs three operations from
//! it: point lookup, ordered prefix scan and atomic batch apply.
//!
//! Two backends ship with the crate:
//! - [`MemoryBackend`]: balanced trees in memory.
//! - [`PagedBackend`]: one B-tree per keyspace in a paged database file,
//!   each batch committed through the rollback journal.

mod memory;
mod paged;

use std::collections::BTreeMap;
use std::collections::btree_map;

pub use memory::MemoryBackend;
pub use paged::PagedBackend;

use crate::storage::btree::{BTreeError, Key};
use crate::storage::FileError;

/// The keyspaces of a triple store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Keyspace {
    /// (s, p, o) -> number of contexts asserting the triple.
    Spo,
    /// (p, o, s) -> presence.
    Pos,
    /// (o, s, p) -> presence.
    Osp,
    /// (c, s, p, o) -> presence.
    Cspo,
    /// (c, p, o, s) -> presence.
    Cpos,
    /// (c, o, s, p) -> presence.
    Cosp,
    /// (s, p, o, c) -> membership flags.
    Membership,
    /// c -> member count and registration flags.
    Contexts,
    /// id -> reference count and encoded term.
    TermsById,
    /// (digest, length, id) -> presence.
    TermsByHash,
    /// Named counters.
    Meta,
}

impl Keyspace {
    pub const ALL: [Self; 11] = [
        Self::Spo,
        Self::Pos,
        Self::Osp,
        Self::Cspo,
        Self::Cpos,
        Self::Cosp,
        Self::Membership,
        Self::Contexts,
        Self::TermsById,
        Self::TermsByHash,
        Self::Meta,
    ];

    /// Superblock root slot of this keyspace's tree.
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Spo => "spo",
            Self::Pos => "pos",
            Self::Osp => "osp",
            Self::Cspo => "cspo",
            Self::Cpos => "cpos",
            Self::Cosp => "cosp",
            Self::Membership => "membership",
            Self::Contexts => "contexts",
            Self::TermsById => "terms_by_id",
            Self::TermsByHash => "terms_by_hash",
            Self::Meta => "meta",
        }
    }
}

/// A set of puts and deletes applied as one unit.
///
/// Later operations on the same key replace earlier ones.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: BTreeMap<(Keyspace, Key), Option<Vec<u8>>>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, keyspace: Keyspace, key: Key, value: Vec<u8>) {
        self.ops.insert((keyspace, key), Some(value));
    }

    pub fn delete(&mut self, keyspace: Keyspace, key: Key) {
        self.ops.insert((keyspace, key), None);
    }

    /// The staged operation for a key: `Some(None)` is a staged delete.
    #[must_use]
    pub fn staged(&self, keyspace: Keyspace, key: &Key) -> Option<Option<&[u8]>> {
        self.ops
            .get(&(keyspace, *key))
            .map(|value| value.as_deref())
    }

    /// Staged operations of one keyspace with keys >= `start`, in key order.
    pub fn range_from(
        &self,
        keyspace: Keyspace,
        start: Key,
    ) -> impl Iterator<Item = (&Key, Option<&[u8]>)> {
        self.ops
            .range((keyspace, start)..)
            .take_while(move |((ks, _), _)| *ks == keyspace)
            .map(|((_, key), value)| (key, value.as_deref()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

impl IntoIterator for WriteBatch {
    type Item = ((Keyspace, Key), Option<Vec<u8>>);
    type IntoIter = btree_map::IntoIter<(Keyspace, Key), Option<Vec<u8>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Entries of a prefix scan, in key order.
pub type ScanIter<'a> = Box<dyn Iterator<Item = Result<(Key, Vec<u8>), BackendError>> + 'a>;

/// Ordered key-value storage over named keyspaces.
pub trait Backend: Send + Sync {
    /// Look up one key.
    fn get(&self, keyspace: Keyspace, key: &Key) -> Result<Option<Vec<u8>>, BackendError>;

    /// Entries whose key starts with `prefix`, in key order.
    ///
    /// The scan borrows the backend, so no batch can be applied while it
    /// is alive.
    fn scan(&self, keyspace: Keyspace, prefix: &[u8]) -> Result<ScanIter<'_>, BackendError>;

    /// Apply every operation of `batch` or none of them.
    fn apply(&mut self, batch: WriteBatch) -> Result<(), BackendError>;
}

/// Zero-pad a prefix into the smallest key it covers.
#[must_use]
pub fn prefix_start(prefix: &[u8]) -> Key {
    let mut key = [0u8; crate::storage::btree::KEY_SIZE];
    let len = prefix.len().min(key.len());
    key[..len].copy_from_slice(&prefix[..len]);
    key
}

/// Errors that can occur in a backend.
#[derive(Debug)]
pub enum BackendError {
    File(FileError),
    Tree(BTreeError),
}

impl BackendError {
    /// Whether the failure came from the device rather than from the data.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(
            self,
            Self::File(FileError::Storage(_) | FileError::Poisoned)
                | Self::Tree(BTreeError::File(FileError::Storage(_) | FileError::Poisoned))
        )
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(e) => write!(f, "file error: {e}"),
            Self::Tree(e) => write!(f, "b-tree error: {e}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(e) => Some(e),
            Self::Tree(e) => Some(e),
        }
    }
}

impl From<FileError> for BackendError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

impl From<BTreeError> for BackendError {
    fn from(e: BTreeError) -> Self {
        Self::Tree(e)
    }
}
