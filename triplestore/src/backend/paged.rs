//! Backend over a paged database file.
//!
//! Each keyspace is a B-tree rooted in its own superblock slot. A batch runs
//! as one pager transaction: every tree mutation of the batch lands in the
//! dirty-page set and the whole set is committed through the rollback
//! journal, so a batch is either fully durable or fully absent.

use std::sync::Arc;

use crate::backend::{Backend, BackendError, Keyspace, ScanIter, WriteBatch, prefix_start};
use crate::storage::btree::{BTree, BTreeReader, Key};
use crate::storage::{BufferPool, DatabaseFile, FileOptions, Storage};

/// Keyspaces stored as B-trees in one database file.
pub struct PagedBackend<S: Storage> {
    file: DatabaseFile<S>,
}

impl<S: Storage> PagedBackend<S> {
    /// Open the backend, recovering and formatting the device as needed.
    pub fn open(
        storage: S,
        buffer_pool: Arc<BufferPool>,
        options: FileOptions,
    ) -> Result<Self, BackendError> {
        let file = DatabaseFile::open(storage, buffer_pool, options)?;
        Ok(Self { file })
    }

    #[must_use]
    pub const fn file(&self) -> &DatabaseFile<S> {
        &self.file
    }

    #[must_use]
    pub fn into_storage(self) -> S {
        self.file.into_storage()
    }

    fn apply_in_transaction(&mut self, batch: WriteBatch) -> Result<(), BackendError> {
        let mut groups: Vec<(Keyspace, Vec<(Key, Option<Vec<u8>>)>)> = Vec::new();
        for ((keyspace, key), value) in batch {
            match groups.last_mut() {
                Some((open, ops)) if *open == keyspace => ops.push((key, value)),
                _ => groups.push((keyspace, vec![(key, value)])),
            }
        }

        for (keyspace, ops) in groups {
            let mut tree = BTree::open(&mut self.file, keyspace.slot())?;
            for (key, value) in ops {
                match value {
                    Some(value) => tree.insert(key, &value)?,
                    None => {
                        tree.remove(&key)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S: Storage> Backend for PagedBackend<S> {
    fn get(&self, keyspace: Keyspace, key: &Key) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(BTreeReader::new(&self.file, keyspace.slot()).get(key)?)
    }

    fn scan(&self, keyspace: Keyspace, prefix: &[u8]) -> Result<ScanIter<'_>, BackendError> {
        let iter = BTreeReader::new(&self.file, keyspace.slot()).iter_from(&prefix_start(prefix))?;
        let prefix = prefix.to_vec();
        Ok(Box::new(
            iter.take_while(move |entry| {
                entry
                    .as_ref()
                    .map_or(true, |(key, _)| key.starts_with(&prefix))
            })
            .map(|entry| entry.map_err(BackendError::from)),
        ))
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<(), BackendError> {
        if batch.is_empty() {
            return Ok(());
        }
        let operations = batch.len();

        self.file.begin()?;
        if let Err(e) = self.apply_in_transaction(batch) {
            self.file.rollback();
            tracing::warn!(error = %e, "batch failed, transaction rolled back");
            return Err(e);
        }
        self.file.commit()?;

        tracing::debug!(
            operations,
            commit = self.file.committed_superblock().commit_count,
            "applied batch"
        );
        Ok(())
    }
}
