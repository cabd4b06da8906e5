//! Read-your-writes view used while a mutation is staged.
//!
//! A store mutation reads the backend through an [`Overlay`] and stages its
//! writes in the overlay's batch. Reads see staged writes first, so later
//! steps of one `add` or `remove` observe the earlier ones. Nothing reaches
//! the backend until the finished batch is applied.

use std::collections::BTreeMap;

use crate::backend::{Backend, Keyspace, WriteBatch, prefix_start};
use crate::storage::btree::Key;
use crate::store::StoreError;

pub struct Overlay<'a, B: Backend + ?Sized> {
    backend: &'a B,
    batch: WriteBatch,
}

impl<'a, B: Backend + ?Sized> Overlay<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            batch: WriteBatch::new(),
        }
    }

    pub const fn backend(&self) -> &'a B {
        self.backend
    }

    pub fn get(&self, keyspace: Keyspace, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        match self.batch.staged(keyspace, key) {
            Some(staged) => Ok(staged.map(<[u8]>::to_vec)),
            None => Ok(self.backend.get(keyspace, key)?),
        }
    }

    #[cfg(test)]
    pub fn contains(&self, keyspace: Keyspace, key: &Key) -> Result<bool, StoreError> {
        Ok(self.get(keyspace, key)?.is_some())
    }

    /// Entries under `prefix` as the batch would leave them, in key order.
    pub fn scan(&self, keyspace: Keyspace, prefix: &[u8]) -> Result<Vec<(Key, Vec<u8>)>, StoreError> {
        let mut merged = BTreeMap::new();
        for entry in self.backend.scan(keyspace, prefix)? {
            let (key, value) = entry?;
            merged.insert(key, Some(value));
        }
        for (key, staged) in self
            .batch
            .range_from(keyspace, prefix_start(prefix))
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            merged.insert(*key, staged.map(<[u8]>::to_vec));
        }
        Ok(merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect())
    }

    pub fn put(&mut self, keyspace: Keyspace, key: Key, value: Vec<u8>) {
        self.batch.put(keyspace, key, value);
    }

    pub fn delete(&mut self, keyspace: Keyspace, key: Key) {
        self.batch.delete(keyspace, key);
    }

    pub fn into_batch(self) -> WriteBatch {
        self.batch
    }
}
