//! In-memory backend.

use std::collections::BTreeMap;

use crate::backend::{Backend, BackendError, Keyspace, ScanIter, WriteBatch, prefix_start};
use crate::storage::btree::Key;

/// Keyspaces held in balanced trees. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    keyspaces: BTreeMap<Keyspace, BTreeMap<Key, Vec<u8>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in one keyspace.
    #[must_use]
    pub fn entry_count(&self, keyspace: Keyspace) -> usize {
        self.keyspaces.get(&keyspace).map_or(0, BTreeMap::len)
    }
}

impl Backend for MemoryBackend {
    fn get(&self, keyspace: Keyspace, key: &Key) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self
            .keyspaces
            .get(&keyspace)
            .and_then(|map| map.get(key))
            .cloned())
    }

    fn scan(&self, keyspace: Keyspace, prefix: &[u8]) -> Result<ScanIter<'_>, BackendError> {
        let Some(map) = self.keyspaces.get(&keyspace) else {
            return Ok(Box::new(std::iter::empty()));
        };
        let prefix = prefix.to_vec();
        Ok(Box::new(
            map.range(prefix_start(&prefix)..)
                .take_while(move |(key, _)| key.starts_with(&prefix))
                .map(|(key, value)| Ok((*key, value.clone()))),
        ))
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<(), BackendError> {
        for ((keyspace, key), value) in batch {
            let map = self.keyspaces.entry(keyspace).or_default();
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}
