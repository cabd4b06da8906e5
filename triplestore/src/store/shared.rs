//! Store shared between threads.
//!
//! Readers take the lock shared and run concurrently; `add` and `remove`
//! take it exclusively, so a reader never sees a half-applied call. A
//! thread that panics while holding the lock poisons it and every later
//! call fails with [`StoreError::LockPoisoned`].

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::Backend;
use crate::store::{ConsistencyReport, Store, StoreError};
use crate::types::{
    Context, ContextSelector, GraphName, QueryOptions, Term, Triple, TripleMatch, TriplePattern,
};

/// A cloneable handle to one store.
pub struct SharedStore<B: Backend> {
    inner: Arc<RwLock<Store<B>>>,
}

impl<B: Backend> Clone for SharedStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> SharedStore<B> {
    #[must_use]
    pub fn new(store: Store<B>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Shared access for any number of concurrent readers.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Store<B>>, StoreError> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    /// Exclusive access for one writer.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Store<B>>, StoreError> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn add(
        &self,
        subject: &Term,
        predicate: &Term,
        object: &Term,
        graph: &GraphName,
        quoted: bool,
    ) -> Result<bool, StoreError> {
        self.write()?.add(subject, predicate, object, graph, quoted)
    }

    pub fn add_context(&self, graph: &GraphName) -> Result<(), StoreError> {
        self.write()?.add_context(graph)
    }

    pub fn remove(
        &self,
        pattern: &TriplePattern,
        selector: &ContextSelector,
    ) -> Result<usize, StoreError> {
        self.write()?.remove(pattern, selector)
    }

    pub fn remove_context(&self, graph: &GraphName) -> Result<usize, StoreError> {
        self.write()?.remove_context(graph)
    }

    /// Collect the matches of a query under one read lock.
    pub fn triples(
        &self,
        pattern: &TriplePattern,
        selector: &ContextSelector,
        options: QueryOptions,
    ) -> Result<Vec<TripleMatch>, StoreError> {
        let store = self.read()?;
        let matches = store.triples_with(pattern, selector, options)?;
        matches.collect()
    }

    pub fn contexts_of(&self, triple: &Triple) -> Result<BTreeSet<Context>, StoreError> {
        self.read()?.contexts_of(triple)
    }

    pub fn known_contexts(&self) -> Result<Vec<Context>, StoreError> {
        self.read()?.known_contexts()
    }

    pub fn len(&self, selector: &ContextSelector) -> Result<u64, StoreError> {
        self.read()?.len(selector)
    }

    pub fn check_consistency(&self) -> Result<ConsistencyReport, StoreError> {
        self.read()?.check_consistency()
    }
}
