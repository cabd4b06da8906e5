//! Common helpers for end-to-end tests.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::backend::{Backend, MemoryBackend, PagedBackend};
use crate::config::StoreConfig;
use crate::simulation::SimulatedStorage;
use crate::storage::{BufferPool, FileOptions, FileStorage};
use crate::store::Store;
use crate::testing::{TEST_POOL_PAGES, temp_database_path};
use crate::types::{
    Context, ContextSelector, GraphName, QueryOptions, Term, TriplePattern,
};

/// One assertion as terms: subject, predicate, object, graph (`None` for
/// the default graph).
pub type Quad = (Term, Term, Term, Option<Term>);

#[must_use]
pub fn iri(name: &str) -> Term {
    Term::iri(format!("http://example.org/{name}"))
}

#[must_use]
pub fn graph(name: &str) -> GraphName {
    GraphName::Named(iri(name))
}

#[must_use]
pub fn selector(name: &str) -> ContextSelector {
    ContextSelector::Named(iri(name))
}

#[must_use]
pub fn memory_store() -> Store<MemoryBackend> {
    Store::in_memory()
}

/// A paged store on a fresh simulated device.
#[must_use]
pub fn paged_store() -> Store<PagedBackend<SimulatedStorage>> {
    paged_store_on(SimulatedStorage::new(7))
}

pub fn paged_store_on(device: SimulatedStorage) -> Store<PagedBackend<SimulatedStorage>> {
    Store::open_paged(device, BufferPool::new(TEST_POOL_PAGES), FileOptions::default())
        .expect("open paged store")
}

/// A database file in a temporary directory, removed on drop.
pub struct TestFile {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl TestFile {
    #[must_use]
    pub fn new() -> Self {
        let (dir, path) = temp_database_path();
        Self { _dir: dir, path }
    }

    #[must_use]
    pub fn config(&self) -> StoreConfig {
        StoreConfig {
            database_path: self.path.clone(),
            buffer_pool_pages: TEST_POOL_PAGES,
            sync_on_commit: true,
        }
    }

    pub fn open(&self) -> Store<PagedBackend<FileStorage>> {
        Store::open(&self.config()).expect("open file store")
    }
}

pub fn add<B: Backend>(store: &mut Store<B>, s: &str, p: &str, o: &str, g: Option<&str>) -> bool {
    let graph = g.map_or(GraphName::Default, graph);
    store
        .add(&iri(s), &iri(p), &iri(o), &graph, false)
        .expect("add")
}

/// Every assertion in the store, quoted ones included.
pub fn quads<B: Backend>(store: &Store<B>) -> BTreeSet<Quad> {
    let mut quads = BTreeSet::new();
    let matches = store
        .triples_with(
            &TriplePattern::any(),
            &ContextSelector::Any,
            QueryOptions::including_quoted(),
        )
        .expect("query");
    for found in matches {
        let found = found.expect("match");
        let (s, p, o) = store.resolve_triple(&found.triple).expect("resolve");
        for context in found.contexts {
            let graph = match context {
                Context::Default => None,
                Context::Named(id) => Some(store.resolve(id).expect("resolve graph")),
            };
            quads.insert((s.clone(), p.clone(), o.clone(), graph));
        }
    }
    quads
}

/// Matches of a query as term triples.
pub fn matching<B: Backend>(
    store: &Store<B>,
    pattern: &TriplePattern,
    selector: &ContextSelector,
) -> BTreeSet<(Term, Term, Term)> {
    store
        .triples(pattern, selector)
        .expect("query")
        .map(|found| {
            store
                .resolve_triple(&found.expect("match").triple)
                .expect("resolve")
        })
        .collect()
}

pub fn assert_consistent<B: Backend>(store: &Store<B>) {
    let report = store.check_consistency().expect("check");
    assert!(report.is_consistent(), "{:#?}", report.problems);
}
