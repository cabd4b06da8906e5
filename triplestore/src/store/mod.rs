//! The context-aware triple store.
//!
//! [`Store`] coordinates the interner, the permutation indices and the
//! context registry over one [`Backend`]. Every mutating call stages all of
//! its keyspace writes in an overlay and applies them as a single batch, so
//! a failed call leaves no trace.
//!
//! # Reference accounting
//!
//! A term holds one reference per position it occupies in each distinct
//! triple, plus one while it names a registered context. Asserting a triple
//! that already exists in another context takes no new references.
//!
//! # Invariants
//!
//! - A term id exists iff its reference count is > 0.
//! - Every distinct triple is in `Spo`, `Pos` and `Osp`; every
//!   (context, triple) assertion is in `Cspo`, `Cpos`, `Cosp` and
//!   `Membership`.
//! - A context with no members is registered only if it was added
//!   explicitly.

mod check;
mod index;
mod interner;
mod keys;
mod matches;
mod overlay;
mod registry;
mod shared;

use std::collections::BTreeSet;
use std::sync::Arc;

pub use check::ConsistencyReport;
pub use matches::Matches;
pub use shared::SharedStore;

use crate::backend::{Backend, BackendError, MemoryBackend, PagedBackend, WriteBatch};
use crate::config::StoreConfig;
use crate::storage::{BufferPool, FileError, FileOptions, FileStorage, Storage};
use crate::store::index::{Unindexed, context_count, index_triple, unindex_triple};
use crate::store::keys::{META_TERM_COUNT, META_TRIPLE_COUNT, MembershipFlags};
use crate::store::matches::IdPattern;
use crate::store::overlay::Overlay;
use crate::types::{
    Context, ContextSelector, GraphName, QueryOptions, Term, TermId, Triple, TriplePattern,
};

/// Position of a term in an `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermPosition {
    Subject,
    Predicate,
    Object,
    Context,
}

impl std::fmt::Display for TermPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subject => write!(f, "subject"),
            Self::Predicate => write!(f, "predicate"),
            Self::Object => write!(f, "object"),
            Self::Context => write!(f, "context"),
        }
    }
}

/// Errors that can occur in store operations.
#[derive(Debug)]
pub enum StoreError {
    /// An id that is not interned was resolved or released.
    UnknownId(TermId),
    /// A literal in subject, predicate or context position.
    InvalidTerm { position: TermPosition, term: Term },
    /// The backend failed; the call's batch was not applied.
    StorageIo(BackendError),
    /// Stored data is undecodable or breaks an index invariant.
    Corruption(String),
    /// A thread panicked while holding the shared store's lock.
    LockPoisoned,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownId(id) => write!(f, "unknown term id {id}"),
            Self::InvalidTerm { position, term } => {
                write!(f, "{term} cannot be used as {position}")
            }
            Self::StorageIo(e) => write!(f, "storage error: {e}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::LockPoisoned => write!(f, "store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StorageIo(e) => Some(e),
            Self::UnknownId(_)
            | Self::InvalidTerm { .. }
            | Self::Corruption(_)
            | Self::LockPoisoned => None,
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(e: BackendError) -> Self {
        if e.is_io() {
            Self::StorageIo(e)
        } else {
            Self::Corruption(e.to_string())
        }
    }
}

/// A triple store over a backend.
pub struct Store<B: Backend> {
    backend: B,
}

impl Store<MemoryBackend> {
    /// An empty store that lives in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl<S: Storage> Store<PagedBackend<S>> {
    /// Open a store on a page device, recovering an interrupted commit.
    pub fn open_paged(
        storage: S,
        buffer_pool: Arc<BufferPool>,
        options: FileOptions,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(PagedBackend::open(storage, buffer_pool, options)?))
    }
}

impl Store<PagedBackend<FileStorage>> {
    /// Open the store file named by `config`, creating it if needed.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let storage = FileStorage::open(&config.database_path)
            .map_err(|e| StoreError::from(BackendError::File(FileError::Storage(e))))?;
        let store = Self::open_paged(
            storage,
            BufferPool::new(config.buffer_pool_pages),
            FileOptions {
                sync_on_commit: config.sync_on_commit,
            },
        )?;
        tracing::info!(path = %config.database_path.display(), "opened triple store");
        Ok(store)
    }
}

impl<B: Backend> Store<B> {
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn into_backend(self) -> B {
        self.backend
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.backend.apply(batch)?;
        Ok(())
    }

    /// Assert (`subject`, `predicate`, `object`) in `graph`.
    ///
    /// Quoted assertions are indexed but hidden from queries that do not
    /// ask for them. Re-asserting a triple in the same graph replaces its
    /// quoted flag. Returns whether the triple is new to `graph`.
    pub fn add(
        &mut self,
        subject: &Term,
        predicate: &Term,
        object: &Term,
        graph: &GraphName,
        quoted: bool,
    ) -> Result<bool, StoreError> {
        require_resource(subject, TermPosition::Subject)?;
        require_resource(predicate, TermPosition::Predicate)?;
        if let GraphName::Named(name) = graph {
            require_resource(name, TermPosition::Context)?;
        }

        let mut overlay = Overlay::new(&self.backend);
        let triple = match existing_triple(&overlay, subject, predicate, object)? {
            Some(triple) => triple,
            None => Triple::new(
                interner::intern(&mut overlay, subject)?,
                interner::intern(&mut overlay, predicate)?,
                interner::intern(&mut overlay, object)?,
            ),
        };
        let context = register_graph(&mut overlay, graph, false)?;

        let indexed = index_triple(&mut overlay, &triple, context, MembershipFlags { quoted })?;
        if indexed.new_in_context {
            registry::add_member(&mut overlay, context)?;
        }
        if indexed.new_triple {
            let count = interner::read_meta(&overlay, META_TRIPLE_COUNT)?;
            interner::write_meta(&mut overlay, META_TRIPLE_COUNT, count + 1);
        }

        let batch = overlay.into_batch();
        self.apply(batch)?;
        tracing::trace!(?triple, %context, quoted, new = indexed.new_in_context, "added triple");
        Ok(indexed.new_in_context)
    }

    /// Register `graph` so that it is listed even while empty.
    pub fn add_context(&mut self, graph: &GraphName) -> Result<(), StoreError> {
        if let GraphName::Named(name) = graph {
            require_resource(name, TermPosition::Context)?;
        }
        let mut overlay = Overlay::new(&self.backend);
        register_graph(&mut overlay, graph, true)?;
        let batch = overlay.into_batch();
        self.apply(batch)
    }

    /// Remove every triple of `graph` from it and unregister it. Triples
    /// asserted only in `graph` leave the store. Returns the number of
    /// triples removed from `graph`.
    pub fn remove_context(&mut self, graph: &GraphName) -> Result<usize, StoreError> {
        let Some(context) = self.known_graph(&ContextSelector::from(graph))? else {
            return Ok(0);
        };
        let mut overlay = Overlay::new(&self.backend);
        let removed = clear_context(&mut overlay, context)?;
        let batch = overlay.into_batch();
        self.apply(batch)?;
        tracing::debug!(%context, removed, "removed context");
        Ok(removed)
    }

    /// Remove the triples matching `pattern` from the selected contexts.
    ///
    /// - A bound selector with an unbound pattern removes the context itself,
    ///   as [`Store::remove_context`] does.
    /// - [`ContextSelector::Any`] with an unbound pattern empties the store
    ///   and unregisters every context.
    /// - [`ContextSelector::Any`] with a bound pattern removes the matches
    ///   from every context they are asserted in.
    ///
    /// Quoted assertions are removed too. Returns the number of distinct
    /// triples removed from at least one context; no match is not an error.
    pub fn remove(
        &mut self,
        pattern: &TriplePattern,
        selector: &ContextSelector,
    ) -> Result<usize, StoreError> {
        let Some(ids) = self.resolve_pattern(pattern)? else {
            return Ok(0);
        };
        let mut overlay = Overlay::new(&self.backend);

        let removed = match selector {
            ContextSelector::Any => {
                if pattern.is_unbound() {
                    let removed = interner::read_meta(&overlay, META_TRIPLE_COUNT)?;
                    for context in registry::known_contexts(&self.backend)? {
                        clear_context(&mut overlay, context)?;
                    }
                    usize::try_from(removed).map_err(|_| {
                        StoreError::Corruption(format!("triple count {removed} out of range"))
                    })?
                } else {
                    let mut removed = 0;
                    let found = Matches::global(&self.backend, ids, QueryOptions::including_quoted())?
                        .collect::<Result<Vec<_>, _>>()?;
                    for found in found {
                        for context in found.contexts {
                            retract(&mut overlay, &found.triple, context)?;
                        }
                        removed += 1;
                    }
                    removed
                }
            }
            ContextSelector::Default | ContextSelector::Named(_) => {
                let Some(context) = self.known_graph(selector)? else {
                    return Ok(0);
                };
                if pattern.is_unbound() {
                    clear_context(&mut overlay, context)?
                } else {
                    let mut removed = 0;
                    for triple in context_members(&self.backend, ids, context)? {
                        if retract(&mut overlay, &triple, context)?.removed_from_context {
                            removed += 1;
                        }
                    }
                    removed
                }
            }
        };

        let batch = overlay.into_batch();
        self.apply(batch)?;
        tracing::debug!(removed, "removed triples");
        Ok(removed)
    }

    /// Matches of `pattern` under `selector`, excluding quoted assertions.
    pub fn triples(
        &self,
        pattern: &TriplePattern,
        selector: &ContextSelector,
    ) -> Result<Matches<'_, B>, StoreError> {
        self.triples_with(pattern, selector, QueryOptions::default())
    }

    /// Matches of `pattern` under `selector`.
    ///
    /// Each match carries the contexts that assert it and satisfy the
    /// selector. The sequence is lazy; calling again starts over.
    pub fn triples_with(
        &self,
        pattern: &TriplePattern,
        selector: &ContextSelector,
        options: QueryOptions,
    ) -> Result<Matches<'_, B>, StoreError> {
        let Some(ids) = self.resolve_pattern(pattern)? else {
            return Ok(Matches::empty(&self.backend));
        };
        match selector {
            ContextSelector::Any => Matches::global(&self.backend, ids, options),
            ContextSelector::Default | ContextSelector::Named(_) => {
                match self.known_graph(selector)? {
                    Some(context) => Matches::in_context(&self.backend, ids, context, options),
                    None => Ok(Matches::empty(&self.backend)),
                }
            }
        }
    }

    /// Every context `triple` is asserted in, quoted or not.
    pub fn contexts_of(&self, triple: &Triple) -> Result<BTreeSet<Context>, StoreError> {
        registry::contexts_of(&self.backend, triple)
    }

    /// Every registered context, including empty explicit ones.
    pub fn known_contexts(&self) -> Result<Vec<Context>, StoreError> {
        registry::known_contexts(&self.backend)
    }

    /// Distinct triples in the selected context, or in the whole store for
    /// [`ContextSelector::Any`].
    pub fn len(&self, selector: &ContextSelector) -> Result<u64, StoreError> {
        let overlay = Overlay::new(&self.backend);
        if matches!(selector, ContextSelector::Any) {
            return interner::read_meta(&overlay, META_TRIPLE_COUNT);
        }
        let Some(context) = self.known_graph(selector)? else {
            return Ok(0);
        };
        Ok(registry::entry(&overlay, context)?.map_or(0, |entry| entry.members))
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len(&ContextSelector::Any)? == 0)
    }

    /// Number of interned terms.
    pub fn term_count(&self) -> Result<u64, StoreError> {
        interner::read_meta(&Overlay::new(&self.backend), META_TERM_COUNT)
    }

    pub fn lookup(&self, term: &Term) -> Result<Option<TermId>, StoreError> {
        interner::lookup(&Overlay::new(&self.backend), term)
    }

    pub fn resolve(&self, id: TermId) -> Result<Term, StoreError> {
        interner::resolve(&Overlay::new(&self.backend), id)
    }

    /// Reference count of `id`; 0 when it is not interned.
    pub fn ref_count(&self, id: TermId) -> Result<u64, StoreError> {
        interner::ref_count(&Overlay::new(&self.backend), id)
    }

    /// The terms of `triple`, in subject, predicate, object order.
    pub fn resolve_triple(&self, triple: &Triple) -> Result<(Term, Term, Term), StoreError> {
        let overlay = Overlay::new(&self.backend);
        Ok((
            interner::resolve(&overlay, triple.subject)?,
            interner::resolve(&overlay, triple.predicate)?,
            interner::resolve(&overlay, triple.object)?,
        ))
    }

    /// The graph name of `context`.
    pub fn graph_name(&self, context: Context) -> Result<GraphName, StoreError> {
        match context {
            Context::Default => Ok(GraphName::Default),
            Context::Named(id) => Ok(GraphName::Named(self.resolve(id)?)),
        }
    }

    /// Verify the cross-keyspace invariants.
    pub fn check_consistency(&self) -> Result<ConsistencyReport, StoreError> {
        check::check(&self.backend)
    }

    /// Resolve bound pattern terms. `None` when one is not interned, since
    /// then nothing can match.
    fn resolve_pattern(&self, pattern: &TriplePattern) -> Result<Option<IdPattern>, StoreError> {
        let overlay = Overlay::new(&self.backend);
        let resolve = |term: Option<&Term>| -> Result<Option<Option<TermId>>, StoreError> {
            match term {
                None => Ok(Some(None)),
                Some(term) => Ok(interner::lookup(&overlay, term)?.map(Some)),
            }
        };
        let (Some(subject), Some(predicate), Some(object)) = (
            resolve(pattern.subject.as_ref())?,
            resolve(pattern.predicate.as_ref())?,
            resolve(pattern.object.as_ref())?,
        ) else {
            return Ok(None);
        };
        Ok(Some(IdPattern {
            subject,
            predicate,
            object,
        }))
    }

    /// The registered context a bound selector names.
    fn known_graph(&self, selector: &ContextSelector) -> Result<Option<Context>, StoreError> {
        let overlay = Overlay::new(&self.backend);
        let context = match selector {
            ContextSelector::Any => return Ok(None),
            ContextSelector::Default => Context::Default,
            ContextSelector::Named(name) => match interner::lookup(&overlay, name)? {
                Some(id) => Context::Named(id),
                None => return Ok(None),
            },
        };
        Ok(registry::entry(&overlay, context)?.map(|_| context))
    }
}

impl<B: Backend> std::fmt::Debug for Store<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

fn require_resource(term: &Term, position: TermPosition) -> Result<(), StoreError> {
    if term.is_resource() {
        Ok(())
    } else {
        Err(StoreError::InvalidTerm {
            position,
            term: term.clone(),
        })
    }
}

/// The stored triple over these terms, if it is asserted anywhere.
fn existing_triple<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    subject: &Term,
    predicate: &Term,
    object: &Term,
) -> Result<Option<Triple>, StoreError> {
    let (Some(s), Some(p), Some(o)) = (
        interner::lookup(overlay, subject)?,
        interner::lookup(overlay, predicate)?,
        interner::lookup(overlay, object)?,
    ) else {
        return Ok(None);
    };
    let triple = Triple::new(s, p, o);
    Ok((context_count(overlay, &triple)? > 0).then_some(triple))
}

/// Resolve `graph` to a registered context, registering it (and taking the
/// reference on its name) when it is new.
fn register_graph<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    graph: &GraphName,
    explicit: bool,
) -> Result<Context, StoreError> {
    let context = match graph {
        GraphName::Default => Context::Default,
        GraphName::Named(name) => {
            let known = match interner::lookup(overlay, name)? {
                Some(id) if registry::entry(overlay, Context::Named(id))?.is_some() => {
                    Some(Context::Named(id))
                }
                _ => None,
            };
            match known {
                Some(context) => context,
                None => Context::Named(interner::intern(overlay, name)?),
            }
        }
    };
    registry::register(overlay, context, explicit)?;
    Ok(context)
}

/// Retract one assertion and settle the counters and references it held.
fn retract<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    triple: &Triple,
    context: Context,
) -> Result<Unindexed, StoreError> {
    let outcome = unindex_triple(overlay, triple, context)?;
    if outcome.removed_from_context {
        registry::remove_member(overlay, context)?;
    }
    if outcome.removed_triple {
        let count = interner::read_meta(overlay, META_TRIPLE_COUNT)?;
        let count = count
            .checked_sub(1)
            .ok_or_else(|| StoreError::Corruption("triple count underflow".to_string()))?;
        interner::write_meta(overlay, META_TRIPLE_COUNT, count);
        for id in [triple.subject, triple.predicate, triple.object] {
            interner::release(overlay, id)?;
        }
    }
    Ok(outcome)
}

/// Triples asserted in `context` matching `pattern`, quoted ones included.
fn context_members<B: Backend + ?Sized>(
    backend: &B,
    pattern: IdPattern,
    context: Context,
) -> Result<Vec<Triple>, StoreError> {
    Matches::in_context(backend, pattern, context, QueryOptions::including_quoted())?
        .map(|found| found.map(|found| found.triple))
        .collect()
}

/// Retract every member of `context` and unregister it.
fn clear_context<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    context: Context,
) -> Result<usize, StoreError> {
    let members = context_members(overlay.backend(), IdPattern::default(), context)?;
    for triple in &members {
        retract(overlay, triple, context)?;
    }
    // An implicit context went away with its last member.
    if registry::entry(overlay, context)?.is_some() {
        registry::unregister(overlay, context)?;
    }
    Ok(members.len())
}
