//! Lazy pattern-match enumeration.
//!
//! A [`Matches`] wraps one prefix scan of a permutation index and decodes
//! entries as the caller pulls them. Context-free queries scan a global
//! index, so each distinct triple comes out once, and then collect the
//! triple's contexts from the membership index. Context-bound queries scan
//! the context-qualified index under the requested context.

use std::collections::BTreeSet;

use crate::backend::{Backend, ScanIter};
use crate::store::StoreError;
use crate::store::index::{Permutation, membership};
use crate::store::keys::prefix;
use crate::store::overlay::Overlay;
use crate::store::registry::memberships;
use crate::types::{Context, QueryOptions, TermId, TripleMatch};

/// A pattern resolved to ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdPattern {
    pub subject: Option<TermId>,
    pub predicate: Option<TermId>,
    pub object: Option<TermId>,
}

impl IdPattern {
    #[must_use]
    pub const fn permutation(&self) -> Permutation {
        Permutation::for_bound(
            self.subject.is_some(),
            self.predicate.is_some(),
            self.object.is_some(),
        )
    }

    /// Bound components in `permutation` order. Stops at the first unbound
    /// one.
    fn bound_prefix(&self, permutation: Permutation) -> Vec<u64> {
        let ordered = match permutation {
            Permutation::Spo => [self.subject, self.predicate, self.object],
            Permutation::Pos => [self.predicate, self.object, self.subject],
            Permutation::Osp => [self.object, self.subject, self.predicate],
        };
        ordered
            .iter()
            .map_while(|component| component.map(|id| id.0))
            .collect()
    }
}

enum Scope {
    /// Nothing can match.
    Empty,
    Global,
    Context,
}

/// Lazy sequence of pattern matches.
pub struct Matches<'a, B: Backend + ?Sized> {
    backend: &'a B,
    scan: Option<ScanIter<'a>>,
    permutation: Permutation,
    scope: Scope,
    options: QueryOptions,
}

impl<'a, B: Backend + ?Sized> Matches<'a, B> {
    /// Matches that yield nothing, for patterns naming unknown terms.
    #[must_use]
    pub fn empty(backend: &'a B) -> Self {
        Self {
            backend,
            scan: None,
            permutation: Permutation::Spo,
            scope: Scope::Empty,
            options: QueryOptions::default(),
        }
    }

    /// Matches of `pattern` in any context.
    pub fn global(
        backend: &'a B,
        pattern: IdPattern,
        options: QueryOptions,
    ) -> Result<Self, StoreError> {
        let permutation = pattern.permutation();
        let scan = backend.scan(
            permutation.global_keyspace(),
            &prefix(&pattern.bound_prefix(permutation)),
        )?;
        Ok(Self {
            backend,
            scan: Some(scan),
            permutation,
            scope: Scope::Global,
            options,
        })
    }

    /// Matches of `pattern` asserted in `context`.
    pub fn in_context(
        backend: &'a B,
        pattern: IdPattern,
        context: Context,
        options: QueryOptions,
    ) -> Result<Self, StoreError> {
        let permutation = pattern.permutation();
        let mut parts = vec![context.to_raw()];
        parts.extend(pattern.bound_prefix(permutation));
        let scan = backend.scan(permutation.context_keyspace(), &prefix(&parts))?;
        Ok(Self {
            backend,
            scan: Some(scan),
            permutation,
            scope: Scope::Context,
            options,
        })
    }

    fn next_match(&mut self) -> Option<Result<Option<TripleMatch>, StoreError>> {
        let scan = self.scan.as_mut()?;
        let (key, _) = match scan.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };

        let resolved = match self.scope {
            Scope::Empty => Ok(None),
            Scope::Global => {
                let triple = self.permutation.global_triple(&key);
                memberships(self.backend, &triple).map(|found| {
                    let contexts: BTreeSet<Context> = found
                        .into_iter()
                        .filter(|(_, flags)| self.options.include_quoted || !flags.quoted)
                        .map(|(context, _)| context)
                        .collect();
                    (!contexts.is_empty()).then_some(TripleMatch { triple, contexts })
                })
            }
            Scope::Context => {
                let (context, triple) = self.permutation.context_triple(&key);
                membership(&Overlay::new(self.backend), &triple, context).and_then(|flags| {
                    let flags = flags.ok_or_else(|| {
                        StoreError::Corruption(format!(
                            "{triple:?} indexed in {context} without a membership record"
                        ))
                    })?;
                    Ok((self.options.include_quoted || !flags.quoted).then(|| TripleMatch {
                        triple,
                        contexts: BTreeSet::from([context]),
                    }))
                })
            }
        };
        Some(resolved)
    }
}

impl<B: Backend + ?Sized> Iterator for Matches<'_, B> {
    type Item = Result<TripleMatch, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_match()? {
                Ok(Some(found)) => return Some(Ok(found)),
                Ok(None) => {}
                Err(e) => {
                    // A failed scan cannot be resumed.
                    self.scan = None;
                    return Some(Err(e));
                }
            }
        }
    }
}
