//! Triples, patterns and context selectors.

use std::collections::BTreeSet;

use crate::types::{Context, Term, TermId};

/// A statement over interned term ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: TermId,
    pub predicate: TermId,
    pub object: TermId,
}

impl Triple {
    #[must_use]
    pub const fn new(subject: TermId, predicate: TermId, object: TermId) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

/// A triple pattern over terms. `None` is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
}

impl TriplePattern {
    /// The pattern matching every triple.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            subject: None,
            predicate: None,
            object: None,
        }
    }

    /// A fully bound pattern.
    #[must_use]
    pub fn exact(subject: &Term, predicate: &Term, object: &Term) -> Self {
        Self {
            subject: Some(subject.clone()),
            predicate: Some(predicate.clone()),
            object: Some(object.clone()),
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: &Term) -> Self {
        self.subject = Some(subject.clone());
        self
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: &Term) -> Self {
        self.predicate = Some(predicate.clone());
        self
    }

    #[must_use]
    pub fn with_object(mut self, object: &Term) -> Self {
        self.object = Some(object.clone());
        self
    }

    #[must_use]
    pub const fn is_unbound(&self) -> bool {
        self.subject.is_none() && self.predicate.is_none() && self.object.is_none()
    }
}

/// The graph a triple is added to or a context is registered as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphName {
    Default,
    Named(Term),
}

impl GraphName {
    #[must_use]
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Named(Term::iri(iri))
    }
}

/// The context constraint of a query or removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextSelector {
    /// Match regardless of context.
    Any,
    /// Only the default context.
    Default,
    /// Only the named graph.
    Named(Term),
}

impl ContextSelector {
    #[must_use]
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Named(Term::iri(iri))
    }
}

impl From<&GraphName> for ContextSelector {
    fn from(graph: &GraphName) -> Self {
        match graph {
            GraphName::Default => Self::Default,
            GraphName::Named(term) => Self::Named(term.clone()),
        }
    }
}

/// One result of a pattern query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripleMatch {
    pub triple: Triple,
    /// The contexts the triple is asserted in that satisfy the query's
    /// context constraint. Never empty.
    pub contexts: BTreeSet<Context>,
}

/// Query knobs beyond the pattern itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Also report quoted (hypothetical) assertions.
    pub include_quoted: bool,
}

impl QueryOptions {
    #[must_use]
    pub const fn including_quoted() -> Self {
        Self {
            include_quoted: true,
        }
    }
}
