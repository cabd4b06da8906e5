//! Identifier types for interned terms and contexts.
//!
//! # Invariants
//!
//! - `TermId(0)` is never assigned to a term; it encodes the default context
//!   in context-qualified keys.
//! - Identifiers are compared numerically, which is also their key order.

use std::fmt;

/// Dense identifier of an interned term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub u64);

impl TermId {
    /// The first identifier handed out by a fresh interner.
    pub const FIRST: Self = Self(1);

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A context a triple is asserted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Context {
    /// Triples asserted outside any named graph.
    Default,
    /// A named graph, identified by its interned IRI or blank node.
    Named(TermId),
}

impl Context {
    /// Encode as the leading component of a context-qualified key.
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        match self {
            Self::Default => 0,
            Self::Named(id) => id.0,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        if raw == 0 {
            Self::Default
        } else {
            Self::Named(TermId(raw))
        }
    }

    /// The term id naming this context, if any.
    #[must_use]
    pub const fn term_id(self) -> Option<TermId> {
        match self {
            Self::Default => None,
            Self::Named(id) => Some(id),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Named(id) => write!(f, "graph {id}"),
        }
    }
}
