//! Core value types shared by the store and its backends.

mod ids;
mod term;
mod triple;

pub use ids::{Context, TermId};
pub use term::{Literal, Term, TermError, TermKind};
pub use triple::{
    ContextSelector, GraphName, QueryOptions, Triple, TripleMatch, TriplePattern,
};
