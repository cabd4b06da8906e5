//! Test that contexts do not see or disturb each other's triples.

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::Store;
use crate::types::{ContextSelector, TriplePattern};

fn context_isolation<B: Backend>(store: &mut Store<B>) {
    add(store, "s", "p", "one", Some("g1"));
    add(store, "s", "p", "two", Some("g2"));
    add(store, "s", "p", "zero", None);

    let in_g1 = matching(store, &TriplePattern::any(), &selector("g1"));
    assert_eq!(in_g1.len(), 1);
    assert!(in_g1.contains(&(iri("s"), iri("p"), iri("one"))));

    let in_default = matching(store, &TriplePattern::any(), &ContextSelector::Default);
    assert_eq!(in_default.len(), 1);
    assert!(in_default.contains(&(iri("s"), iri("p"), iri("zero"))));

    let removed = store
        .remove(&TriplePattern::any().with_subject(&iri("s")), &selector("g1"))
        .expect("remove");
    assert_eq!(removed, 1);
    assert_eq!(store.len(&selector("g2")).expect("len"), 1);
    assert_eq!(store.len(&ContextSelector::Default).expect("len"), 1);
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 2);

    // g1 was never added explicitly, so it went away with its last triple.
    assert_eq!(store.known_contexts().expect("contexts").len(), 2);
    assert_eq!(store.lookup(&iri("g1")).expect("lookup"), None);
    assert_consistent(store);
}

#[test]
fn test_context_isolation_memory() {
    context_isolation(&mut memory_store());
}

#[test]
fn test_context_isolation_paged() {
    context_isolation(&mut paged_store());
}
