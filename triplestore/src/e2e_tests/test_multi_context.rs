//! Test one triple shared by several contexts.

use std::collections::BTreeSet;

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::Store;
use crate::types::{Context, ContextSelector, Triple, TriplePattern};

fn shared_triple<B: Backend>(store: &mut Store<B>) -> Triple {
    let found = store
        .triples(&TriplePattern::any(), &ContextSelector::Any)
        .expect("query")
        .next()
        .expect("one match")
        .expect("match");
    found.triple
}

fn multi_context<B: Backend>(store: &mut Store<B>) {
    assert!(add(store, "s", "p", "o", None));
    assert!(add(store, "s", "p", "o", Some("g1")));
    assert!(add(store, "s", "p", "o", Some("g2")));

    let g1 = Context::Named(store.lookup(&iri("g1")).expect("lookup").expect("interned"));
    let g2 = Context::Named(store.lookup(&iri("g2")).expect("lookup").expect("interned"));
    let triple = shared_triple(store);

    assert_eq!(
        store.contexts_of(&triple).expect("contexts"),
        BTreeSet::from([Context::Default, g1, g2])
    );
    let all: Vec<_> = store
        .triples(&TriplePattern::any(), &ContextSelector::Any)
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("matches");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].contexts.len(), 3);

    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 1);
    assert_eq!(store.len(&selector("g1")).expect("len"), 1);

    let removed = store
        .remove(&TriplePattern::exact(&iri("s"), &iri("p"), &iri("o")), &selector("g1"))
        .expect("remove");
    assert_eq!(removed, 1);
    assert_eq!(
        store.contexts_of(&triple).expect("contexts"),
        BTreeSet::from([Context::Default, g2])
    );
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 1);
    assert_eq!(store.ref_count(triple.subject).expect("count"), 1);

    // Removing from every context drops the triple and its terms.
    let removed = store
        .remove(&TriplePattern::exact(&iri("s"), &iri("p"), &iri("o")), &ContextSelector::Any)
        .expect("remove");
    assert_eq!(removed, 1);
    assert!(store.contexts_of(&triple).expect("contexts").is_empty());
    assert_eq!(store.term_count().expect("terms"), 0);
    assert_consistent(store);
}

#[test]
fn test_multi_context_memory() {
    multi_context(&mut memory_store());
}

#[test]
fn test_multi_context_paged() {
    multi_context(&mut paged_store());
}
