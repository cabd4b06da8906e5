//! Test that quoted assertions are stored but hidden unless requested.

use std::collections::BTreeSet;

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::Store;
use crate::types::{Context, ContextSelector, QueryOptions, TriplePattern};

fn quoted<B: Backend>(store: &mut Store<B>) {
    let (s, p, o) = (iri("s"), iri("claims"), iri("o"));
    store.add(&s, &p, &o, &graph("formula"), true).expect("add quoted");
    store.add(&s, &p, &o, &graph("facts"), false).expect("add asserted");

    let formula = Context::Named(store.lookup(&iri("formula")).expect("lookup").expect("interned"));
    let facts = Context::Named(store.lookup(&iri("facts")).expect("lookup").expect("interned"));

    let visible: Vec<_> = store
        .triples(&TriplePattern::any(), &ContextSelector::Any)
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("matches");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].contexts, BTreeSet::from([facts]));

    let everything: Vec<_> = store
        .triples_with(
            &TriplePattern::any(),
            &ContextSelector::Any,
            QueryOptions::including_quoted(),
        )
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("matches");
    assert_eq!(everything[0].contexts, BTreeSet::from([facts, formula]));

    assert!(matching(store, &TriplePattern::any(), &selector("formula")).is_empty());
    assert_eq!(
        store.contexts_of(&visible[0].triple).expect("contexts"),
        BTreeSet::from([facts, formula])
    );

    // Removal covers quoted assertions as well.
    let removed = store
        .remove(&TriplePattern::any(), &selector("formula"))
        .expect("remove");
    assert_eq!(removed, 1);
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 1);
    assert_consistent(store);
}

#[test]
fn test_quoted_memory() {
    quoted(&mut memory_store());
}

#[test]
fn test_quoted_paged() {
    quoted(&mut paged_store());
}
