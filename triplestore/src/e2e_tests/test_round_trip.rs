//! Test that added triples come back with their terms and contexts.

use std::collections::BTreeSet;

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::Store;
use crate::types::{Context, ContextSelector, GraphName, Term, TriplePattern};

fn round_trip<B: Backend>(store: &mut Store<B>) {
    let subject = Term::blank("alice");
    let predicate = iri("label");
    let objects = [
        Term::literal("Alice"),
        Term::lang_literal("Alicia", "es"),
        Term::typed_literal("42", "http://www.w3.org/2001/XMLSchema#integer"),
        iri("Person"),
    ];
    for object in &objects {
        assert!(store
            .add(&subject, &predicate, object, &graph("people"), false)
            .expect("add"));
    }

    let found = matching(
        store,
        &TriplePattern::any().with_subject(&subject),
        &ContextSelector::Any,
    );
    let expected: BTreeSet<_> = objects
        .iter()
        .map(|object| (subject.clone(), predicate.clone(), object.clone()))
        .collect();
    assert_eq!(found, expected);

    let g = store.lookup(&iri("people")).expect("lookup").expect("interned");
    for found in store
        .triples(&TriplePattern::any(), &ContextSelector::Any)
        .expect("query")
    {
        let found = found.expect("match");
        assert_eq!(found.contexts, BTreeSet::from([Context::Named(g)]));
    }
    assert_eq!(store.graph_name(Context::Named(g)).expect("graph"), graph("people"));
    assert_eq!(store.graph_name(Context::Default).expect("graph"), GraphName::Default);
    assert_consistent(store);
}

#[test]
fn test_round_trip_memory() {
    round_trip(&mut memory_store());
}

#[test]
fn test_round_trip_paged() {
    round_trip(&mut paged_store());
}
