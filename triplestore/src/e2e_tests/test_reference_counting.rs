//! Test that terms live exactly as long as something references them.

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::{Store, StoreError};
use crate::types::{ContextSelector, TriplePattern};

fn reference_counting<B: Backend>(store: &mut Store<B>) {
    add(store, "alice", "knows", "bob", None);
    add(store, "alice", "knows", "carol", None);
    add(store, "bob", "knows", "carol", None);

    let alice = store.lookup(&iri("alice")).expect("lookup").expect("interned");
    let knows = store.lookup(&iri("knows")).expect("lookup").expect("interned");
    let carol = store.lookup(&iri("carol")).expect("lookup").expect("interned");
    assert_eq!(store.ref_count(alice).expect("count"), 2);
    assert_eq!(store.ref_count(knows).expect("count"), 3);
    assert_eq!(store.term_count().expect("terms"), 4);

    let removed = store
        .remove(
            &TriplePattern::exact(&iri("alice"), &iri("knows"), &iri("bob")),
            &ContextSelector::Any,
        )
        .expect("remove");
    assert_eq!(removed, 1);
    assert_eq!(store.ref_count(alice).expect("count"), 1);
    assert_eq!(store.ref_count(knows).expect("count"), 2);

    store
        .remove(
            &TriplePattern::any().with_object(&iri("carol")),
            &ContextSelector::Any,
        )
        .expect("remove");
    assert_eq!(store.term_count().expect("terms"), 0);
    assert!(matches!(store.resolve(carol), Err(StoreError::UnknownId(_))));
    assert_eq!(store.lookup(&iri("alice")).expect("lookup"), None);
    assert!(store.is_empty().expect("empty"));
    assert_consistent(store);
}

fn ids_not_reused<B: Backend>(store: &mut Store<B>) {
    add(store, "s", "p", "o", None);
    let old = store.lookup(&iri("o")).expect("lookup").expect("interned");
    store
        .remove(&TriplePattern::any(), &ContextSelector::Any)
        .expect("remove");

    add(store, "s", "p", "o", None);
    let new = store.lookup(&iri("o")).expect("lookup").expect("interned");
    assert!(new > old);
    assert_consistent(store);
}

#[test]
fn test_reference_counting_memory() {
    reference_counting(&mut memory_store());
}

#[test]
fn test_reference_counting_paged() {
    reference_counting(&mut paged_store());
}

#[test]
fn test_ids_not_reused_memory() {
    ids_not_reused(&mut memory_store());
}

#[test]
fn test_ids_not_reused_paged() {
    ids_not_reused(&mut paged_store());
}
