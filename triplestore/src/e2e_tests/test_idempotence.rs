//! Test that repeating an add changes nothing.

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::Store;
use crate::types::{ContextSelector, TriplePattern};

fn idempotence<B: Backend>(store: &mut Store<B>) {
    assert!(add(store, "s", "p", "o", Some("g")));
    let terms = store.term_count().expect("terms");
    let s = store.lookup(&iri("s")).expect("lookup").expect("interned");

    for _ in 0..3 {
        assert!(!add(store, "s", "p", "o", Some("g")));
    }

    assert_eq!(store.len(&selector("g")).expect("len"), 1);
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 1);
    assert_eq!(store.term_count().expect("terms"), terms);
    assert_eq!(store.ref_count(s).expect("count"), 1);
    assert_eq!(
        matching(store, &TriplePattern::any(), &ContextSelector::Any).len(),
        1
    );
    assert_consistent(store);
}

#[test]
fn test_idempotence_memory() {
    idempotence(&mut memory_store());
}

#[test]
fn test_idempotence_paged() {
    idempotence(&mut paged_store());
}
