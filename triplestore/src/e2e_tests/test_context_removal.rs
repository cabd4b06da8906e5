//! Test removing whole contexts and explicit context registration.

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::Store;
use crate::types::{Context, ContextSelector, GraphName, TriplePattern};

fn remove_context<B: Backend>(store: &mut Store<B>) {
    add(store, "a", "p", "b", Some("g"));
    add(store, "a", "p", "c", Some("g"));
    add(store, "a", "p", "c", Some("h"));

    let removed = store.remove_context(&graph("g")).expect("remove");
    assert_eq!(removed, 2);

    // (a p b) lived only in g; (a p c) survives in h.
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 1);
    assert_eq!(store.lookup(&iri("b")).expect("lookup"), None);
    assert_eq!(store.lookup(&iri("g")).expect("lookup"), None);
    assert_eq!(store.len(&selector("g")).expect("len"), 0);
    assert_eq!(store.known_contexts().expect("contexts").len(), 1);
    assert_eq!(store.remove_context(&graph("g")).expect("remove again"), 0);
    assert_consistent(store);
}

fn unbound_pattern_removes_context<B: Backend>(store: &mut Store<B>) {
    store.add_context(&graph("g")).expect("add context");
    add(store, "a", "p", "b", Some("g"));
    add(store, "a", "p", "b", None);

    let removed = store
        .remove(&TriplePattern::any(), &selector("g"))
        .expect("remove");
    assert_eq!(removed, 1);

    // Remove-context semantics unregister even an explicit context.
    assert_eq!(store.known_contexts().expect("contexts"), vec![Context::Default]);
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 1);
    assert_consistent(store);
}

fn remove_everything<B: Backend>(store: &mut Store<B>) {
    store.add_context(&graph("empty")).expect("add context");
    add(store, "a", "p", "b", Some("g"));
    add(store, "a", "p", "b", Some("h"));
    add(store, "c", "p", "d", None);

    let removed = store
        .remove(&TriplePattern::any(), &ContextSelector::Any)
        .expect("remove");
    assert_eq!(removed, 2);
    assert!(store.is_empty().expect("empty"));
    assert!(store.known_contexts().expect("contexts").is_empty());
    assert_eq!(store.term_count().expect("terms"), 0);
    assert_consistent(store);
}

fn explicit_context_survives_empty<B: Backend>(store: &mut Store<B>) {
    store.add_context(&graph("kept")).expect("add context");
    store.add_context(&graph("kept")).expect("add context again");
    add(store, "a", "p", "b", Some("kept"));
    add(store, "a", "p", "b", Some("dropped"));

    store
        .remove(&TriplePattern::any().with_subject(&iri("a")), &ContextSelector::Any)
        .expect("remove");

    let kept = Context::Named(store.lookup(&iri("kept")).expect("lookup").expect("interned"));
    assert_eq!(store.known_contexts().expect("contexts"), vec![kept]);
    assert_eq!(store.len(&selector("kept")).expect("len"), 0);
    assert_eq!(store.graph_name(kept).expect("graph"), graph("kept"));

    store.add_context(&GraphName::Default).expect("add default");
    assert_eq!(store.known_contexts().expect("contexts").len(), 2);
    assert_consistent(store);
}

#[test]
fn test_remove_context_memory() {
    remove_context(&mut memory_store());
}

#[test]
fn test_remove_context_paged() {
    remove_context(&mut paged_store());
}

#[test]
fn test_unbound_pattern_removes_context_memory() {
    unbound_pattern_removes_context(&mut memory_store());
}

#[test]
fn test_unbound_pattern_removes_context_paged() {
    unbound_pattern_removes_context(&mut paged_store());
}

#[test]
fn test_remove_everything_memory() {
    remove_everything(&mut memory_store());
}

#[test]
fn test_remove_everything_paged() {
    remove_everything(&mut paged_store());
}

#[test]
fn test_explicit_context_survives_empty_memory() {
    explicit_context_survives_empty(&mut memory_store());
}

#[test]
fn test_explicit_context_survives_empty_paged() {
    explicit_context_survives_empty(&mut paged_store());
}
