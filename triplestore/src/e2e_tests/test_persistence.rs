//! Test that a file-backed store reopens with everything it committed.

use crate::e2e_tests::helpers::*;
use crate::types::{ContextSelector, Term, TriplePattern};

#[test]
fn test_reopen_preserves_store() {
    let file = TestFile::new();
    let long = Term::lang_literal("x".repeat(3000), "en");

    let (ids, contexts, terms) = {
        let mut store = file.open();
        add(&mut store, "alice", "knows", "bob", None);
        add(&mut store, "alice", "knows", "bob", Some("social"));
        add(&mut store, "bob", "knows", "carol", Some("social"));
        store.add_context(&graph("archive")).expect("add context");
        store
            .add(&iri("alice"), &iri("bio"), &long, &graph("profile"), false)
            .expect("add long literal");

        let ids = [
            store.lookup(&iri("alice")).expect("lookup"),
            store.lookup(&long).expect("lookup"),
        ];
        let contexts = store.known_contexts().expect("contexts");
        let terms = store.term_count().expect("terms");
        assert_consistent(&store);
        (ids, contexts, terms)
    };

    let mut store = file.open();
    assert_eq!(store.lookup(&iri("alice")).expect("lookup"), ids[0]);
    assert_eq!(store.lookup(&long).expect("lookup"), ids[1]);
    assert_eq!(store.known_contexts().expect("contexts"), contexts);
    assert_eq!(store.term_count().expect("terms"), terms);
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 3);
    assert_eq!(store.len(&selector("social")).expect("len"), 2);
    assert_eq!(store.len(&selector("archive")).expect("len"), 0);

    let bios = matching(&store, &TriplePattern::any().with_object(&long), &selector("profile"));
    assert_eq!(bios.len(), 1);
    assert_consistent(&store);

    // The reopened store keeps allocating past the old ids.
    add(&mut store, "dave", "knows", "alice", None);
    let dave = store.lookup(&iri("dave")).expect("lookup").expect("interned");
    assert!(ids.iter().flatten().all(|&id| id < dave));
    assert_consistent(&store);
}

#[test]
fn test_reopen_after_removals() {
    let file = TestFile::new();
    {
        let mut store = file.open();
        for i in 0..200 {
            add(&mut store, &format!("s{i}"), "p", &format!("o{}", i % 7), Some("g"));
        }
        store
            .remove(&TriplePattern::any().with_object(&iri("o3")), &ContextSelector::Any)
            .expect("remove");
        store.remove_context(&graph("missing")).expect("remove missing");
    }

    let store = file.open();
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 200 - 29);
    assert!(matching(&store, &TriplePattern::any().with_object(&iri("o3")), &ContextSelector::Any)
        .is_empty());
    assert_eq!(store.lookup(&iri("s3")).expect("lookup"), None);
    assert_eq!(store.len(&ContextSelector::Default).expect("len"), 0);
    let contexts = store.known_contexts().expect("contexts");
    assert_eq!(contexts.len(), 1);
    assert_eq!(store.graph_name(contexts[0]).expect("graph"), graph("g"));
    assert_consistent(&store);
}
