//! Test that a crash at any point of a commit recovers to the state before
//! or after it, never in between.

use std::collections::BTreeSet;

use crate::e2e_tests::helpers::*;
use crate::simulation::{FaultConfig, SimulatedStorage};
use crate::backend::Backend;
use crate::store::{Store, StoreError};
use crate::types::{ContextSelector, TriplePattern};

fn populate<B: Backend>(store: &mut Store<B>) {
    for i in 0..40 {
        add(store, &format!("s{i}"), "p", &format!("o{}", i % 5), Some("g"));
    }
    add(store, "s0", "p", "o0", None);
}

fn mutate<B: Backend>(store: &mut Store<B>) -> Result<(), StoreError> {
    store.remove(&TriplePattern::any().with_object(&iri("o1")), &ContextSelector::Any)?;
    Ok(())
}

fn recovered_quads(device: &SimulatedStorage) -> BTreeSet<Quad> {
    let store = paged_store_on(device.clone());
    assert_consistent(&store);
    quads(&store)
}

#[test]
fn test_crash_during_commit() {
    let mut reference = memory_store();
    populate(&mut reference);
    let before = quads(&reference);
    mutate(&mut reference).expect("mutate");
    let after = quads(&reference);
    assert_ne!(before, after);

    let mut outcomes = BTreeSet::new();
    for n in 0..100 {
        let device = SimulatedStorage::new(n);
        let mut store = paged_store_on(device.clone());
        populate(&mut store);

        device.set_faults(FaultConfig::fail_writes_from(n));
        let result = mutate(&mut store);
        drop(store);

        let durable = recovered_quads(&device.crash_image());
        if result.is_ok() {
            assert_eq!(durable, after, "committed mutation lost at #{n}");
        } else {
            assert_eq!(durable, before, "crash at write #{n} recovered a partial commit");
        }
        for seed in 0..4 {
            let torn = recovered_quads(&device.crash_image_torn(seed));
            assert!(
                torn == before || torn == after,
                "torn image {seed} at write #{n} recovered an intermediate state"
            );
        }

        outcomes.insert(result.is_ok());
        if result.is_ok() {
            break;
        }
    }
    assert_eq!(outcomes, BTreeSet::from([false, true]));
}

#[test]
fn test_crash_between_commits() {
    let device = SimulatedStorage::new(3);
    let mut store = paged_store_on(device.clone());
    populate(&mut store);
    let first = quads(&store);
    mutate(&mut store).expect("mutate");
    let second = quads(&store);

    // Everything committed was synced, so tearing changes nothing.
    assert_eq!(recovered_quads(&device.crash_image()), second);
    for seed in 0..4 {
        assert_eq!(recovered_quads(&device.crash_image_torn(seed)), second);
    }
    assert_ne!(first, second);
}

#[test]
fn test_recovered_store_accepts_writes() {
    let device = SimulatedStorage::new(5);
    let mut store = paged_store_on(device.clone());
    populate(&mut store);
    let before = quads(&store);

    device.set_faults(FaultConfig::fail_writes_from(3));
    assert!(mutate(&mut store).is_err());
    assert!(store.backend().file().is_poisoned());
    assert!(
        store
            .add(&iri("late"), &iri("p"), &iri("o"), &graph("g"), false)
            .is_err()
    );
    drop(store);

    let image = device.crash_image();
    let mut store = paged_store_on(image);
    assert_eq!(quads(&store), before);
    add(&mut store, "late", "p", "o", Some("g"));
    mutate(&mut store).expect("mutate after recovery");
    assert_eq!(store.len(&selector("g")).expect("len"), 41 - 8);
    assert_consistent(&store);
}
