//! Test that a mutation failing on the device leaves the store untouched.

use crate::backend::PagedBackend;
use crate::e2e_tests::helpers::*;
use crate::simulation::{FaultConfig, SimulatedStorage};
use crate::store::{Store, StoreError};
use crate::types::{ContextSelector, TriplePattern};

type PagedStore = Store<PagedBackend<SimulatedStorage>>;

fn seeded() -> (SimulatedStorage, PagedStore) {
    let device = SimulatedStorage::new(11);
    let mut store = paged_store_on(device.clone());
    add(&mut store, "alice", "knows", "bob", None);
    add(&mut store, "alice", "knows", "carol", Some("social"));
    add(&mut store, "bob", "likes", "tea", Some("social"));
    (device, store)
}

/// Run `op` with each single fault from `faults` until one run succeeds.
/// Every failed run must leave the store exactly as it was.
fn fail_until_success(
    faults: impl Fn(u64) -> FaultConfig,
    op: impl Fn(&mut PagedStore) -> Result<(), StoreError>,
) {
    let (device, mut store) = seeded();
    let before = quads(&store);
    let mut failures = 0;

    for n in 0..200 {
        device.set_faults(faults(n));
        let result = op(&mut store);
        device.set_faults(FaultConfig::no_faults());

        match result {
            Ok(()) => {
                assert!(failures > 0, "no fault was ever injected");
                assert_ne!(quads(&store), before);
                assert_consistent(&store);
                return;
            }
            Err(e) => {
                assert!(matches!(e, StoreError::StorageIo(_)), "unexpected error: {e}");
                assert!(!store.backend().file().is_poisoned());
                assert_eq!(quads(&store), before, "fault #{n} leaked a partial write");
                assert_consistent(&store);
                failures += 1;
            }
        }
    }
    panic!("operation never succeeded");
}

fn add_op(store: &mut PagedStore) -> Result<(), StoreError> {
    store
        .add(&iri("carol"), &iri("knows"), &iri("dave"), &graph("work"), false)
        .map(|_| ())
}

fn remove_op(store: &mut PagedStore) -> Result<(), StoreError> {
    store
        .remove(&TriplePattern::any().with_subject(&iri("alice")), &ContextSelector::Any)
        .map(|_| ())
}

fn remove_context_op(store: &mut PagedStore) -> Result<(), StoreError> {
    store.remove_context(&graph("social")).map(|_| ())
}

#[test]
fn test_write_faults_during_add() {
    fail_until_success(FaultConfig::fail_write_at, add_op);
}

#[test]
fn test_write_faults_during_remove() {
    fail_until_success(FaultConfig::fail_write_at, remove_op);
}

#[test]
fn test_write_faults_during_remove_context() {
    fail_until_success(FaultConfig::fail_write_at, remove_context_op);
}

#[test]
fn test_sync_faults_during_add() {
    fail_until_success(FaultConfig::fail_sync_at, add_op);
}

#[test]
fn test_sync_faults_during_remove() {
    fail_until_success(FaultConfig::fail_sync_at, remove_op);
}

#[test]
fn test_store_usable_after_fault() {
    let (device, mut store) = seeded();
    device.set_faults(FaultConfig::fail_write_at(0));
    assert!(add_op(&mut store).is_err());
    assert!(device.stats().injected_write_errors >= 1);

    device.set_faults(FaultConfig::no_faults());
    add_op(&mut store).expect("add after fault");
    assert_eq!(store.len(&ContextSelector::Any).expect("len"), 4);
    assert_eq!(store.len(&selector("work")).expect("len"), 1);
    assert_consistent(&store);
}
