//! Test random operation sequences against a naive model of the store.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::simulation::{FaultConfig, SimulatedStorage};
use crate::store::{Store, StoreError};
use crate::types::{ContextSelector, GraphName, Term, TriplePattern};

const SUBJECTS: &[&str] = &["a", "b", "c", "d"];
const PREDICATES: &[&str] = &["p", "q"];
const OBJECTS: &[&str] = &["a", "b", "x", "y"];
const GRAPHS: &[Option<&str>] = &[None, Some("g1"), Some("g2"), Some("g3")];

enum Op {
    Add(Quad, bool),
    Remove(TriplePattern, ContextSelector),
    RemoveContext(Option<Term>),
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.random_range(0..items.len())]
}

fn maybe(rng: &mut StdRng, names: &[&str]) -> Option<Term> {
    rng.random_bool(0.5).then(|| iri(pick(rng, names)))
}

fn random_op(rng: &mut StdRng) -> Op {
    let graph_term = pick(rng, GRAPHS).map(iri);
    match rng.random_range(0..10) {
        0..6 => Op::Add(
            (
                iri(pick(rng, SUBJECTS)),
                iri(pick(rng, PREDICATES)),
                iri(pick(rng, OBJECTS)),
                graph_term,
            ),
            rng.random_bool(0.2),
        ),
        6..9 => {
            let pattern = TriplePattern {
                subject: maybe(rng, SUBJECTS),
                predicate: maybe(rng, PREDICATES),
                object: maybe(rng, OBJECTS),
            };
            let selector = if rng.random_bool(0.4) {
                ContextSelector::Any
            } else {
                graph_term.map_or(ContextSelector::Default, ContextSelector::Named)
            };
            Op::Remove(pattern, selector)
        }
        _ => Op::RemoveContext(graph_term),
    }
}

fn graph_of(graph: Option<&Term>) -> GraphName {
    graph.map_or(GraphName::Default, |name| GraphName::Named(name.clone()))
}

fn run<B: Backend>(store: &mut Store<B>, op: &Op) -> Result<(), StoreError> {
    match op {
        Op::Add((s, p, o, g), quoted) => store.add(s, p, o, &graph_of(g.as_ref()), *quoted).map(|_| ()),
        Op::Remove(pattern, selector) => store.remove(pattern, selector).map(|_| ()),
        Op::RemoveContext(g) => store.remove_context(&graph_of(g.as_ref())).map(|_| ()),
    }
}

/// The expected quads after `op`. Quoted flags are not part of a quad, so
/// the model is a plain set.
fn apply_model(model: &mut BTreeSet<Quad>, op: &Op) {
    match op {
        Op::Add(quad, _) => {
            model.insert(quad.clone());
        }
        Op::Remove(pattern, selector) => {
            let bound = |want: &Option<Term>, have: &Term| want.as_ref().is_none_or(|w| w == have);
            model.retain(|(s, p, o, g)| {
                let in_selection = match selector {
                    ContextSelector::Any => true,
                    ContextSelector::Default => g.is_none(),
                    ContextSelector::Named(name) => g.as_ref() == Some(name),
                };
                !(in_selection
                    && bound(&pattern.subject, s)
                    && bound(&pattern.predicate, p)
                    && bound(&pattern.object, o))
            });
        }
        Op::RemoveContext(graph) => model.retain(|(_, _, _, g)| g != graph),
    }
}

fn check_against_model<B: Backend>(store: &Store<B>, model: &BTreeSet<Quad>, step: usize) {
    assert_eq!(&quads(store), model, "store diverged at step {step}");
    let distinct: BTreeSet<_> = model.iter().map(|(s, p, o, _)| (s, p, o)).collect();
    assert_eq!(
        store.len(&ContextSelector::Any).expect("len"),
        distinct.len() as u64
    );
    assert_consistent(store);
}

fn model_run<B: Backend>(store: &mut Store<B>, seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = BTreeSet::new();
    for step in 0..steps {
        let op = random_op(&mut rng);
        run(store, &op).expect("operation");
        apply_model(&mut model, &op);
        if step % 10 == 9 {
            check_against_model(store, &model, step);
        }
    }
    check_against_model(store, &model, steps);
}

#[test]
fn test_model_memory() {
    for seed in 0..8 {
        model_run(&mut memory_store(), seed, 300);
    }
}

#[test]
fn test_model_paged() {
    for seed in 0..3 {
        model_run(&mut paged_store(), seed, 200);
    }
}

#[test]
fn test_model_paged_with_random_faults() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut device = SimulatedStorage::new(99);
    let mut store = paged_store_on(device.clone());
    let mut model = BTreeSet::new();
    let mut failures = 0;

    for step in 0..300 {
        let op = random_op(&mut rng);
        device.set_faults(FaultConfig::random(0.02, 0.02));
        let result = run(&mut store, &op);
        device.set_faults(FaultConfig::no_faults());

        match result {
            Ok(()) => apply_model(&mut model, &op),
            Err(StoreError::StorageIo(_)) => {
                failures += 1;
                if store.backend().file().is_poisoned() {
                    // Only a restart can undo a commit that failed to roll back.
                    device = device.crash_image();
                    store = paged_store_on(device.clone());
                }
            }
            Err(e) => panic!("unexpected error at step {step}: {e}"),
        }
        check_against_model(&store, &model, step);
    }
    assert!(failures > 0);
}
