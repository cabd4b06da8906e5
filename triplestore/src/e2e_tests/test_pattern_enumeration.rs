//! Test every combination of bound pattern components against a brute-force
//! filter over the inserted triples.

use std::collections::BTreeSet;

use crate::backend::Backend;
use crate::e2e_tests::helpers::*;
use crate::store::Store;
use crate::types::{ContextSelector, Term, TriplePattern};

fn dataset() -> Vec<(Term, Term, Term, Option<&'static str>)> {
    let mut triples = Vec::new();
    for s in 0..4 {
        for p in 0..3 {
            for o in 0..3 {
                if (s + p + o) % 2 == 0 {
                    let graph = if s % 2 == 0 { Some("even") } else { None };
                    triples.push((
                        iri(&format!("s{s}")),
                        iri(&format!("p{p}")),
                        iri(&format!("o{o}")),
                        graph,
                    ));
                }
            }
        }
    }
    triples
}

fn pattern_for(mask: u8, s: &Term, p: &Term, o: &Term) -> TriplePattern {
    TriplePattern {
        subject: (mask & 0b100 != 0).then(|| s.clone()),
        predicate: (mask & 0b010 != 0).then(|| p.clone()),
        object: (mask & 0b001 != 0).then(|| o.clone()),
    }
}

fn brute_force(
    data: &[(Term, Term, Term, Option<&'static str>)],
    pattern: &TriplePattern,
    graph: Option<Option<&str>>,
) -> BTreeSet<(Term, Term, Term)> {
    data.iter()
        .filter(|(s, p, o, g)| {
            pattern.subject.as_ref().is_none_or(|x| x == s)
                && pattern.predicate.as_ref().is_none_or(|x| x == p)
                && pattern.object.as_ref().is_none_or(|x| x == o)
                && graph.is_none_or(|wanted| wanted == *g)
        })
        .map(|(s, p, o, _)| (s.clone(), p.clone(), o.clone()))
        .collect()
}

fn pattern_enumeration<B: Backend>(store: &mut Store<B>) {
    let data = dataset();
    for (s, p, o, g) in &data {
        let graph = g.map_or(crate::types::GraphName::Default, graph);
        store.add(s, p, o, &graph, false).expect("add");
    }

    let probes = [
        (iri("s0"), iri("p0"), iri("o0")),
        (iri("s1"), iri("p2"), iri("o1")),
        (iri("s3"), iri("p1"), iri("o0")),
    ];
    for (s, p, o) in &probes {
        for mask in 0..8u8 {
            let pattern = pattern_for(mask, s, p, o);
            assert_eq!(
                matching(store, &pattern, &ContextSelector::Any),
                brute_force(&data, &pattern, None),
                "any context, mask {mask:03b}"
            );
            assert_eq!(
                matching(store, &pattern, &selector("even")),
                brute_force(&data, &pattern, Some(Some("even"))),
                "graph even, mask {mask:03b}"
            );
            assert_eq!(
                matching(store, &pattern, &ContextSelector::Default),
                brute_force(&data, &pattern, Some(None)),
                "default graph, mask {mask:03b}"
            );
        }
    }

    // Distinct triples come out once even when enumerated unbound.
    let all: Vec<_> = store
        .triples(&TriplePattern::any(), &ContextSelector::Any)
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("matches");
    assert_eq!(all.len(), data.len());

    // Enumeration is restartable.
    let again = store
        .triples(&TriplePattern::any(), &ContextSelector::Any)
        .expect("query")
        .count();
    assert_eq!(again, data.len());
    assert_consistent(store);
}

#[test]
fn test_pattern_enumeration_memory() {
    pattern_enumeration(&mut memory_store());
}

#[test]
fn test_pattern_enumeration_paged() {
    pattern_enumeration(&mut paged_store());
}
