//! Cross-keyspace consistency check.
//!
//! Recomputes every derived quantity of the store from the assertion
//! records and compares it with what is stored:
//!
//! - each membership record has its three context-qualified entries, and
//!   each context-qualified entry has a membership record;
//! - each `Spo` entry counts exactly the memberships of its triple and has
//!   matching `Pos` and `Osp` entries;
//! - each registry entry counts exactly its memberships, and only explicit
//!   entries may be empty;
//! - each term's reference count equals its positions in distinct triples
//!   plus the contexts it names, and both interner maps agree;
//! - the meta counters match.
//!
//! Problems are collected rather than returned at the first one.

use std::collections::{BTreeMap, BTreeSet};

use crate::backend::{Backend, Keyspace};
use crate::store::StoreError;
use crate::store::index::Permutation;
use crate::store::keys::{
    ContextEntry, META_NEXT_TERM_ID, META_TERM_COUNT, META_TRIPLE_COUNT, MembershipFlags,
    decode_u64, key, part,
};
use crate::types::{Context, TermId, Triple};

/// Outcome of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub triples: u64,
    pub memberships: u64,
    pub contexts: u64,
    pub terms: u64,
    pub problems: Vec<String>,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }
}

fn collect<B: Backend + ?Sized>(
    backend: &B,
    keyspace: Keyspace,
) -> Result<BTreeMap<crate::storage::btree::Key, Vec<u8>>, StoreError> {
    let mut entries = BTreeMap::new();
    for entry in backend.scan(keyspace, &[])? {
        let (key, value) = entry?;
        entries.insert(key, value);
    }
    Ok(entries)
}

fn meta<B: Backend + ?Sized>(backend: &B, counter: u64) -> Result<u64, StoreError> {
    backend
        .get(Keyspace::Meta, &key(&[counter]))?
        .map_or(Ok(0), |value| decode_u64(&value, "meta counter"))
}

/// Check every keyspace of `backend`.
///
/// Undecodable values are reported as problems; only backend failures are
/// returned as errors.
#[allow(clippy::too_many_lines)]
pub fn check<B: Backend + ?Sized>(backend: &B) -> Result<ConsistencyReport, StoreError> {
    let mut report = ConsistencyReport::default();
    let problems = &mut report.problems;

    // Membership records drive everything else.
    let mut per_triple: BTreeMap<Triple, u64> = BTreeMap::new();
    let mut per_context: BTreeMap<Context, u64> = BTreeMap::new();
    let mut asserted: BTreeSet<(Context, Triple)> = BTreeSet::new();
    for (membership, value) in collect(backend, Keyspace::Membership)? {
        let triple = Triple::new(
            TermId(part(&membership, 0)),
            TermId(part(&membership, 1)),
            TermId(part(&membership, 2)),
        );
        let context = Context::from_raw(part(&membership, 3));
        if let Err(e) = MembershipFlags::from_bytes(&value) {
            problems.push(format!("{triple:?} in {context}: {e}"));
        }
        *per_triple.entry(triple).or_default() += 1;
        *per_context.entry(context).or_default() += 1;
        asserted.insert((context, triple));
    }
    report.memberships = asserted.len() as u64;

    for permutation in Permutation::ALL {
        let keyspace = permutation.context_keyspace();
        let entries = collect(backend, keyspace)?;
        let indexed: BTreeSet<(Context, Triple)> = entries
            .keys()
            .map(|entry| permutation.context_triple(entry))
            .collect();
        for (context, triple) in asserted.difference(&indexed) {
            problems.push(format!(
                "{triple:?} in {context} missing from {}",
                keyspace.name()
            ));
        }
        for (context, triple) in indexed.difference(&asserted) {
            problems.push(format!(
                "{triple:?} in {context} indexed in {} without a membership record",
                keyspace.name()
            ));
        }
    }

    let spo = collect(backend, Keyspace::Spo)?;
    let mut distinct: BTreeSet<Triple> = BTreeSet::new();
    for (entry, value) in &spo {
        let triple = Permutation::Spo.global_triple(entry);
        distinct.insert(triple);
        let expected = per_triple.get(&triple).copied().unwrap_or(0);
        match decode_u64(value, "triple context count") {
            Ok(count) if count == expected && count > 0 => {}
            Ok(count) => problems.push(format!(
                "{triple:?} records {count} contexts but has {expected} memberships"
            )),
            Err(e) => problems.push(e.to_string()),
        }
    }
    for triple in per_triple.keys() {
        if !distinct.contains(triple) {
            problems.push(format!("{triple:?} has memberships but no spo entry"));
        }
    }
    for permutation in [Permutation::Pos, Permutation::Osp] {
        let keyspace = permutation.global_keyspace();
        let indexed: BTreeSet<Triple> = collect(backend, keyspace)?
            .keys()
            .map(|entry| permutation.global_triple(entry))
            .collect();
        if indexed != distinct {
            problems.push(format!(
                "{} holds {} triples, spo holds {}",
                keyspace.name(),
                indexed.len(),
                distinct.len()
            ));
        }
    }
    report.triples = distinct.len() as u64;

    let triple_count = meta(backend, META_TRIPLE_COUNT)?;
    if triple_count != report.triples {
        problems.push(format!(
            "triple counter is {triple_count}, spo holds {}",
            report.triples
        ));
    }

    // Expected references: one per position in each distinct triple, one
    // per registered named context.
    let mut expected_refs: BTreeMap<TermId, u64> = BTreeMap::new();
    for triple in &distinct {
        for id in [triple.subject, triple.predicate, triple.object] {
            *expected_refs.entry(id).or_default() += 1;
        }
    }

    let mut registered: BTreeSet<Context> = BTreeSet::new();
    for (entry, value) in collect(backend, Keyspace::Contexts)? {
        let context = Context::from_raw(part(&entry, 0));
        registered.insert(context);
        if let Some(id) = context.term_id() {
            *expected_refs.entry(id).or_default() += 1;
        }
        let members = per_context.get(&context).copied().unwrap_or(0);
        match ContextEntry::from_bytes(&value) {
            Ok(stored) => {
                if stored.members != members {
                    problems.push(format!(
                        "{context} records {} members but has {members}",
                        stored.members
                    ));
                }
                if members == 0 && !stored.explicit {
                    problems.push(format!("implicit {context} is empty but registered"));
                }
            }
            Err(e) => problems.push(format!("{context}: {e}")),
        }
    }
    for context in per_context.keys() {
        if !registered.contains(context) {
            problems.push(format!("{context} has members but is not registered"));
        }
    }
    report.contexts = registered.len() as u64;

    let mut stored_terms: BTreeMap<TermId, u64> = BTreeMap::new();
    let mut max_id = 0;
    for (entry, value) in collect(backend, Keyspace::TermsById)? {
        let id = TermId(part(&entry, 0));
        max_id = max_id.max(id.0);
        match decode_u64(&value, "term reference count") {
            Ok(count) => {
                stored_terms.insert(id, count);
            }
            Err(e) => problems.push(format!("term {id}: {e}")),
        }
        if let Err(e) = crate::types::Term::from_bytes(&value[value.len().min(8)..]) {
            problems.push(format!("term {id}: {e}"));
        }
    }
    for (id, count) in &stored_terms {
        let expected = expected_refs.get(id).copied().unwrap_or(0);
        if *count != expected {
            problems.push(format!(
                "term {id} has {count} references, expected {expected}"
            ));
        }
    }
    for id in expected_refs.keys() {
        if !stored_terms.contains_key(id) {
            problems.push(format!("term {id} is referenced but not interned"));
        }
    }
    report.terms = stored_terms.len() as u64;

    let reverse: BTreeSet<TermId> = collect(backend, Keyspace::TermsByHash)?
        .keys()
        .map(|entry| TermId(part(entry, 1)))
        .collect();
    let forward: BTreeSet<TermId> = stored_terms.keys().copied().collect();
    if reverse != forward {
        problems.push(format!(
            "reverse term map holds {} ids, forward map {}",
            reverse.len(),
            forward.len()
        ));
    }

    let term_count = meta(backend, META_TERM_COUNT)?;
    if term_count != report.terms {
        problems.push(format!(
            "term counter is {term_count}, interner holds {}",
            report.terms
        ));
    }
    let next_id = meta(backend, META_NEXT_TERM_ID)?;
    if max_id > 0 && next_id <= max_id {
        problems.push(format!("next term id {next_id} is not above {max_id}"));
    }

    if !report.problems.is_empty() {
        tracing::warn!(problems = report.problems.len(), "consistency check failed");
    }
    Ok(report)
}
