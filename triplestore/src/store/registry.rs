//! Context registry.
//!
//! One `Contexts` entry per known context, holding its member count and
//! whether it was registered explicitly. Implicit entries come and go with
//! their first and last member; explicit ones stay until removed.
//!
//! A registered named context holds one reference to the term naming it.

use std::collections::BTreeSet;

use crate::backend::{Backend, Keyspace};
use crate::storage::btree::Key;
use crate::store::StoreError;
use crate::store::interner;
use crate::store::keys::{ContextEntry, MembershipFlags, key, part, prefix};
use crate::store::overlay::Overlay;
use crate::types::{Context, Triple};

fn context_key(context: Context) -> Key {
    key(&[context.to_raw()])
}

pub fn entry<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    context: Context,
) -> Result<Option<ContextEntry>, StoreError> {
    overlay
        .get(Keyspace::Contexts, &context_key(context))?
        .map(|value| ContextEntry::from_bytes(&value))
        .transpose()
}

fn store_entry<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    context: Context,
    entry: ContextEntry,
) {
    overlay.put(Keyspace::Contexts, context_key(context), entry.to_bytes());
}

/// Register `context`. The caller has already taken the reference on its
/// name term. Returns false when it was registered before; an explicit
/// registration of an implicit context upgrades it.
pub fn register<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    context: Context,
    explicit: bool,
) -> Result<bool, StoreError> {
    match entry(overlay, context)? {
        Some(mut existing) => {
            if explicit && !existing.explicit {
                existing.explicit = true;
                store_entry(overlay, context, existing);
            }
            Ok(false)
        }
        None => {
            store_entry(
                overlay,
                context,
                ContextEntry {
                    members: 0,
                    explicit,
                },
            );
            tracing::debug!(%context, explicit, "registered context");
            Ok(true)
        }
    }
}

/// Count one more member of a registered context.
pub fn add_member<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    context: Context,
) -> Result<(), StoreError> {
    let mut existing = entry(overlay, context)?
        .ok_or_else(|| StoreError::Corruption(format!("{context} is not registered")))?;
    existing.members += 1;
    store_entry(overlay, context, existing);
    Ok(())
}

/// Count one member less. An implicit context that becomes empty is
/// unregistered and its name released.
pub fn remove_member<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    context: Context,
) -> Result<(), StoreError> {
    let mut existing = entry(overlay, context)?
        .ok_or_else(|| StoreError::Corruption(format!("{context} is not registered")))?;
    existing.members = existing.members.checked_sub(1).ok_or_else(|| {
        StoreError::Corruption(format!("member count underflow in {context}"))
    })?;

    if existing.members == 0 && !existing.explicit {
        unregister(overlay, context)
    } else {
        store_entry(overlay, context, existing);
        Ok(())
    }
}

/// Drop the registry entry and the reference on the context's name.
pub fn unregister<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    context: Context,
) -> Result<(), StoreError> {
    overlay.delete(Keyspace::Contexts, context_key(context));
    if let Some(id) = context.term_id() {
        interner::release(overlay, id)?;
    }
    tracing::debug!(%context, "unregistered context");
    Ok(())
}

/// Every registered context, in id order.
pub fn known_contexts<B: Backend + ?Sized>(backend: &B) -> Result<Vec<Context>, StoreError> {
    let mut contexts = Vec::new();
    for entry in backend.scan(Keyspace::Contexts, &[])? {
        let (key, _) = entry?;
        contexts.push(Context::from_raw(part(&key, 0)));
    }
    Ok(contexts)
}

/// Every context asserting `triple`, with its membership flags.
pub fn memberships<B: Backend + ?Sized>(
    backend: &B,
    triple: &Triple,
) -> Result<Vec<(Context, MembershipFlags)>, StoreError> {
    let mut found = Vec::new();
    let scan_prefix = prefix(&[triple.subject.0, triple.predicate.0, triple.object.0]);
    for entry in backend.scan(Keyspace::Membership, &scan_prefix)? {
        let (key, value) = entry?;
        found.push((
            Context::from_raw(part(&key, 3)),
            MembershipFlags::from_bytes(&value)?,
        ));
    }
    Ok(found)
}

/// Every context asserting `triple`, quoted or not.
pub fn contexts_of<B: Backend + ?Sized>(
    backend: &B,
    triple: &Triple,
) -> Result<BTreeSet<Context>, StoreError> {
    Ok(memberships(backend, triple)?
        .into_iter()
        .map(|(context, _)| context)
        .collect())
}
