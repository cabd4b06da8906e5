//! The six permutation indices and the membership index.
//!
//! The global indices (`Spo`, `Pos`, `Osp`) hold each distinct triple once;
//! the `Spo` entry counts the contexts asserting it. The context-qualified
//! indices (`Cspo`, `Cpos`, `Cosp`) hold each (context, triple) assertion,
//! and `Membership` holds the same assertions keyed triple-first with their
//! flags, answering "which contexts assert this triple" by prefix scan.

use crate::backend::{Backend, Keyspace};
use crate::storage::btree::Key;
use crate::store::StoreError;
use crate::store::keys::{MembershipFlags, decode_u64, encode_u64, key, part};
use crate::store::overlay::Overlay;
use crate::types::{Context, TermId, Triple};

/// A component order of (subject, predicate, object).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permutation {
    Spo,
    Pos,
    Osp,
}

impl Permutation {
    pub const ALL: [Self; 3] = [Self::Spo, Self::Pos, Self::Osp];

    /// The order whose leading components are exactly the bound ones.
    #[must_use]
    pub const fn for_bound(subject: bool, predicate: bool, object: bool) -> Self {
        match (subject, predicate, object) {
            (false, true, _) => Self::Pos,
            (_, false, true) => Self::Osp,
            _ => Self::Spo,
        }
    }

    #[must_use]
    pub const fn global_keyspace(self) -> Keyspace {
        match self {
            Self::Spo => Keyspace::Spo,
            Self::Pos => Keyspace::Pos,
            Self::Osp => Keyspace::Osp,
        }
    }

    #[must_use]
    pub const fn context_keyspace(self) -> Keyspace {
        match self {
            Self::Spo => Keyspace::Cspo,
            Self::Pos => Keyspace::Cpos,
            Self::Osp => Keyspace::Cosp,
        }
    }

    /// The triple's components in this order.
    #[must_use]
    pub const fn order(self, triple: &Triple) -> [u64; 3] {
        let (s, p, o) = (triple.subject.0, triple.predicate.0, triple.object.0);
        match self {
            Self::Spo => [s, p, o],
            Self::Pos => [p, o, s],
            Self::Osp => [o, s, p],
        }
    }

    /// Rebuild a triple from components in this order.
    #[must_use]
    pub const fn triple(self, parts: [u64; 3]) -> Triple {
        let [a, b, c] = parts;
        let (s, p, o) = match self {
            Self::Spo => (a, b, c),
            Self::Pos => (c, a, b),
            Self::Osp => (b, c, a),
        };
        Triple::new(TermId(s), TermId(p), TermId(o))
    }

    /// Decode a global key.
    #[must_use]
    pub fn global_triple(self, key: &Key) -> Triple {
        self.triple([part(key, 0), part(key, 1), part(key, 2)])
    }

    /// Decode a context-qualified key.
    #[must_use]
    pub fn context_triple(self, key: &Key) -> (Context, Triple) {
        (
            Context::from_raw(part(key, 0)),
            self.triple([part(key, 1), part(key, 2), part(key, 3)]),
        )
    }

    #[must_use]
    pub fn global_key(self, triple: &Triple) -> Key {
        key(&self.order(triple))
    }

    #[must_use]
    pub fn context_key(self, context: Context, triple: &Triple) -> Key {
        let [a, b, c] = self.order(triple);
        key(&[context.to_raw(), a, b, c])
    }
}

#[must_use]
pub fn membership_key(triple: &Triple, context: Context) -> Key {
    key(&[
        triple.subject.0,
        triple.predicate.0,
        triple.object.0,
        context.to_raw(),
    ])
}

/// What `index_triple` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indexed {
    /// The triple was not in any context before.
    pub new_triple: bool,
    /// The triple was not in this context before.
    pub new_in_context: bool,
}

/// What `unindex_triple` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unindexed {
    /// The triple was in this context.
    pub removed_from_context: bool,
    /// The triple is no longer in any context.
    pub removed_triple: bool,
}

/// Context count of a triple; 0 when absent from the global indices.
pub fn context_count<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    triple: &Triple,
) -> Result<u64, StoreError> {
    overlay
        .get(Keyspace::Spo, &Permutation::Spo.global_key(triple))?
        .map_or(Ok(0), |value| decode_u64(&value, "triple context count"))
}

pub fn membership<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    triple: &Triple,
    context: Context,
) -> Result<Option<MembershipFlags>, StoreError> {
    overlay
        .get(Keyspace::Membership, &membership_key(triple, context))?
        .map(|value| MembershipFlags::from_bytes(&value))
        .transpose()
}

/// Assert `triple` in `context`. Re-asserting replaces the flags.
pub fn index_triple<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    triple: &Triple,
    context: Context,
    flags: MembershipFlags,
) -> Result<Indexed, StoreError> {
    let existing = membership(overlay, triple, context)?;
    if existing != Some(flags) {
        overlay.put(
            Keyspace::Membership,
            membership_key(triple, context),
            flags.to_bytes(),
        );
    }
    if existing.is_some() {
        return Ok(Indexed {
            new_triple: false,
            new_in_context: false,
        });
    }

    for permutation in Permutation::ALL {
        overlay.put(
            permutation.context_keyspace(),
            permutation.context_key(context, triple),
            Vec::new(),
        );
    }

    let count = context_count(overlay, triple)?;
    overlay.put(
        Keyspace::Spo,
        Permutation::Spo.global_key(triple),
        encode_u64(count + 1),
    );
    if count == 0 {
        for permutation in [Permutation::Pos, Permutation::Osp] {
            overlay.put(
                permutation.global_keyspace(),
                permutation.global_key(triple),
                Vec::new(),
            );
        }
    }

    Ok(Indexed {
        new_triple: count == 0,
        new_in_context: true,
    })
}

/// Retract `triple` from `context`; a no-op when it is not asserted there.
pub fn unindex_triple<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    triple: &Triple,
    context: Context,
) -> Result<Unindexed, StoreError> {
    if membership(overlay, triple, context)?.is_none() {
        return Ok(Unindexed {
            removed_from_context: false,
            removed_triple: false,
        });
    }

    overlay.delete(Keyspace::Membership, membership_key(triple, context));
    for permutation in Permutation::ALL {
        overlay.delete(
            permutation.context_keyspace(),
            permutation.context_key(context, triple),
        );
    }

    let count = context_count(overlay, triple)?;
    let Some(remaining) = count.checked_sub(1) else {
        return Err(StoreError::Corruption(format!(
            "triple {triple:?} asserted in {context} but missing from the global index"
        )));
    };

    if remaining > 0 {
        overlay.put(
            Keyspace::Spo,
            Permutation::Spo.global_key(triple),
            encode_u64(remaining),
        );
    } else {
        for permutation in Permutation::ALL {
            overlay.delete(permutation.global_keyspace(), permutation.global_key(triple));
        }
    }

    Ok(Unindexed {
        removed_from_context: true,
        removed_triple: remaining == 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn triple(s: u64, p: u64, o: u64) -> Triple {
        Triple::new(TermId(s), TermId(p), TermId(o))
    }

    const PLAIN: MembershipFlags = MembershipFlags { quoted: false };

    #[test]
    fn test_permutation_choice() {
        assert_eq!(Permutation::for_bound(false, false, false), Permutation::Spo);
        assert_eq!(Permutation::for_bound(true, false, false), Permutation::Spo);
        assert_eq!(Permutation::for_bound(true, true, false), Permutation::Spo);
        assert_eq!(Permutation::for_bound(true, true, true), Permutation::Spo);
        assert_eq!(Permutation::for_bound(false, true, false), Permutation::Pos);
        assert_eq!(Permutation::for_bound(false, true, true), Permutation::Pos);
        assert_eq!(Permutation::for_bound(false, false, true), Permutation::Osp);
        assert_eq!(Permutation::for_bound(true, false, true), Permutation::Osp);
    }

    #[test]
    fn test_keys_decode_back() {
        let t = triple(3, 5, 7);
        for permutation in Permutation::ALL {
            assert_eq!(permutation.global_triple(&permutation.global_key(&t)), t);
            let named = Context::Named(TermId(9));
            assert_eq!(
                permutation.context_triple(&permutation.context_key(named, &t)),
                (named, t)
            );
        }
        assert_eq!(Permutation::Pos.global_key(&t), key(&[5, 7, 3]));
        assert_eq!(Permutation::Osp.global_key(&t), key(&[7, 3, 5]));
    }

    #[test]
    fn test_second_context_only_bumps_count() {
        let backend = MemoryBackend::new();
        let mut overlay = Overlay::new(&backend);
        let t = triple(1, 2, 3);
        let g = Context::Named(TermId(4));

        let first = index_triple(&mut overlay, &t, Context::Default, PLAIN).expect("index");
        assert!(first.new_triple && first.new_in_context);
        let second = index_triple(&mut overlay, &t, g, PLAIN).expect("index");
        assert!(!second.new_triple && second.new_in_context);
        let again = index_triple(&mut overlay, &t, g, PLAIN).expect("index");
        assert!(!again.new_triple && !again.new_in_context);

        assert_eq!(context_count(&overlay, &t).expect("count"), 2);
    }

    #[test]
    fn test_global_entry_outlives_all_but_last_context() {
        let backend = MemoryBackend::new();
        let mut overlay = Overlay::new(&backend);
        let t = triple(1, 2, 3);
        let g = Context::Named(TermId(4));
        index_triple(&mut overlay, &t, Context::Default, PLAIN).expect("index");
        index_triple(&mut overlay, &t, g, PLAIN).expect("index");

        let removed = unindex_triple(&mut overlay, &t, g).expect("unindex");
        assert!(removed.removed_from_context && !removed.removed_triple);
        assert!(overlay
            .contains(Keyspace::Pos, &Permutation::Pos.global_key(&t))
            .expect("get"));
        assert!(!overlay
            .contains(Keyspace::Cspo, &Permutation::Spo.context_key(g, &t))
            .expect("get"));

        let missing = unindex_triple(&mut overlay, &t, g).expect("unindex");
        assert!(!missing.removed_from_context);

        let last = unindex_triple(&mut overlay, &t, Context::Default).expect("unindex");
        assert!(last.removed_triple);
        for permutation in Permutation::ALL {
            assert!(!overlay
                .contains(permutation.global_keyspace(), &permutation.global_key(&t))
                .expect("get"));
        }
    }
}
