//! Reference-counted term interner.
//!
//! Terms map to dense ids handed out from the `META_NEXT_TERM_ID` counter,
//! starting at 1 and never reused. The forward map (`TermsById`) stores the
//! reference count next to the canonical term encoding; the reverse map
//! (`TermsByHash`) is keyed by a CRC32 digest and length of that encoding
//! with the id as the last key component, so digest collisions are told
//! apart by comparing the stored encodings.
//!
//! # Invariants
//!
//! - An id is present in both maps iff its reference count is > 0.
//! - `META_TERM_COUNT` equals the number of present ids.

#![allow(clippy::cast_possible_truncation)]

use crate::backend::{Backend, Keyspace};
use crate::store::StoreError;
use crate::store::keys::{
    META_NEXT_TERM_ID, META_TERM_COUNT, decode_u64, encode_u64, key, part, prefix,
};
use crate::store::overlay::Overlay;
use crate::types::{Term, TermId};

/// Reverse-map bucket of an encoding.
fn hash_bucket(encoded: &[u8]) -> u64 {
    let digest = crc32fast::hash(encoded);
    (u64::from(digest) << 32) | u64::from(encoded.len() as u32)
}

struct TermRecord {
    ref_count: u64,
    encoded: Vec<u8>,
}

impl TermRecord {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = encode_u64(self.ref_count);
        bytes.extend_from_slice(&self.encoded);
        bytes
    }

    fn from_bytes(value: &[u8]) -> Result<Self, StoreError> {
        Ok(Self {
            ref_count: decode_u64(value, "term reference count")?,
            encoded: value[8..].to_vec(),
        })
    }
}

fn load<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    id: TermId,
) -> Result<Option<TermRecord>, StoreError> {
    overlay
        .get(Keyspace::TermsById, &key(&[id.0]))?
        .map(|value| TermRecord::from_bytes(&value))
        .transpose()
}

pub fn read_meta<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    counter: u64,
) -> Result<u64, StoreError> {
    overlay
        .get(Keyspace::Meta, &key(&[counter]))?
        .map_or(Ok(0), |value| decode_u64(&value, "meta counter"))
}

pub fn write_meta<B: Backend + ?Sized>(overlay: &mut Overlay<'_, B>, counter: u64, value: u64) {
    overlay.put(Keyspace::Meta, key(&[counter]), encode_u64(value));
}

fn lookup_encoded<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    encoded: &[u8],
) -> Result<Option<TermId>, StoreError> {
    for (candidate, _) in overlay.scan(Keyspace::TermsByHash, &prefix(&[hash_bucket(encoded)]))? {
        let id = TermId(part(&candidate, 1));
        let record = load(overlay, id)?.ok_or_else(|| {
            StoreError::Corruption(format!("reverse map points at missing term {id}"))
        })?;
        if record.encoded == encoded {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// The id of `term`, if interned.
pub fn lookup<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    term: &Term,
) -> Result<Option<TermId>, StoreError> {
    lookup_encoded(overlay, &term.to_bytes())
}

/// Take one reference to `term`, assigning an id on first use.
pub fn intern<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    term: &Term,
) -> Result<TermId, StoreError> {
    let encoded = term.to_bytes();
    if let Some(id) = lookup_encoded(overlay, &encoded)? {
        let mut record = load(overlay, id)?
            .ok_or_else(|| StoreError::Corruption(format!("term {id} vanished")))?;
        record.ref_count += 1;
        overlay.put(Keyspace::TermsById, key(&[id.0]), record.to_bytes());
        return Ok(id);
    }

    let next = read_meta(overlay, META_NEXT_TERM_ID)?.max(TermId::FIRST.0);
    let id = TermId(next);
    write_meta(overlay, META_NEXT_TERM_ID, next + 1);
    let terms = read_meta(overlay, META_TERM_COUNT)?;
    write_meta(overlay, META_TERM_COUNT, terms + 1);

    overlay.put(
        Keyspace::TermsByHash,
        key(&[hash_bucket(&encoded), id.0]),
        Vec::new(),
    );
    overlay.put(
        Keyspace::TermsById,
        key(&[id.0]),
        TermRecord {
            ref_count: 1,
            encoded,
        }
        .to_bytes(),
    );
    tracing::trace!(%id, %term, "interned term");
    Ok(id)
}

/// Drop one reference to `id`, forgetting the term when none remain.
pub fn release<B: Backend + ?Sized>(
    overlay: &mut Overlay<'_, B>,
    id: TermId,
) -> Result<(), StoreError> {
    let mut record = load(overlay, id)?.ok_or(StoreError::UnknownId(id))?;
    record.ref_count = record.ref_count.checked_sub(1).ok_or_else(|| {
        StoreError::Corruption(format!("stored term {id} with zero references"))
    })?;

    if record.ref_count > 0 {
        overlay.put(Keyspace::TermsById, key(&[id.0]), record.to_bytes());
        return Ok(());
    }

    overlay.delete(Keyspace::TermsById, key(&[id.0]));
    overlay.delete(
        Keyspace::TermsByHash,
        key(&[hash_bucket(&record.encoded), id.0]),
    );
    let terms = read_meta(overlay, META_TERM_COUNT)?;
    let Some(terms) = terms.checked_sub(1) else {
        return Err(StoreError::Corruption("term count underflow".to_string()));
    };
    write_meta(overlay, META_TERM_COUNT, terms);
    tracing::trace!(%id, "released last reference");
    Ok(())
}

/// The term behind `id`.
pub fn resolve<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    id: TermId,
) -> Result<Term, StoreError> {
    let record = load(overlay, id)?.ok_or(StoreError::UnknownId(id))?;
    Term::from_bytes(&record.encoded)
        .map_err(|e| StoreError::Corruption(format!("term {id}: {e}")))
}

/// Current reference count of `id`; 0 when absent.
pub fn ref_count<B: Backend + ?Sized>(
    overlay: &Overlay<'_, B>,
    id: TermId,
) -> Result<u64, StoreError> {
    Ok(load(overlay, id)?.map_or(0, |record| record.ref_count))
}
