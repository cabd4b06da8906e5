//! Key and value layouts of the store's keyspaces.
//!
//! Keys are up to four big-endian `u64` components padded with zeros to
//! the 32-byte key width, so byte order equals component order and a
//! prefix of components is a byte prefix.
//!
//! | Keyspace        | Key                        | Value                          |
//! |-----------------|----------------------------|--------------------------------|
//! | `Spo`           | s, p, o                    | context count (u64 LE)         |
//! | `Pos` / `Osp`   | p, o, s / o, s, p          | empty                          |
//! | `Cspo` ...      | c, then the permutation    | empty                          |
//! | `Membership`    | s, p, o, c                 | flags (bit 0: quoted)          |
//! | `Contexts`      | c                          | member count (u64 LE), flags   |
//! | `TermsById`     | id                         | ref count (u64 LE), term bytes |
//! | `TermsByHash`   | crc32 << 32 \| length, id  | empty                          |
//! | `Meta`          | counter name               | u64 LE                         |

use crate::storage::btree::{KEY_SIZE, Key};
use crate::store::StoreError;

/// Next term id to hand out.
pub const META_NEXT_TERM_ID: u64 = 1;
/// Distinct triples across all contexts.
pub const META_TRIPLE_COUNT: u64 = 2;
/// Live interned terms.
pub const META_TERM_COUNT: u64 = 3;

/// Build a key from leading components.
#[must_use]
pub fn key(parts: &[u64]) -> Key {
    debug_assert!(parts.len() <= KEY_SIZE / 8);
    let mut key = [0u8; KEY_SIZE];
    for (i, part) in parts.iter().enumerate() {
        key[i * 8..i * 8 + 8].copy_from_slice(&part.to_be_bytes());
    }
    key
}

/// Byte prefix covering every key that starts with `parts`.
#[must_use]
pub fn prefix(parts: &[u64]) -> Vec<u8> {
    parts.iter().flat_map(|part| part.to_be_bytes()).collect()
}

/// Component `index` of a key.
#[must_use]
pub fn part(key: &Key, index: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[index * 8..index * 8 + 8]);
    u64::from_be_bytes(bytes)
}

pub fn decode_u64(value: &[u8], what: &str) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = value
        .get(..8)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| StoreError::Corruption(format!("{what}: value of {} bytes", value.len())))?;
    Ok(u64::from_le_bytes(bytes))
}

#[must_use]
pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Membership record flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipFlags {
    pub quoted: bool,
}

impl MembershipFlags {
    const QUOTED: u8 = 0x01;

    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        vec![if self.quoted { Self::QUOTED } else { 0 }]
    }

    pub fn from_bytes(value: &[u8]) -> Result<Self, StoreError> {
        match value {
            [flags] if flags & !Self::QUOTED == 0 => Ok(Self {
                quoted: flags & Self::QUOTED != 0,
            }),
            _ => Err(StoreError::Corruption(format!(
                "membership flags {value:02x?}"
            ))),
        }
    }
}

/// Context registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextEntry {
    /// Triples asserted in the context.
    pub members: u64,
    /// Registered through `add_context`; kept when empty.
    pub explicit: bool,
}

impl ContextEntry {
    const EXPLICIT: u8 = 0x01;

    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        let mut bytes = encode_u64(self.members);
        bytes.push(if self.explicit { Self::EXPLICIT } else { 0 });
        bytes
    }

    pub fn from_bytes(value: &[u8]) -> Result<Self, StoreError> {
        if value.len() != 9 || value[8] & !Self::EXPLICIT != 0 {
            return Err(StoreError::Corruption(format!(
                "context entry of {} bytes",
                value.len()
            )));
        }
        Ok(Self {
            members: decode_u64(value, "context member count")?,
            explicit: value[8] & Self::EXPLICIT != 0,
        })
    }
}
