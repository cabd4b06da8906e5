//! Superblock structure and serialization.
//!
//! The superblock occupies page 0 and records where everything else lives.
//! It is rewritten on every commit, so its CRC doubles as a torn-write check.

// PAGE_SIZE is a compile-time constant that fits in u32.
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use crate::storage::buffer_pool::BufferPool;
use crate::storage::page::{PAGE_SIZE, Page, PageId};

/// Magic number identifying a triple store database file.
pub const MAGIC: [u8; 8] = *b"TRPLSTOR";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Number of B-tree root slots. Each keyspace owns one slot.
pub const TREE_SLOTS: usize = 16;

const PAGE_SIZE_U32: u32 = PAGE_SIZE as u32;

mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const PAGE_SIZE: usize = 12;
    pub const TOTAL_PAGE_COUNT: usize = 16;
    pub const FREE_LIST_HEAD: usize = 24;
    pub const COMMIT_COUNT: usize = 32;
    pub const ROOTS: usize = 40;
    pub const CHECKSUM: usize = ROOTS + super::TREE_SLOTS * 8;
}

/// Database-wide metadata.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub format_version: u32,
    pub page_size: u32,
    /// Number of pages in use, including the superblock.
    pub total_page_count: u64,
    /// Head of the free page list, 0 when empty.
    pub free_list_head: PageId,
    /// Number of successful commits.
    pub commit_count: u64,
    /// Root page per tree slot, 0 when the tree has not been created.
    pub roots: [PageId; TREE_SLOTS],
}

impl Superblock {
    /// Superblock of a freshly created database.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            page_size: PAGE_SIZE_U32,
            total_page_count: 1,
            free_list_head: 0,
            commit_count: 0,
            roots: [0; TREE_SLOTS],
        }
    }

    /// Serialize the superblock to a page.
    #[must_use]
    pub fn to_page(&self, pool: &Arc<BufferPool>) -> Page {
        let mut page = pool.page_zeroed();

        page.write_bytes(offsets::MAGIC, &MAGIC);
        page.write_u32(offsets::FORMAT_VERSION, self.format_version);
        page.write_u32(offsets::PAGE_SIZE, self.page_size);
        page.write_u64(offsets::TOTAL_PAGE_COUNT, self.total_page_count);
        page.write_u64(offsets::FREE_LIST_HEAD, self.free_list_head);
        page.write_u64(offsets::COMMIT_COUNT, self.commit_count);
        for (slot, root) in self.roots.iter().enumerate() {
            page.write_u64(offsets::ROOTS + slot * 8, *root);
        }

        let checksum = crc32fast::hash(page.read_bytes(0, offsets::CHECKSUM));
        page.write_u32(offsets::CHECKSUM, checksum);

        page
    }

    /// Deserialize a superblock from a page.
    pub fn from_page(page: &Page) -> Result<Self, SuperblockError> {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(page.read_bytes(offsets::MAGIC, 8));
        if magic != MAGIC {
            return Err(SuperblockError::InvalidMagic(magic));
        }

        let stored = page.read_u32(offsets::CHECKSUM);
        let computed = crc32fast::hash(page.read_bytes(0, offsets::CHECKSUM));
        if stored != computed {
            return Err(SuperblockError::ChecksumMismatch { stored, computed });
        }

        let format_version = page.read_u32(offsets::FORMAT_VERSION);
        if format_version != FORMAT_VERSION {
            return Err(SuperblockError::UnsupportedVersion(format_version));
        }

        let page_size = page.read_u32(offsets::PAGE_SIZE);
        if page_size != PAGE_SIZE_U32 {
            return Err(SuperblockError::InvalidPageSize(page_size));
        }

        let mut roots = [0; TREE_SLOTS];
        for (slot, root) in roots.iter_mut().enumerate() {
            *root = page.read_u64(offsets::ROOTS + slot * 8);
        }

        Ok(Self {
            format_version,
            page_size,
            total_page_count: page.read_u64(offsets::TOTAL_PAGE_COUNT),
            free_list_head: page.read_u64(offsets::FREE_LIST_HEAD),
            commit_count: page.read_u64(offsets::COMMIT_COUNT),
            roots,
        })
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when reading a superblock.
#[derive(Debug)]
pub enum SuperblockError {
    InvalidMagic([u8; 8]),
    ChecksumMismatch { stored: u32, computed: u32 },
    UnsupportedVersion(u32),
    InvalidPageSize(u32),
}

impl std::fmt::Display for SuperblockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(magic) => {
                write!(
                    f,
                    "invalid magic number: {:?}",
                    String::from_utf8_lossy(magic)
                )
            }
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "superblock checksum mismatch: stored {stored:08x}, computed {computed:08x}"
            ),
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::InvalidPageSize(s) => write!(f, "invalid page size: {s}"),
        }
    }
}

impl std::error::Error for SuperblockError {}
