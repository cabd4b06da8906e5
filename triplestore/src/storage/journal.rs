//! Rollback journal format.
//!
//! Before a commit overwrites any page that existed when the transaction
//! began, the pager writes that page's before-image to the journal and syncs
//! it. Clearing the journal is the commit point: a non-empty, fully valid
//! journal found at open means a commit was interrupted and must be undone.
//!
//! # Format
//!
//! ```text
//! +--------------------------------------------------------------+
//! | Header (24 bytes)                                            |
//! |   magic "TRPLJRNL" (8) | original page count (u64 LE)        |
//! |   record count (u32 LE) | header CRC32 (u32 LE)              |
//! +--------------------------------------------------------------+
//! | Record (8 + PAGE_SIZE + 4 bytes), repeated                   |
//! |   page id (u64 LE) | before-image | CRC32 of id + image      |
//! +--------------------------------------------------------------+
//! ```
//!
//! The whole journal is synced before the database file is touched, so a
//! journal that fails validation was never complete and the database file
//! still holds the committed state. Such a journal is discarded.

#![allow(clippy::cast_possible_truncation)]

use crate::storage::page::{PAGE_SIZE, PageId};

pub const JOURNAL_MAGIC: [u8; 8] = *b"TRPLJRNL";

const HEADER_SIZE: usize = 24;
const RECORD_SIZE: usize = 8 + PAGE_SIZE + 4;

/// A page's contents as of the start of the transaction.
#[derive(Clone)]
pub struct BeforeImage {
    pub page_id: PageId,
    pub image: Box<[u8; PAGE_SIZE]>,
}

impl std::fmt::Debug for BeforeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeforeImage")
            .field("page_id", &self.page_id)
            .finish_non_exhaustive()
    }
}

/// Everything needed to undo one commit.
#[derive(Debug, Clone)]
pub struct Journal {
    /// Page count of the database before the commit; pages past it are
    /// discarded on rollback.
    pub original_page_count: u64,
    pub records: Vec<BeforeImage>,
}

/// Result of inspecting a journal at open.
#[derive(Debug)]
pub enum JournalState {
    /// No journal: the last commit completed.
    Empty,
    /// An incomplete journal. The database file was not modified.
    Torn(&'static str),
    /// A complete journal of an interrupted commit.
    Valid(Journal),
}

impl Journal {
    #[must_use]
    pub const fn new(original_page_count: u64) -> Self {
        Self {
            original_page_count,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.records.len() * RECORD_SIZE);
        bytes.extend_from_slice(&JOURNAL_MAGIC);
        bytes.extend_from_slice(&self.original_page_count.to_le_bytes());
        bytes.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
        let header_crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&header_crc.to_le_bytes());

        for record in &self.records {
            let start = bytes.len();
            bytes.extend_from_slice(&record.page_id.to_le_bytes());
            bytes.extend_from_slice(record.image.as_slice());
            let crc = crc32fast::hash(&bytes[start..]);
            bytes.extend_from_slice(&crc.to_le_bytes());
        }

        bytes
    }

    /// Classify raw journal bytes.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> JournalState {
        if bytes.is_empty() {
            return JournalState::Empty;
        }
        if bytes.len() < HEADER_SIZE {
            return JournalState::Torn("short header");
        }
        if bytes[..8] != JOURNAL_MAGIC {
            return JournalState::Torn("bad magic");
        }
        if crc32fast::hash(&bytes[..20]) != read_u32(bytes, 20) {
            return JournalState::Torn("header checksum mismatch");
        }

        let original_page_count = read_u64(bytes, 8);
        let record_count = read_u32(bytes, 16) as usize;
        if bytes.len() != HEADER_SIZE + record_count * RECORD_SIZE {
            return JournalState::Torn("record area length mismatch");
        }

        let mut records = Vec::with_capacity(record_count);
        for chunk in bytes[HEADER_SIZE..].chunks_exact(RECORD_SIZE) {
            let (body, crc) = chunk.split_at(8 + PAGE_SIZE);
            if crc32fast::hash(body) != read_u32(crc, 0) {
                return JournalState::Torn("record checksum mismatch");
            }
            let mut image = Box::new([0u8; PAGE_SIZE]);
            image.copy_from_slice(&body[8..]);
            records.push(BeforeImage {
                page_id: read_u64(body, 0),
                image,
            });
        }

        JournalState::Valid(Self {
            original_page_count,
            records,
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}
