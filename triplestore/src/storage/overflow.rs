//! Overflow page chains for large values.
//!
//! Values larger than `MAX_INLINE_VALUE_SIZE` (1024 bytes) are stored in a
//! chain of overflow pages and the B-tree leaf keeps an [`OverflowRef`].
//!
//! # Overflow Page Format
//!
//! ```text
//! +----------------+----------------+----------------+------------------+
//! | Page Header    | Next Page ID   | Data Length    | Data...          |
//! | (8 bytes)      | (8 bytes)      | (4 bytes)      | (variable)       |
//! +----------------+----------------+----------------+------------------+
//! ```
//!
//! # Overflow Reference Format
//!
//! ```text
//! +----------------+----------------+
//! | First Page ID  | Total Length   |
//! | (8 bytes)      | (4 bytes)      |
//! +----------------+----------------+
//! ```

#![allow(clippy::cast_possible_truncation)]

use crate::storage::file::{DatabaseFile, FileError};
use crate::storage::io::Storage;
use crate::storage::page::{PAGE_SIZE, Page, PageHeader, PageId, PageType};

const NEXT_OFFSET: usize = PageHeader::SIZE;
const LENGTH_OFFSET: usize = PageHeader::SIZE + 8;
const DATA_OFFSET: usize = PageHeader::SIZE + 12;

/// Maximum data per overflow page.
pub const OVERFLOW_DATA_PER_PAGE: usize = PAGE_SIZE - DATA_OFFSET;

/// Size of an overflow reference stored in leaf nodes.
pub const OVERFLOW_REF_SIZE: usize = 12;

/// Location of a value stored out of line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowRef {
    pub first_page: PageId,
    pub total_length: u32,
}

impl OverflowRef {
    #[must_use]
    pub fn to_bytes(self) -> [u8; OVERFLOW_REF_SIZE] {
        let mut buf = [0u8; OVERFLOW_REF_SIZE];
        buf[0..8].copy_from_slice(&self.first_page.to_le_bytes());
        buf[8..12].copy_from_slice(&self.total_length.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OverflowError> {
        if bytes.len() != OVERFLOW_REF_SIZE {
            return Err(OverflowError::BadReference(bytes.len()));
        }
        let mut first_page = [0u8; 8];
        first_page.copy_from_slice(&bytes[0..8]);
        let mut total_length = [0u8; 4];
        total_length.copy_from_slice(&bytes[8..12]);
        Ok(Self {
            first_page: u64::from_le_bytes(first_page),
            total_length: u32::from_le_bytes(total_length),
        })
    }
}

/// Write `value` to a fresh overflow chain.
pub fn write_overflow<S: Storage>(
    file: &mut DatabaseFile<S>,
    value: &[u8],
) -> Result<OverflowRef, OverflowError> {
    if value.is_empty() {
        return Err(OverflowError::EmptyValue);
    }

    let chunks: Vec<&[u8]> = value.chunks(OVERFLOW_DATA_PER_PAGE).collect();
    let mut page_ids = Vec::with_capacity(chunks.len());
    for _ in &chunks {
        page_ids.push(file.allocate_page()?);
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let next = page_ids.get(i + 1).copied().unwrap_or(0);
        let mut page = file.new_page();
        page.write_bytes(0, &PageHeader::new(PageType::Overflow).to_bytes());
        page.write_u64(NEXT_OFFSET, next);
        page.write_u32(LENGTH_OFFSET, chunk.len() as u32);
        page.write_bytes(DATA_OFFSET, chunk);
        file.write_page(page_ids[i], page)?;
    }

    Ok(OverflowRef {
        first_page: page_ids[0],
        total_length: value.len() as u32,
    })
}

/// Read a value back from its overflow chain.
pub fn read_overflow<S: Storage>(
    file: &DatabaseFile<S>,
    overflow_ref: OverflowRef,
) -> Result<Vec<u8>, OverflowError> {
    let expected = overflow_ref.total_length as usize;
    let mut result = Vec::with_capacity(expected);

    visit_chain(file, overflow_ref, |page| {
        let data_length = (page.read_u32(LENGTH_OFFSET) as usize).min(OVERFLOW_DATA_PER_PAGE);
        result.extend_from_slice(page.read_bytes(DATA_OFFSET, data_length));
    })?;

    if result.len() != expected {
        return Err(OverflowError::LengthMismatch {
            expected,
            actual: result.len(),
        });
    }
    Ok(result)
}

/// Move every page of a chain to the free list. Returns the number freed.
pub fn free_overflow<S: Storage>(
    file: &mut DatabaseFile<S>,
    overflow_ref: OverflowRef,
) -> Result<u64, OverflowError> {
    let pages = chain_pages(file, overflow_ref)?;
    for &page_id in &pages {
        file.free_page(page_id)?;
    }
    Ok(pages.len() as u64)
}

/// Pages of a chain.
pub fn chain_pages<S: Storage>(
    file: &DatabaseFile<S>,
    overflow_ref: OverflowRef,
) -> Result<Vec<PageId>, OverflowError> {
    let mut pages = Vec::new();
    let mut page_id = overflow_ref.first_page;
    visit_chain(file, overflow_ref, |page| {
        pages.push(page_id);
        page_id = page.read_u64(NEXT_OFFSET);
    })?;
    Ok(pages)
}

fn visit_chain<S: Storage>(
    file: &DatabaseFile<S>,
    overflow_ref: OverflowRef,
    mut visit: impl FnMut(&Page),
) -> Result<(), OverflowError> {
    // A chain never has more pages than its length requires; a longer one
    // is a cycle or a stale link.
    let max_pages = (overflow_ref.total_length as usize).div_ceil(OVERFLOW_DATA_PER_PAGE);
    let mut current = overflow_ref.first_page;
    let mut visited = 0usize;

    while current != 0 {
        if visited == max_pages {
            return Err(OverflowError::ChainTooLong(overflow_ref.first_page));
        }
        let page = file.read_page(current)?;
        let header = page.header().map_err(|source| FileError::Page {
            page_id: current,
            source,
        })?;
        if header.page_type != PageType::Overflow {
            return Err(OverflowError::InvalidPageType {
                page_id: current,
                found: header.page_type,
            });
        }
        visit(&page);
        visited += 1;
        current = page.read_u64(NEXT_OFFSET);
    }
    Ok(())
}

/// Errors that can occur during overflow operations.
#[derive(Debug)]
pub enum OverflowError {
    File(FileError),
    /// Empty values are always stored inline.
    EmptyValue,
    /// Stored reference has the wrong size.
    BadReference(usize),
    InvalidPageType { page_id: PageId, found: PageType },
    ChainTooLong(PageId),
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for OverflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(e) => write!(f, "file error: {e}"),
            Self::EmptyValue => write!(f, "empty value cannot use overflow"),
            Self::BadReference(len) => write!(f, "overflow reference of {len} bytes"),
            Self::InvalidPageType { page_id, found } => {
                write!(f, "overflow chain reaches {found:?} page {page_id}")
            }
            Self::ChainTooLong(first) => write!(f, "overflow chain at page {first} is too long"),
            Self::LengthMismatch { expected, actual } => {
                write!(
                    f,
                    "overflow length mismatch: expected {expected}, got {actual}"
                )
            }
        }
    }
}

impl std::error::Error for OverflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FileError> for OverflowError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}
