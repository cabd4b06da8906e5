//! Page types and constants for the storage engine.
//!
//! The file backend uses 8KB pages as the fundamental unit of I/O.

use std::sync::Arc;

use crate::storage::buffer_pool::BufferPool;

/// Page size in bytes (8KB).
pub const PAGE_SIZE: usize = 8192;

/// Page size as u64 for offset calculations.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// A page identifier (0-indexed page number). Page 0 is the superblock, so
/// 0 doubles as the "no page" link value.
pub type PageId = u64;

/// Page type identifiers stored in page headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    /// Superblock (page 0 only)
    Superblock = 0x01,
    /// B-tree internal node
    BTreeInternal = 0x02,
    /// B-tree leaf node
    BTreeLeaf = 0x03,
    /// Overflow page for large values
    Overflow = 0x04,
    /// Free page (on free list)
    Free = 0x05,
}

impl TryFrom<u8> for PageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Superblock),
            0x02 => Ok(Self::BTreeInternal),
            0x03 => Ok(Self::BTreeLeaf),
            0x04 => Ok(Self::Overflow),
            0x05 => Ok(Self::Free),
            _ => Err(value),
        }
    }
}

/// Common page header present at the start of every page except the superblock.
///
/// Layout:
/// - `page_type`: 1 byte
/// - `flags`: 1 byte
/// - `checksum`: 4 bytes (CRC32)
/// - `reserved`: 2 bytes
///
/// Total: 8 bytes
#[derive(Debug, Copy, Clone)]
pub struct PageHeader {
    pub page_type: PageType,
    pub flags: u8,
    pub checksum: u32,
}

impl PageHeader {
    /// Size of the page header in bytes.
    pub const SIZE: usize = 8;

    /// Header for a freshly formatted page. The checksum is stamped at commit.
    #[must_use]
    pub const fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            flags: 0,
            checksum: 0,
        }
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.page_type as u8;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Result<Self, PageError> {
        let page_type = PageType::try_from(bytes[0]).map_err(PageError::InvalidPageType)?;
        let flags = bytes[1];
        let checksum = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);

        Ok(Self {
            page_type,
            flags,
            checksum,
        })
    }
}

/// A page buffer.
///
/// Buffers leased from a [`BufferPool`] go back to the pool on drop.
pub struct Page {
    data: Option<Box<[u8; PAGE_SIZE]>>,
    pool: Option<Arc<BufferPool>>,
}

impl Page {
    /// Create a new zeroed page that is not backed by a pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Some(Box::new([0u8; PAGE_SIZE])),
            pool: None,
        }
    }

    /// Wrap a buffer leased from `pool`.
    #[must_use]
    pub(crate) fn from_pool(buffer: Box<[u8; PAGE_SIZE]>, pool: Arc<BufferPool>) -> Self {
        Self {
            data: Some(buffer),
            pool: Some(pool),
        }
    }

    /// Copy the contents into a new page, leasing from the same pool when possible.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut copy = self
            .pool
            .as_ref()
            .and_then(BufferPool::lease_page)
            .unwrap_or_default();
        copy.as_bytes_mut().copy_from_slice(self.as_bytes());
        copy
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        // `data` is only taken in `drop`.
        self.data.as_deref().unwrap_or(&ZERO_PAGE)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        self.data.get_or_insert_with(|| Box::new([0u8; PAGE_SIZE]))
    }

    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.as_bytes()[offset..offset + len]
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.as_bytes_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.as_bytes()[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.as_bytes_mut()[offset] = value;
    }

    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        let data = self.as_bytes();
        u16::from_le_bytes([data[offset], data[offset + 1]])
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read_bytes(offset, 4));
        u32::from_le_bytes(buf)
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read_bytes(offset, 8));
        u64::from_le_bytes(buf)
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Read the common page header.
    pub fn header(&self) -> Result<PageHeader, PageError> {
        let mut buf = [0u8; PageHeader::SIZE];
        buf.copy_from_slice(self.read_bytes(0, PageHeader::SIZE));
        PageHeader::from_bytes(buf)
    }

    /// Compute CRC32 of the page with the checksum field (bytes 2-5) zeroed.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let data = self.as_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[0..2]);
        hasher.update(&[0u8; 4]);
        hasher.update(&data[6..]);
        hasher.finalize()
    }

    /// Store the current checksum in the header.
    pub fn stamp_checksum(&mut self) {
        let checksum = self.compute_checksum();
        self.write_u32(2, checksum);
    }

    /// Verify the stored checksum against the page contents.
    pub fn verify_checksum(&self) -> Result<(), PageError> {
        let expected = self.read_u32(2);
        let actual = self.compute_checksum();
        if expected == actual {
            Ok(())
        } else {
            Err(PageError::ChecksumMismatch { expected, actual })
        }
    }
}

static ZERO_PAGE: [u8; PAGE_SIZE] = [0u8; PAGE_SIZE];

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if let (Some(data), Some(pool)) = (self.data.take(), self.pool.take()) {
            pool.return_buffer(data);
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("first_16_bytes", &&self.as_bytes()[..16])
            .field("pooled", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

/// Errors related to page operations.
#[derive(Debug, PartialEq, Eq)]
pub enum PageError {
    /// Invalid page type byte.
    InvalidPageType(u8),
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageType(v) => write!(f, "invalid page type: 0x{v:02x}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for PageError {}
