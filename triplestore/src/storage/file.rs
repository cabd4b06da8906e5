//! Transactional pager over a [`Storage`] device.
//!
//! All page writes of a transaction are buffered in a dirty-page map. Reads
//! see the dirty pages first, so a transaction observes its own writes. Commit
//! follows the rollback-journal protocol:
//!
//! 1. Stage the updated superblock as dirty page 0.
//! 2. Write the before-image of every dirty page that existed when the
//!    transaction began to the journal, then sync the journal.
//! 3. Write the dirty pages and sync the database file.
//! 4. Clear the journal. This is the commit point.
//!
//! A failure after step 2 restores the before-images in process. If that
//! also fails the pager is poisoned and refuses further work; the next open
//! rolls the journal back.
//!
//! # Invariants
//!
//! - Outside a transaction the dirty map is empty and `superblock == committed`.
//! - Pages at or beyond `committed.total_page_count` have no before-image;
//!   rollback discards them by truncating the device.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::storage::buffer_pool::BufferPool;
use crate::storage::io::{Storage, StorageError};
use crate::storage::journal::{BeforeImage, Journal, JournalState};
use crate::storage::page::{PAGE_SIZE, Page, PageError, PageHeader, PageId, PageType};
use crate::storage::superblock::{Superblock, SuperblockError};

/// Pager options.
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    /// Sync the journal and the database file during commit.
    pub sync_on_commit: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
        }
    }
}

/// A database file with transactional page I/O.
pub struct DatabaseFile<S: Storage> {
    storage: S,
    buffer_pool: Arc<BufferPool>,
    options: FileOptions,
    /// Superblock as of the last commit.
    committed: Superblock,
    /// Working superblock of the open transaction.
    superblock: Superblock,
    dirty: BTreeMap<PageId, Page>,
    in_transaction: bool,
    poisoned: bool,
}

impl<S: Storage> DatabaseFile<S> {
    /// Open a database on `storage`, formatting it if empty and rolling back
    /// an interrupted commit if one is found.
    pub fn open(
        mut storage: S,
        buffer_pool: Arc<BufferPool>,
        options: FileOptions,
    ) -> Result<Self, FileError> {
        recover(&mut storage)?;

        if storage.page_count()? == 0 {
            let page = Superblock::new().to_page(&buffer_pool);
            storage.write_page(0, page.as_bytes())?;
            storage.sync()?;
            tracing::info!("formatted new database");
        }

        let mut page = buffer_pool.page_zeroed();
        storage.read_page(0, page.as_bytes_mut())?;
        let superblock = Superblock::from_page(&page)?;

        let device_pages = storage.page_count()?;
        if device_pages < superblock.total_page_count {
            return Err(FileError::Corruption(format!(
                "superblock records {} pages but the device holds {device_pages}",
                superblock.total_page_count
            )));
        }

        tracing::debug!(
            pages = superblock.total_page_count,
            commits = superblock.commit_count,
            "opened database file"
        );

        Ok(Self {
            storage,
            buffer_pool,
            options,
            committed: superblock,
            superblock,
            dirty: BTreeMap::new(),
            in_transaction: false,
            poisoned: false,
        })
    }

    /// The working superblock.
    #[must_use]
    pub const fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// The superblock as of the last commit.
    #[must_use]
    pub const fn committed_superblock(&self) -> &Superblock {
        &self.committed
    }

    #[must_use]
    pub const fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Consume the pager, returning the device.
    pub fn into_storage(self) -> S {
        self.storage
    }

    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Read a page, seeing uncommitted writes of the open transaction.
    pub fn read_page(&self, page_id: PageId) -> Result<Page, FileError> {
        if page_id >= self.superblock.total_page_count {
            return Err(FileError::PageOutOfBounds {
                page_id,
                total_pages: self.superblock.total_page_count,
            });
        }

        if let Some(page) = self.dirty.get(&page_id) {
            return Ok(page.duplicate());
        }

        let mut page = self.buffer_pool.page_zeroed();
        self.storage.read_page(page_id, page.as_bytes_mut())?;
        if page_id != 0 {
            page.verify_checksum()
                .map_err(|source| FileError::Page { page_id, source })?;
        }
        Ok(page)
    }

    /// Lease a zeroed page buffer.
    #[must_use]
    pub fn new_page(&self) -> Page {
        self.buffer_pool.page_zeroed()
    }

    /// Stage a page write in the open transaction.
    pub fn write_page(&mut self, page_id: PageId, page: Page) -> Result<(), FileError> {
        self.require_transaction()?;
        if page_id == 0 || page_id >= self.superblock.total_page_count {
            return Err(FileError::PageOutOfBounds {
                page_id,
                total_pages: self.superblock.total_page_count,
            });
        }
        self.dirty.insert(page_id, page);
        Ok(())
    }

    /// Allocate a page, reusing the free list before growing the file.
    ///
    /// The caller must write the returned page before commit.
    pub fn allocate_page(&mut self) -> Result<PageId, FileError> {
        self.require_transaction()?;

        let head = self.superblock.free_list_head;
        if head != 0 {
            let page = self.read_page(head)?;
            let header = page
                .header()
                .map_err(|source| FileError::Page { page_id: head, source })?;
            if header.page_type != PageType::Free {
                return Err(FileError::Corruption(format!(
                    "free list head {head} is a {:?} page",
                    header.page_type
                )));
            }
            self.superblock.free_list_head = page.read_u64(PageHeader::SIZE);
            return Ok(head);
        }

        let page_id = self.superblock.total_page_count;
        self.superblock.total_page_count += 1;
        Ok(page_id)
    }

    /// Return a page to the free list.
    pub fn free_page(&mut self, page_id: PageId) -> Result<(), FileError> {
        let mut page = self.new_page();
        page.write_bytes(0, &PageHeader::new(PageType::Free).to_bytes());
        page.write_u64(PageHeader::SIZE, self.superblock.free_list_head);
        self.write_page(page_id, page)?;
        self.superblock.free_list_head = page_id;
        Ok(())
    }

    /// Root page of a tree slot in the working superblock.
    #[must_use]
    pub const fn root(&self, slot: usize) -> PageId {
        self.superblock.roots[slot]
    }

    /// Update the root page of a tree slot.
    pub fn set_root(&mut self, slot: usize, page_id: PageId) -> Result<(), FileError> {
        self.require_transaction()?;
        self.superblock.roots[slot] = page_id;
        Ok(())
    }

    /// Start a transaction.
    pub fn begin(&mut self) -> Result<(), FileError> {
        if self.poisoned {
            return Err(FileError::Poisoned);
        }
        debug_assert!(!self.in_transaction, "nested transaction");
        debug_assert!(self.dirty.is_empty());
        self.in_transaction = true;
        Ok(())
    }

    /// Discard every write of the open transaction.
    pub fn rollback(&mut self) {
        self.dirty.clear();
        self.superblock = self.committed;
        self.in_transaction = false;
    }

    /// Durably commit the open transaction.
    ///
    /// On error the transaction is rolled back; the database keeps its
    /// previous committed state.
    pub fn commit(&mut self) -> Result<(), FileError> {
        self.require_transaction()?;

        if self.dirty.is_empty() && self.superblock == self.committed {
            self.in_transaction = false;
            return Ok(());
        }

        self.superblock.commit_count += 1;
        let superblock_page = self.superblock.to_page(&self.buffer_pool);
        self.dirty.insert(0, superblock_page);

        let journal = match self.write_journal() {
            Ok(journal) => journal,
            Err(e) => {
                // The database file is untouched. A journal left behind
                // only holds images of committed pages.
                if let Err(clear_err) = self.storage.journal_clear() {
                    tracing::warn!(error = %clear_err, "could not clear journal after failed commit");
                }
                self.rollback();
                return Err(e);
            }
        };

        if let Err(e) = self.write_dirty_pages() {
            tracing::warn!(error = %e, "commit failed, restoring before-images");
            if let Err(restore_err) = restore(&mut self.storage, &journal) {
                tracing::error!(
                    error = %restore_err,
                    "in-process rollback failed; database needs recovery on next open"
                );
                self.poisoned = true;
            }
            self.rollback();
            return Err(e);
        }

        self.committed = self.superblock;
        self.dirty.clear();
        self.in_transaction = false;

        tracing::trace!(
            commit = self.committed.commit_count,
            before_images = journal.records.len(),
            "commit complete"
        );
        Ok(())
    }

    fn write_journal(&mut self) -> Result<Journal, FileError> {
        let mut journal = Journal::new(self.committed.total_page_count);
        for &page_id in self.dirty.keys() {
            if page_id >= self.committed.total_page_count {
                break;
            }
            let mut image = Box::new([0u8; PAGE_SIZE]);
            self.storage.read_page(page_id, &mut image)?;
            journal.records.push(BeforeImage { page_id, image });
        }

        self.storage.journal_write(&journal.encode())?;
        if self.options.sync_on_commit {
            self.storage.journal_sync()?;
        }
        Ok(journal)
    }

    fn write_dirty_pages(&mut self) -> Result<(), FileError> {
        for (&page_id, page) in &mut self.dirty {
            if page_id != 0 {
                page.stamp_checksum();
            }
            self.storage.write_page(page_id, page.as_bytes())?;
        }
        if self.options.sync_on_commit {
            self.storage.sync()?;
        }
        self.storage.journal_clear()?;
        Ok(())
    }

    const fn require_transaction(&self) -> Result<(), FileError> {
        if self.poisoned {
            Err(FileError::Poisoned)
        } else if self.in_transaction {
            Ok(())
        } else {
            Err(FileError::NoTransaction)
        }
    }
}

/// Roll back an interrupted commit left on `storage`, if any.
///
/// Returns whether a rollback happened.
pub fn recover<S: Storage>(storage: &mut S) -> Result<bool, FileError> {
    let bytes = storage.journal_read()?;
    match Journal::decode(&bytes) {
        JournalState::Empty => Ok(false),
        JournalState::Torn(reason) => {
            tracing::warn!(reason, bytes = bytes.len(), "discarding incomplete journal");
            storage.journal_clear()?;
            Ok(false)
        }
        JournalState::Valid(journal) => {
            tracing::warn!(
                before_images = journal.records.len(),
                original_pages = journal.original_page_count,
                "rolling back interrupted commit"
            );
            restore(storage, &journal)?;
            Ok(true)
        }
    }
}

fn restore<S: Storage>(storage: &mut S, journal: &Journal) -> Result<(), FileError> {
    for record in &journal.records {
        storage.write_page(record.page_id, &record.image)?;
    }
    storage.truncate(journal.original_page_count)?;
    storage.sync()?;
    storage.journal_clear()?;
    Ok(())
}

/// Errors that can occur during pager operations.
#[derive(Debug)]
pub enum FileError {
    /// Device error.
    Storage(StorageError),
    /// Unreadable superblock.
    Superblock(SuperblockError),
    /// Unreadable page.
    Page { page_id: PageId, source: PageError },
    /// Page ID out of bounds.
    PageOutOfBounds { page_id: PageId, total_pages: u64 },
    /// Structural damage found while following page links.
    Corruption(String),
    /// Write attempted outside a transaction.
    NoTransaction,
    /// A failed commit could not be undone in process.
    Poisoned,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Superblock(e) => write!(f, "superblock error: {e}"),
            Self::Page { page_id, source } => write!(f, "page {page_id}: {source}"),
            Self::PageOutOfBounds {
                page_id,
                total_pages,
            } => {
                write!(
                    f,
                    "page {page_id} out of bounds (total pages: {total_pages})"
                )
            }
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::NoTransaction => write!(f, "no transaction in progress"),
            Self::Poisoned => write!(f, "database poisoned by a failed rollback; reopen it"),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Superblock(e) => Some(e),
            Self::Page { source, .. } => Some(source),
            Self::PageOutOfBounds { .. }
            | Self::Corruption(_)
            | Self::NoTransaction
            | Self::Poisoned => None,
        }
    }
}

impl From<StorageError> for FileError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<SuperblockError> for FileError {
    fn from(e: SuperblockError) -> Self {
        Self::Superblock(e)
    }
}
