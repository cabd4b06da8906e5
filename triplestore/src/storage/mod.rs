//! Single-file paged storage engine.
//!
//! # File Format
//!
//! The database is one file of 8KB pages plus a `<db>-journal` side file:
//!
//! - Page 0: superblock (format, page count, free list, one root per tree)
//! - Remaining pages: B-tree nodes, overflow chains and free pages
//!
//! Writes are staged in memory and committed atomically through the
//! rollback journal; see [`file`] for the protocol.

pub mod btree;
mod buffer_pool;
pub mod file;
pub mod io;
mod journal;
mod overflow;
mod page;
mod superblock;

pub use buffer_pool::{BufferPool, BufferPoolStats};
pub use file::{DatabaseFile, FileError, FileOptions, recover};
pub use io::{FileStorage, Storage, StorageError, journal_path};
pub use page::{PAGE_SIZE, Page, PageError, PageId, PageType};
pub use superblock::{Superblock, SuperblockError, TREE_SLOTS};
