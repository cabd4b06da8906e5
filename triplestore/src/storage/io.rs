//! Page device abstraction.
//!
//! The pager talks to a [`Storage`] instead of a file so that the same commit
//! and recovery code runs against [`FileStorage`] in production and against
//! the fault-injecting simulated device in tests.
//!
//! A device exposes two byte regions: the page file and a side journal. The
//! journal is opaque to the device; its format belongs to the pager.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::storage::page::{PAGE_SIZE, PAGE_SIZE_U64, PageId};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Page beyond the end of the device.
    PageOutOfBounds { page_id: PageId, total_pages: u64 },
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::PageOutOfBounds {
                page_id,
                total_pages,
            } => write!(
                f,
                "page {page_id} out of bounds (total pages: {total_pages})"
            ),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::PageOutOfBounds { .. } | Self::InjectedFault(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A page-addressed device with a side journal.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_page` takes `&self` and returns the last written content
/// - `write_page` past the end grows the device
/// - `sync` makes all previous page writes durable
/// - `journal_sync` makes the journal contents durable
/// - `journal_clear` is durable once it returns
pub trait Storage: Send + Sync {
    /// Read a page into `buf`.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), StorageError>;

    /// Write a page, growing the device if needed.
    fn write_page(&mut self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), StorageError>;

    /// Number of whole pages on the device.
    fn page_count(&self) -> Result<u64, StorageError>;

    /// Shrink (or grow) the device to `page_count` pages.
    fn truncate(&mut self, page_count: u64) -> Result<(), StorageError>;

    /// Make page writes durable.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Entire journal contents; empty when there is no journal.
    fn journal_read(&self) -> Result<Vec<u8>, StorageError>;

    /// Replace the journal contents.
    fn journal_write(&mut self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Make the journal contents durable.
    fn journal_sync(&mut self) -> Result<(), StorageError>;

    /// Empty the journal durably.
    fn journal_clear(&mut self) -> Result<(), StorageError>;
}

/// Journal path for a database file: `<db>-journal`.
#[must_use]
pub fn journal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("-journal");
    PathBuf::from(name)
}

/// A database file plus its journal file on the local filesystem.
///
/// Reads use positional I/O so they need only `&self`.
pub struct FileStorage {
    file: File,
    journal: File,
    path: PathBuf,
}

impl FileStorage {
    /// Open the files at `path`, creating them if they do not exist.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let journal = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(journal_path(path))?;

        Ok(Self {
            file,
            journal,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset)? {
            0 => return Err(std::io::ErrorKind::WriteZero.into()),
            n => {
                buf = &buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

impl Storage for FileStorage {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), StorageError> {
        let total_pages = self.page_count()?;
        if page_id >= total_pages {
            return Err(StorageError::PageOutOfBounds {
                page_id,
                total_pages,
            });
        }
        read_exact_at(&self.file, buf, page_id * PAGE_SIZE_U64)?;
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), StorageError> {
        write_all_at(&self.file, buf, page_id * PAGE_SIZE_U64)?;
        Ok(())
    }

    fn page_count(&self) -> Result<u64, StorageError> {
        Ok(self.file.metadata()?.len() / PAGE_SIZE_U64)
    }

    fn truncate(&mut self, page_count: u64) -> Result<(), StorageError> {
        self.file.set_len(page_count * PAGE_SIZE_U64)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn journal_read(&self) -> Result<Vec<u8>, StorageError> {
        let len = self.journal.metadata()?.len();
        let mut bytes = vec![0u8; usize::try_from(len).unwrap_or(usize::MAX)];
        read_exact_at(&self.journal, &mut bytes, 0)?;
        Ok(bytes)
    }

    fn journal_write(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.journal.set_len(0)?;
        write_all_at(&self.journal, bytes, 0)?;
        self.journal.flush()?;
        Ok(())
    }

    fn journal_sync(&mut self) -> Result<(), StorageError> {
        self.journal.sync_all()?;
        Ok(())
    }

    fn journal_clear(&mut self) -> Result<(), StorageError> {
        self.journal.set_len(0)?;
        self.journal.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_storage_error_display() {
        let e = StorageError::PageOutOfBounds {
            page_id: 10,
            total_pages: 5,
        };
        assert!(e.to_string().contains("page 10"));
        assert!(e.to_string().contains("total pages: 5"));

        let e = StorageError::InjectedFault("test fault".to_string());
        assert!(e.to_string().contains("test fault"));
    }

    #[test]
    fn test_journal_path() {
        assert_eq!(
            journal_path(Path::new("/data/triples.db")),
            PathBuf::from("/data/triples.db-journal")
        );
    }

    #[test]
    fn test_file_storage_pages_and_journal() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("test.db");

        let mut storage = FileStorage::open(&path).expect("open storage");
        assert_eq!(storage.page_count().expect("count"), 0);

        let mut page = [0u8; PAGE_SIZE];
        page[10] = 0xAB;
        storage.write_page(2, &page).expect("write page");
        assert_eq!(storage.page_count().expect("count"), 3);

        let mut read = [0u8; PAGE_SIZE];
        storage.read_page(2, &mut read).expect("read page");
        assert_eq!(read[10], 0xAB);
        assert!(matches!(
            storage.read_page(3, &mut read),
            Err(StorageError::PageOutOfBounds { .. })
        ));

        storage.journal_write(b"before").expect("journal write");
        storage.journal_sync().expect("journal sync");
        assert_eq!(storage.journal_read().expect("journal read"), b"before");
        storage.journal_clear().expect("journal clear");
        assert!(storage.journal_read().expect("journal read").is_empty());

        storage.truncate(1).expect("truncate");
        assert_eq!(storage.page_count().expect("count"), 1);
        assert!(journal_path(&path).exists());
    }
}
