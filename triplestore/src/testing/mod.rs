//! Shared helpers for unit tests.

use std::path::PathBuf;

use crate::simulation::SimulatedStorage;
use crate::storage::{BufferPool, DatabaseFile, FileOptions};

/// Buffer pool size used by test pagers.
pub const TEST_POOL_PAGES: usize = 64;

/// A fresh pager over simulated storage.
#[must_use]
pub fn memory_pager() -> DatabaseFile<SimulatedStorage> {
    #[allow(clippy::expect_used)]
    DatabaseFile::open(
        SimulatedStorage::new(0),
        BufferPool::new(TEST_POOL_PAGES),
        FileOptions::default(),
    )
    .expect("formatting an empty simulated device cannot fail")
}

/// A temporary directory and a database path inside it.
///
/// The directory is removed when the returned guard is dropped.
#[must_use]
pub fn temp_database_path() -> (tempfile::TempDir, PathBuf) {
    #[allow(clippy::expect_used)]
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("triples.db");
    (dir, path)
}
