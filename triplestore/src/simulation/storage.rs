//! Simulated in-memory page device for deterministic testing.
//!
//! The device tracks two states: what reads observe (`current`) and what
//! would survive a power loss (`durable`). Page writes land in `current`;
//! `sync` copies `current` to `durable`. A crash image is a fresh device built
//! from `durable`, optionally with a random subset of unsynced page writes
//! applied to model writes that reached the disk out of order.
//!
//! Handles are cheap clones sharing one device, so a test can keep a handle
//! to arm faults and take crash images while the store owns another.
//!
//! Faults are injected deterministically, either at fixed operation numbers
//! or at seeded random rates.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{PAGE_SIZE, PageId, Storage, StorageError};

/// Configuration for fault injection.
///
/// Writes are numbered across page writes, journal writes and journal
/// clears; syncs across file and journal syncs. Numbers start at 0 when the
/// config is installed.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
    /// Fail the write with this number, once.
    pub fail_write_at: Option<u64>,
    /// Fail every write from this number on.
    pub fail_writes_from: Option<u64>,
    /// Fail the sync with this number, once.
    pub fail_sync_at: Option<u64>,
}

impl FaultConfig {
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fail_write_at(n: u64) -> Self {
        Self {
            fail_write_at: Some(n),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fail_writes_from(n: u64) -> Self {
        Self {
            fail_writes_from: Some(n),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fail_sync_at(n: u64) -> Self {
        Self {
            fail_sync_at: Some(n),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn random(write_error_rate: f64, sync_error_rate: f64) -> Self {
        Self {
            write_error_rate,
            sync_error_rate,
            ..Self::default()
        }
    }
}

/// Statistics about simulated storage operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulatedStorageStats {
    pub reads: u64,
    pub writes: u64,
    pub syncs: u64,
    pub injected_write_errors: u64,
    pub injected_sync_errors: u64,
}

#[derive(Clone, Default)]
struct DeviceState {
    pages: Vec<Box<[u8; PAGE_SIZE]>>,
    journal: Vec<u8>,
}

struct Inner {
    current: DeviceState,
    durable: DeviceState,
    faults: FaultConfig,
    rng: StdRng,
    write_seq: u64,
    sync_seq: u64,
    stats: SimulatedStorageStats,
}

impl Inner {
    fn inject_write_fault(&mut self, op: &str) -> Result<(), StorageError> {
        let seq = self.write_seq;
        self.write_seq += 1;
        self.stats.writes += 1;

        let fixed = self.faults.fail_write_at == Some(seq)
            || self.faults.fail_writes_from.is_some_and(|from| seq >= from);
        let random = self.faults.write_error_rate > 0.0
            && self.rng.random_bool(self.faults.write_error_rate.min(1.0));
        if fixed || random {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(format!("{op} #{seq}")));
        }
        Ok(())
    }

    fn inject_sync_fault(&mut self, op: &str) -> Result<(), StorageError> {
        let seq = self.sync_seq;
        self.sync_seq += 1;
        self.stats.syncs += 1;

        let fixed = self.faults.fail_sync_at == Some(seq);
        let random = self.faults.sync_error_rate > 0.0
            && self.rng.random_bool(self.faults.sync_error_rate.min(1.0));
        if fixed || random {
            self.stats.injected_sync_errors += 1;
            return Err(StorageError::InjectedFault(format!("{op} #{seq}")));
        }
        Ok(())
    }
}

/// In-memory device with crash images and fault injection.
#[derive(Clone)]
pub struct SimulatedStorage {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedStorage {
    /// Create an empty device. The seed drives random faults and torn crash
    /// images.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::from_state(DeviceState::default(), seed)
    }

    fn from_state(state: DeviceState, seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: state.clone(),
                durable: state,
                faults: FaultConfig::default(),
                rng: StdRng::seed_from_u64(seed),
                write_seq: 0,
                sync_seq: 0,
                stats: SimulatedStorageStats::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a fault configuration and restart operation numbering.
    pub fn set_faults(&self, faults: FaultConfig) {
        let mut inner = self.lock();
        inner.faults = faults;
        inner.write_seq = 0;
        inner.sync_seq = 0;
    }

    #[must_use]
    pub fn stats(&self) -> SimulatedStorageStats {
        self.lock().stats.clone()
    }

    /// A new device holding only what was synced.
    #[must_use]
    pub fn crash_image(&self) -> Self {
        let inner = self.lock();
        Self::from_state(inner.durable.clone(), 0)
    }

    /// A new device holding what was synced plus a random subset of the
    /// unsynced page writes and, at random, the unsynced journal.
    #[must_use]
    pub fn crash_image_torn(&self, seed: u64) -> Self {
        let inner = self.lock();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = inner.durable.clone();

        let mut unsynced = BTreeMap::new();
        for (page_id, page) in inner.current.pages.iter().enumerate() {
            if state.pages.get(page_id) != Some(page) {
                unsynced.insert(page_id, page);
            }
        }
        for (page_id, page) in unsynced {
            if rng.random_bool(0.5) {
                if state.pages.len() <= page_id {
                    state
                        .pages
                        .resize_with(page_id + 1, || Box::new([0u8; PAGE_SIZE]));
                }
                state.pages[page_id] = page.clone();
            }
        }
        if inner.current.journal != state.journal && rng.random_bool(0.5) {
            state.journal = inner.current.journal.clone();
        }

        Self::from_state(state, seed)
    }

    /// Flip one byte of a page in both views, simulating media corruption.
    pub fn corrupt_page(&self, page_id: PageId, offset: usize) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let index = page_index(page_id);
        for state in [&mut inner.current, &mut inner.durable] {
            if let Some(page) = state.pages.get_mut(index) {
                page[offset] ^= 0xFF;
            }
        }
    }
}

fn page_index(page_id: PageId) -> usize {
    usize::try_from(page_id).unwrap_or(usize::MAX)
}

impl Storage for SimulatedStorage {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.stats.reads += 1;
        let total_pages = inner.current.pages.len() as u64;
        let page = inner
            .current
            .pages
            .get(page_index(page_id))
            .ok_or(StorageError::PageOutOfBounds {
                page_id,
                total_pages,
            })?;
        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.inject_write_fault("page write")?;
        let index = page_index(page_id);
        if inner.current.pages.len() <= index {
            inner
                .current
                .pages
                .resize_with(index + 1, || Box::new([0u8; PAGE_SIZE]));
        }
        inner.current.pages[index].copy_from_slice(buf);
        Ok(())
    }

    fn page_count(&self) -> Result<u64, StorageError> {
        Ok(self.lock().current.pages.len() as u64)
    }

    fn truncate(&mut self, page_count: u64) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner
            .current
            .pages
            .resize_with(page_index(page_count), || Box::new([0u8; PAGE_SIZE]));
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.inject_sync_fault("file sync")?;
        inner.durable.pages = inner.current.pages.clone();
        Ok(())
    }

    fn journal_read(&self) -> Result<Vec<u8>, StorageError> {
        Ok(self.lock().current.journal.clone())
    }

    fn journal_write(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.inject_write_fault("journal write")?;
        inner.current.journal = bytes.to_vec();
        Ok(())
    }

    fn journal_sync(&mut self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.inject_sync_fault("journal sync")?;
        inner.durable.journal = inner.current.journal.clone();
        Ok(())
    }

    fn journal_clear(&mut self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.inject_write_fault("journal clear")?;
        inner.current.journal.clear();
        inner.durable.journal.clear();
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SimulatedStorage")
            .field("pages", &inner.current.pages.len())
            .field("durable_pages", &inner.durable.pages.len())
            .field("journal_bytes", &inner.current.journal.len())
            .finish_non_exhaustive()
    }
}
