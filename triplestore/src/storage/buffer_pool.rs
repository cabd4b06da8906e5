//! Bounded pool of page buffers.
//!
//! Every page the pager reads, stages or journals sits in an 8 KiB buffer.
//! The pool keeps `capacity` of them around so a busy commit recycles
//! buffers instead of allocating. A [`Page`] leased from the pool hands its
//! buffer back when it drops. An exhausted pool is not an error: the pager
//! allocates a one-off page and the pool counts the miss, so a pool that is
//! too small shows up in the stats instead of failing commits.
//!
//! # Invariants
//!
//! - `free.len() <= capacity`
//! - A buffer is either on the free list or owned by exactly one `Page`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::storage::page::{PAGE_SIZE, Page};

type Buffer = Box<[u8; PAGE_SIZE]>;

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub capacity: usize,
    /// Buffers on the free list right now.
    pub available: usize,
    /// Pages allocated outside the pool because it was empty.
    pub misses: u64,
}

/// A fixed set of page buffers shared by one pager.
pub struct BufferPool {
    free: Mutex<Vec<Buffer>>,
    capacity: usize,
    misses: AtomicU64,
}

impl BufferPool {
    /// Create a pool of `capacity` zeroed buffers.
    ///
    /// # Panics
    /// Panics if capacity is 0. `StoreConfig` rejects 0 before this point.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "Buffer pool capacity must be positive");
        Arc::new(Self {
            free: Mutex::new((0..capacity).map(|_| Box::new([0u8; PAGE_SIZE])).collect()),
            capacity,
            misses: AtomicU64::new(0),
        })
    }

    // A panic while holding the lock cannot leave a Vec of buffers torn.
    fn free_list(&self) -> MutexGuard<'_, Vec<Buffer>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease a page with stale contents, if a buffer is free.
    pub fn lease_page(self: &Arc<Self>) -> Option<Page> {
        let buffer = self.free_list().pop()?;
        Some(Page::from_pool(buffer, Arc::clone(self)))
    }

    /// Lease a zeroed page, if a buffer is free.
    pub fn lease_page_zeroed(self: &Arc<Self>) -> Option<Page> {
        let mut page = self.lease_page()?;
        page.as_bytes_mut().fill(0);
        Some(page)
    }

    /// A zeroed page, from the pool when possible.
    #[must_use]
    pub fn page_zeroed(self: &Arc<Self>) -> Page {
        self.lease_page_zeroed().unwrap_or_else(|| {
            let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
            if misses.is_power_of_two() {
                tracing::debug!(capacity = self.capacity, misses, "buffer pool exhausted");
            }
            Page::new()
        })
    }

    /// Take back a buffer from a dropped page.
    ///
    /// # Panics
    /// Panics if the pool is already full, which means a buffer was
    /// returned twice.
    pub(crate) fn return_buffer(&self, buffer: Buffer) {
        let mut free = self.free_list();
        assert!(
            free.len() < self.capacity,
            "Buffer pool overflow: returning buffer to full pool"
        );
        free.push(buffer);
    }

    #[must_use]
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            capacity: self.capacity,
            available: self.free_list().len(),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Buffers currently on the free list.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free_list().len()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
