//! Deterministic simulation testing infrastructure.
//!
//! [`SimulatedStorage`] stands in for the database file so tests can inject
//! write and sync failures at exact points of a commit and reopen the store
//! from what a power loss would have left on disk.
//!
//! Given the same seed and the same sequence of operations, the device
//! behaves identically.
//!
//! # Usage
//!
//! ```ignore
//! let device = SimulatedStorage::new(12345);
//! let mut store = Store::open_paged(device.clone(), pool, FileOptions::default())?;
//! device.set_faults(FaultConfig::fail_write_at(3));
//! assert!(store.add(&s, &p, &o, &GraphName::Default, false).is_err());
//! let reopened = Store::open_paged(device.crash_image(), pool, FileOptions::default())?;
//! ```

mod storage;

pub use storage::{FaultConfig, SimulatedStorage, SimulatedStorageStats};
