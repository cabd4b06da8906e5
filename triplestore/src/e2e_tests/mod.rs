//! End-to-end tests at the store API level.
//!
//! Each test file covers a specific scenario. Scenarios are written once,
//! generic over the backend, and run against both the in-memory backend and
//! the paged backend.

#![cfg(test)]

mod helpers;

mod test_context_isolation;
mod test_context_removal;
mod test_crash_recovery;
mod test_fault_rollback;
mod test_idempotence;
mod test_model;
mod test_multi_context;
mod test_pattern_enumeration;
mod test_persistence;
mod test_quoted;
mod test_reference_counting;
mod test_round_trip;
