// Life of a mutation:
// 1. Validate term positions
// 2. Read through an overlay, staging every keyspace write in one batch:
//     - Intern terms (only for triples new to the store)
//     - Register the context
//     - Index the triple under the context and, if new, globally
// 3. Apply the batch:
//     - Memory backend: insert into the keyspace maps
//     - Paged backend: B-tree writes into dirty pages, then a journaled commit
//
// System components:
//  - Term interner
//  - Permutation indices and membership records
//  - Context registry
//  - Ordered key-value backends over a transactional pager
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod backend;
pub mod config;
pub mod simulation;
pub mod storage;
pub mod store;
pub mod types;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod testing;
