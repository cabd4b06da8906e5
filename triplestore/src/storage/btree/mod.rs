//! B-tree implementation for the file backend.
//!
//! # Structure
//!
//! - Internal nodes: store separator keys and child page pointers
//! - Leaf nodes: store key-value pairs, singly linked for range scans
//!
//! # Key Format
//!
//! Keys are 32 bytes and compare bytewise. Callers encode their composite
//! keys big-endian so that byte order is numeric order.

mod node;
mod tree;

pub use node::{KEY_SIZE, Key, MAX_INLINE_VALUE_SIZE, NodeError};
pub use tree::{BTree, BTreeError, BTreeIterator, BTreeReader};
