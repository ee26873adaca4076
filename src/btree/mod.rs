//! B+tree core.
//!
//! This module provides the in-memory b+tree with operations for:
//! - insert: Insertions, overwriting on duplicate keys
//! - remove: Removals with redistribute-first rebalancing
//! - get: Point lookups
//! - write: Level-order textual dump of the tree shape

mod node;
pub mod search;
mod tree;

pub use tree::{BPlusTree, MIN_ORDER};
