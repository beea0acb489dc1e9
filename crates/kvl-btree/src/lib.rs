//! Immutable, content-addressed ordered B-tree.
//!
//! Each commit's value is the root of one of these trees: an ordered map
//! from opaque keys to value references. Nodes are immutable once written
//! and serialized as plain objects, so a node is addressable by its content
//! and shared structure deduplicates for free.
//!
//! Mutation is copy-on-write: [`apply`] walks each staged put/delete from
//! the root to its leaf and allocates fresh nodes only along that path,
//! referencing every unchanged subtree by its existing id. Node boundaries
//! are derived from key hashes alone, so the same key set yields the same
//! nodes regardless of insertion order.
//!
//! [`TreeIterator`] walks a tree in key order without materializing it.

pub mod builder;
pub mod error;
pub mod iterator;
pub mod node;

pub use builder::{apply, build_from_sorted, empty_tree, Change, NODE_FANOUT};
pub use error::{BTreeError, BTreeResult};
pub use iterator::TreeIterator;
pub use node::TreeNode;
