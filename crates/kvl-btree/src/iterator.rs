//! In-order traversal over a stored tree.
//!
//! The iterator keeps an explicit stack of positions instead of recursing,
//! because it must traverse a persistent copy-on-write tree lazily,
//! loading one node at a time and tolerating empty child slots without
//! losing in-order semantics.

use kvl_store::ObjectStore;
use kvl_types::{Entry, ObjectId};

use crate::error::{BTreeError, BTreeResult};
use crate::node::TreeNode;

/// One position in the traversal: a node plus two cursors.
///
/// `entry_index == -1` means no entry of this node has been yielded yet;
/// `child_index == -1` means no child has been explored yet. The two
/// cursors let the walk treat an empty child slot and the end of the child
/// list uniformly: both flip the direction of travel.
#[derive(Debug)]
struct Frame {
    node: TreeNode,
    entry_index: isize,
    child_index: isize,
}

/// In-order, lazy iterator over the entries of a stored tree.
///
/// Finite and not restartable: once exhausted it stays exhausted. Node
/// loads can fail mid-walk, so items are `Result`s; after an error the
/// iterator is exhausted.
pub struct TreeIterator<'a> {
    store: &'a dyn ObjectStore,
    stack: Vec<Frame>,
    current: Option<Entry>,
    pending_err: Option<BTreeError>,
}

impl<'a> std::fmt::Debug for TreeIterator<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeIterator")
            .field("stack", &self.stack)
            .field("current", &self.current)
            .field("pending_err", &self.pending_err)
            .finish()
    }
}

impl<'a> TreeIterator<'a> {
    /// Position a new iterator at the first entry of the tree rooted at
    /// `root_id`.
    pub fn new(store: &'a dyn ObjectStore, root_id: &ObjectId) -> BTreeResult<Self> {
        let mut iter = Self {
            store,
            stack: Vec::new(),
            current: None,
            pending_err: None,
        };

        // Descend as far left as possible. Each pushed frame starts just
        // "before" its first entry, about to consider child 0.
        let mut node = TreeNode::from_object(store, root_id)?;
        loop {
            let next_id = node.child_id(0).copied();
            iter.stack.push(Frame {
                node,
                entry_index: -1,
                child_index: 0,
            });
            match next_id {
                Some(id) => node = TreeNode::from_object(store, &id)?,
                None => break,
            }
        }

        iter.advance()?;
        Ok(iter)
    }

    /// Returns `true` once the traversal is exhausted.
    pub fn done(&self) -> bool {
        self.current.is_none() && self.pending_err.is_none()
    }

    /// Step to the next entry, or exhaust the stack.
    ///
    /// The walk runs in one of two directions. Descending, it looks for
    /// the next unexplored child and pushes it; an empty slot flips to
    /// ascending, and running past the child list pops. Ascending, it
    /// yields the next entry of the top node if one remains, else pops.
    fn advance(&mut self) -> BTreeResult<()> {
        self.current = None;
        let mut direction_up = false;
        while !self.stack.is_empty() {
            if direction_up {
                let Some(top) = self.stack.last_mut() else {
                    break;
                };
                top.entry_index += 1;
                let index = top.entry_index as usize;
                if index < top.node.entry_count() {
                    // A next entry exists in this node; point at it.
                    self.current = Some(top.node.entry(index).clone());
                    return Ok(());
                }
                // End of this node; keep moving up.
                self.stack.pop();
                continue;
            }

            // Explore the next child of the top node.
            let next_child = {
                let Some(top) = self.stack.last_mut() else {
                    break;
                };
                top.child_index += 1;
                if top.child_index as usize > top.node.entry_count() {
                    None
                } else {
                    Some(top.node.child_id(top.child_index as usize).copied())
                }
            };

            match next_child {
                Some(Some(id)) => {
                    // Non-empty child: push it. Its child cursor starts at
                    // -1 so the next step explores its leftmost child.
                    let node = TreeNode::from_object(self.store, &id)?;
                    self.stack.push(Frame {
                        node,
                        entry_index: -1,
                        child_index: -1,
                    });
                }
                Some(None) => {
                    // Empty slot: reverse direction and try the next entry.
                    direction_up = true;
                }
                None => {
                    // Past the child list: this node is fully explored.
                    self.stack.pop();
                    direction_up = true;
                }
            }
        }
        Ok(())
    }
}

impl Iterator for TreeIterator<'_> {
    type Item = BTreeResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending_err.take() {
            self.stack.clear();
            return Some(Err(err));
        }
        let current = self.current.take()?;
        if let Err(err) = self.advance() {
            // Deliver the current entry now; surface the failure on the
            // following call.
            self.pending_err = Some(err);
            self.stack.clear();
            self.current = None;
        }
        Some(Ok(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvl_store::InMemoryObjectStore;
    use kvl_types::KeyPriority;

    use crate::builder::{build_from_sorted, empty_tree};

    fn entry(key: String) -> Entry {
        Entry::new(
            key.clone().into_bytes(),
            ObjectId::from_data(key.as_bytes()),
            KeyPriority::Eager,
        )
    }

    fn sorted_entries(count: usize) -> Vec<Entry> {
        (0..count).map(|i| entry(format!("key{i:04}"))).collect()
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let store = InMemoryObjectStore::new();
        let root = empty_tree(&store).unwrap();

        let mut iter = TreeIterator::new(&store, &root).unwrap();
        assert!(iter.done());
        assert!(iter.next().is_none());
    }

    #[test]
    fn single_node_yields_entries_in_order() {
        let store = InMemoryObjectStore::new();
        let entries = sorted_entries(5);
        let root = build_from_sorted(&store, entries.clone()).unwrap();

        let yielded: Vec<Entry> = TreeIterator::new(&store, &root)
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(yielded, entries);
    }

    #[test]
    fn multi_level_tree_yields_all_entries_in_order() {
        let store = InMemoryObjectStore::new();
        let entries = sorted_entries(500);
        let root = build_from_sorted(&store, entries.clone()).unwrap();

        let yielded: Vec<Entry> = TreeIterator::new(&store, &root)
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(yielded.len(), 500);
        assert_eq!(yielded, entries);
    }

    #[test]
    fn keys_are_strictly_increasing() {
        let store = InMemoryObjectStore::new();
        let root = build_from_sorted(&store, sorted_entries(100)).unwrap();

        let keys: Vec<Vec<u8>> = TreeIterator::new(&store, &root)
            .unwrap()
            .map(|e| e.unwrap().key)
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn iterator_is_not_restartable() {
        let store = InMemoryObjectStore::new();
        let root = build_from_sorted(&store, sorted_entries(3)).unwrap();

        let mut iter = TreeIterator::new(&store, &root).unwrap();
        assert_eq!(iter.by_ref().count(), 3);
        assert!(iter.done());
        assert!(iter.next().is_none());
    }

    #[test]
    fn sparse_children_are_traversed_correctly() {
        // Hand-build an interior node whose children alternate between
        // present and empty, which the bulk builder never produces.
        let store = InMemoryObjectStore::new();
        let left = TreeNode::new(vec![entry("a".to_string())], vec![None, None])
            .unwrap()
            .write_to(&store)
            .unwrap();
        let right = TreeNode::new(vec![entry("z".to_string())], vec![None, None])
            .unwrap()
            .write_to(&store)
            .unwrap();

        let root = TreeNode::new(
            vec![entry("m".to_string()), entry("p".to_string())],
            vec![Some(left), None, Some(right)],
        )
        .unwrap()
        .write_to(&store)
        .unwrap();

        let keys: Vec<Vec<u8>> = TreeIterator::new(&store, &root)
            .unwrap()
            .map(|e| e.unwrap().key)
            .collect();
        assert_eq!(
            keys,
            vec![
                b"a".to_vec(),
                b"m".to_vec(),
                b"p".to_vec(),
                b"z".to_vec()
            ]
        );
    }

    #[test]
    fn missing_node_surfaces_as_error() {
        let store = InMemoryObjectStore::new();
        // A root referencing a child that was never written.
        let dangling = ObjectId::from_data(b"dangling child");
        let root = TreeNode::new(vec![entry("m".to_string())], vec![Some(dangling), None])
            .unwrap()
            .write_to(&store)
            .unwrap();

        let err = TreeIterator::new(&store, &root).unwrap_err();
        assert!(matches!(err, BTreeError::Store(_)));
    }
}
