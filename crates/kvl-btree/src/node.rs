use serde::{Deserialize, Serialize};

use kvl_store::ObjectStore;
use kvl_types::{Entry, ObjectId};

use crate::error::{BTreeError, BTreeResult};

/// An immutable B-tree node: ordered entries plus child references.
///
/// A node with `n` entries has exactly `n + 1` child slots. A slot holds
/// either the id of another node or nothing. For every non-empty child at
/// position `i`, all keys under it compare strictly between the keys of the
/// surrounding entries (with -inf/+inf sentinels at the edges).
///
/// The serialized form is itself a plain object, so nodes are addressable
/// by their content like everything else in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    entries: Vec<Entry>,
    children: Vec<Option<ObjectId>>,
}

impl TreeNode {
    /// Assemble a node from entries and child slots, validating invariants.
    pub fn new(entries: Vec<Entry>, children: Vec<Option<ObjectId>>) -> BTreeResult<Self> {
        let node = Self { entries, children };
        node.validate()?;
        Ok(node)
    }

    /// Load and decode the node stored under `id`.
    pub fn from_object(store: &dyn ObjectStore, id: &ObjectId) -> BTreeResult<Self> {
        let object = store.read(id)?;
        let node: TreeNode = bincode::deserialize(object.data())
            .map_err(|e| BTreeError::Format(format!("node {id}: {e}")))?;
        node.validate()?;
        Ok(node)
    }

    /// Serialize the node and write it to the store, returning its id.
    pub fn write_to(&self, store: &dyn ObjectStore) -> BTreeResult<ObjectId> {
        let bytes = bincode::serialize(self)
            .map_err(|e| BTreeError::Format(format!("node serialization: {e}")))?;
        Ok(store.write(&bytes)?)
    }

    /// Number of entries in this node.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// The ordered entries of this node.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The entry at `index`. Panics when out of bounds.
    pub fn entry(&self, index: usize) -> &Entry {
        &self.entries[index]
    }

    /// All child slots, in order; one more slot than entries.
    pub fn children(&self) -> &[Option<ObjectId>] {
        &self.children
    }

    /// The child id at `index`, failing with [`BTreeError::NoSuchChild`]
    /// when the slot is empty.
    pub fn child(&self, index: usize) -> BTreeResult<&ObjectId> {
        match self.children.get(index) {
            Some(Some(id)) => Ok(id),
            _ => Err(BTreeError::NoSuchChild(index)),
        }
    }

    /// The child id at `index`, or `None` when the slot is empty or out of
    /// bounds. Traversal code uses this to branch without error plumbing.
    pub fn child_id(&self, index: usize) -> Option<&ObjectId> {
        self.children.get(index).and_then(|slot| slot.as_ref())
    }

    fn validate(&self) -> BTreeResult<()> {
        if self.children.len() != self.entries.len() + 1 {
            return Err(BTreeError::Format(format!(
                "{} entries require {} child slots, found {}",
                self.entries.len(),
                self.entries.len() + 1,
                self.children.len()
            )));
        }
        for pair in self.entries.windows(2) {
            if pair[0].key >= pair[1].key {
                return Err(BTreeError::Format(
                    "entries are not strictly key-ordered".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvl_store::InMemoryObjectStore;
    use kvl_types::KeyPriority;

    fn entry(key: &[u8]) -> Entry {
        Entry::new(key.to_vec(), ObjectId::from_data(key), KeyPriority::Eager)
    }

    #[test]
    fn new_validates_child_arity() {
        let err = TreeNode::new(vec![entry(b"a")], vec![None]).unwrap_err();
        assert!(matches!(err, BTreeError::Format(_)));
    }

    #[test]
    fn new_validates_key_order() {
        let err = TreeNode::new(
            vec![entry(b"b"), entry(b"a")],
            vec![None, None, None],
        )
        .unwrap_err();
        assert!(matches!(err, BTreeError::Format(_)));

        // Duplicate keys are not strictly ordered either.
        let err = TreeNode::new(
            vec![entry(b"a"), entry(b"a")],
            vec![None, None, None],
        )
        .unwrap_err();
        assert!(matches!(err, BTreeError::Format(_)));
    }

    #[test]
    fn write_and_load_roundtrip() {
        let store = InMemoryObjectStore::new();
        let node = TreeNode::new(
            vec![entry(b"alpha"), entry(b"beta")],
            vec![None, None, None],
        )
        .unwrap();

        let id = node.write_to(&store).unwrap();
        let loaded = TreeNode::from_object(&store, &id).unwrap();
        assert_eq!(node, loaded);
    }

    #[test]
    fn identical_nodes_share_an_id() {
        let store = InMemoryObjectStore::new();
        let make = || TreeNode::new(vec![entry(b"k")], vec![None, None]).unwrap();
        let id1 = make().write_to(&store).unwrap();
        let id2 = make().write_to(&store).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn child_distinguishes_empty_slot_from_reference() {
        let store = InMemoryObjectStore::new();
        let leaf_id = TreeNode::new(vec![entry(b"a")], vec![None, None])
            .unwrap()
            .write_to(&store)
            .unwrap();

        let node = TreeNode::new(vec![entry(b"m")], vec![Some(leaf_id), None]).unwrap();
        assert_eq!(node.child(0).unwrap(), &leaf_id);
        assert!(matches!(node.child(1), Err(BTreeError::NoSuchChild(1))));
        assert!(matches!(node.child(7), Err(BTreeError::NoSuchChild(7))));

        assert_eq!(node.child_id(0), Some(&leaf_id));
        assert_eq!(node.child_id(1), None);
        assert_eq!(node.child_id(7), None);
    }

    #[test]
    fn from_object_rejects_garbage() {
        let store = InMemoryObjectStore::new();
        let id = store.write(b"definitely not a tree node").unwrap();
        let err = TreeNode::from_object(&store, &id).unwrap_err();
        assert!(matches!(err, BTreeError::Format(_)));
    }

    #[test]
    fn from_object_missing_is_store_not_found() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_data(b"absent");
        let err = TreeNode::from_object(&store, &id).unwrap_err();
        assert!(matches!(
            err,
            BTreeError::Store(kvl_store::StoreError::NotFound(_))
        ));
    }
}
