//! Deterministic tree construction and copy-on-write mutation.
//!
//! Node boundaries are driven solely by the keys. Every key is assigned a
//! level derived from its hash (promotion one level up with probability
//! `1/NODE_FANOUT` per level); a node at level `l` holds the consecutive
//! level-`l` keys of its range, and the child slot between two adjacent
//! separators holds the strictly-lower-level keys of that gap -- or
//! nothing, when the gap is empty. The structure is a pure function of
//! the key set: the same keys yield the same nodes regardless of
//! insertion order.
//!
//! Mutation is leaf-to-root copy-on-write: an insert or delete allocates
//! fresh nodes only along the path it touches (plus the local split or
//! merge of the adjacent gap), and every unrelated subtree is referenced
//! by its existing id.

use std::collections::BTreeMap;

use kvl_store::ObjectStore;
use kvl_types::{Entry, Key, KeyPriority, ObjectId};

use crate::error::{BTreeError, BTreeResult};
use crate::node::TreeNode;

/// Expected branching factor.
///
/// A key is promoted one level up with probability `1/NODE_FANOUT`, so
/// nodes hold `NODE_FANOUT` entries on average. Splitting is driven
/// solely by key hashes, never by node occupancy, which is what makes
/// the shape independent of insertion order.
pub const NODE_FANOUT: usize = 16;

/// A staged mutation against one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// Insert or overwrite the key with a value reference.
    Put {
        value_id: ObjectId,
        priority: KeyPriority,
    },
    /// Remove the key. Removing an absent key is not an error.
    Delete,
}

/// Write the empty tree and return its id.
pub fn empty_tree(store: &dyn ObjectStore) -> BTreeResult<ObjectId> {
    write_empty_node(store)
}

/// Build a tree from a strictly key-ordered entry sequence.
pub fn build_from_sorted(store: &dyn ObjectStore, entries: Vec<Entry>) -> BTreeResult<ObjectId> {
    for pair in entries.windows(2) {
        if pair[0].key >= pair[1].key {
            return Err(BTreeError::Internal(
                "build input is not strictly key-ordered".to_string(),
            ));
        }
    }
    match build_subtree(store, &entries)? {
        Some(id) => Ok(id),
        None => write_empty_node(store),
    }
}

/// Merge staged changes into the tree rooted at `base_root` and return
/// the new root id.
///
/// Each change descends from the root to the affected position and
/// rewrites only the nodes on that path; subtrees the change does not
/// cross keep their existing ids.
pub fn apply(
    store: &dyn ObjectStore,
    base_root: &ObjectId,
    changes: &BTreeMap<Key, Change>,
) -> BTreeResult<ObjectId> {
    let root_node = TreeNode::from_object(store, base_root)?;
    // The canonical empty node stands in for "no tree"; unwrap it so the
    // mutation paths only ever see populated nodes.
    let mut current: Option<ObjectId> = if root_node.entry_count() == 0 {
        root_node.child_id(0).copied()
    } else {
        Some(*base_root)
    };

    for (key, change) in changes {
        current = match change {
            Change::Put { value_id, priority } => Some(insert_entry(
                store,
                current,
                Entry::new(key.clone(), *value_id, *priority),
            )?),
            Change::Delete => delete_key(store, current, key)?,
        };
    }

    match current {
        Some(id) => Ok(id),
        None => write_empty_node(store),
    }
}

/// The level a key lives at: the number of leading bytes of its hash
/// that fall on a `NODE_FANOUT` boundary.
fn node_level(key: &[u8]) -> usize {
    ObjectId::from_data(key)
        .as_bytes()
        .iter()
        .take_while(|b| **b % (NODE_FANOUT as u8) == 0)
        .count()
}

/// The level of a stored subtree node (all its entries share one level).
fn entry_level(node: &TreeNode) -> BTreeResult<usize> {
    node.entries()
        .first()
        .map(|e| node_level(&e.key))
        .ok_or_else(|| BTreeError::Internal("subtree node holds no entries".to_string()))
}

fn write_empty_node(store: &dyn ObjectStore) -> BTreeResult<ObjectId> {
    TreeNode::new(Vec::new(), vec![None])?.write_to(store)
}

/// Recursively build the subtree for a sorted, non-empty entry run: the
/// highest-level keys become this node's entries, each gap between them
/// becomes a child subtree.
fn build_subtree(
    store: &dyn ObjectStore,
    entries: &[Entry],
) -> BTreeResult<Option<ObjectId>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let top = entries
        .iter()
        .map(|e| node_level(&e.key))
        .max()
        .unwrap_or(0);

    let mut node_entries = Vec::new();
    let mut children = Vec::new();
    let mut start = 0;
    for (i, entry) in entries.iter().enumerate() {
        if node_level(&entry.key) == top {
            children.push(build_subtree(store, &entries[start..i])?);
            node_entries.push(entry.clone());
            start = i + 1;
        }
    }
    children.push(build_subtree(store, &entries[start..])?);

    Ok(Some(TreeNode::new(node_entries, children)?.write_to(store)?))
}

/// Insert (or overwrite) one entry, rewriting only the nodes on its path.
fn insert_entry(
    store: &dyn ObjectStore,
    subtree: Option<ObjectId>,
    entry: Entry,
) -> BTreeResult<ObjectId> {
    let level = node_level(&entry.key);
    let Some(root_id) = subtree else {
        return TreeNode::new(vec![entry], vec![None, None])?.write_to(store);
    };

    let node = TreeNode::from_object(store, &root_id)?;
    let subtree_level = entry_level(&node)?;

    if level > subtree_level {
        // The new key lives above the current root: split the whole tree
        // around it and put it on top.
        let (left, right) = split_at(store, Some(root_id), &entry.key)?;
        return TreeNode::new(vec![entry], vec![left, right])?.write_to(store);
    }

    let idx = node.entries().partition_point(|e| e.key < entry.key);
    let mut children = node.children().to_vec();

    if level == subtree_level {
        let mut entries = node.entries().to_vec();
        if idx < entries.len() && entries[idx].key == entry.key {
            // Same key: a value overwrite, no structural change.
            entries[idx] = entry;
        } else {
            // New separator at this level: the gap it lands in is split
            // into its left and right halves.
            let (left, right) = split_at(store, children[idx], &entry.key)?;
            entries.insert(idx, entry);
            children[idx] = left;
            children.insert(idx + 1, right);
        }
        return TreeNode::new(entries, children)?.write_to(store);
    }

    // The key lives below this node: descend into its gap.
    let old_child = children[idx];
    let new_child = insert_entry(store, old_child, entry)?;
    if old_child == Some(new_child) {
        return Ok(root_id);
    }
    children[idx] = Some(new_child);
    TreeNode::new(node.entries().to_vec(), children)?.write_to(store)
}

/// Remove one key, rewriting only the nodes on its path. Returns the
/// unchanged subtree when the key is absent.
fn delete_key(
    store: &dyn ObjectStore,
    subtree: Option<ObjectId>,
    key: &[u8],
) -> BTreeResult<Option<ObjectId>> {
    let Some(root_id) = subtree else {
        return Ok(None);
    };
    let node = TreeNode::from_object(store, &root_id)?;
    let subtree_level = entry_level(&node)?;
    let level = node_level(key);

    if level > subtree_level {
        // Were the key present, it would sit at its own level or above.
        return Ok(Some(root_id));
    }

    let idx = node.entries().partition_point(|e| e.key.as_slice() < key);

    if level == subtree_level {
        if idx >= node.entry_count() || node.entry(idx).key != key {
            return Ok(Some(root_id));
        }
        // Removing a separator merges the two gaps around it.
        let mut entries = node.entries().to_vec();
        let mut children = node.children().to_vec();
        let merged = merge_subtrees(store, children[idx], children[idx + 1])?;
        if entries.len() == 1 {
            // The node vanishes; its lone merged gap takes its place.
            return Ok(merged);
        }
        entries.remove(idx);
        children.remove(idx);
        children[idx] = merged;
        return Ok(Some(TreeNode::new(entries, children)?.write_to(store)?));
    }

    // The key lives below this node: descend into its gap.
    let mut children = node.children().to_vec();
    let old_child = children[idx];
    let new_child = delete_key(store, old_child, key)?;
    if new_child == old_child {
        return Ok(Some(root_id));
    }
    children[idx] = new_child;
    Ok(Some(
        TreeNode::new(node.entries().to_vec(), children)?.write_to(store)?,
    ))
}

/// Split a subtree into the parts strictly below and strictly above
/// `key`, rewriting only the node chain that `key`'s position crosses.
///
/// Only called for keys whose level is above the subtree, so `key` never
/// equals an entry inside it.
fn split_at(
    store: &dyn ObjectStore,
    subtree: Option<ObjectId>,
    key: &[u8],
) -> BTreeResult<(Option<ObjectId>, Option<ObjectId>)> {
    let Some(id) = subtree else {
        return Ok((None, None));
    };
    let node = TreeNode::from_object(store, &id)?;
    let idx = node.entries().partition_point(|e| e.key.as_slice() < key);
    let (child_left, child_right) = split_at(store, node.child_id(idx).copied(), key)?;

    let mut left_children = node.children()[..idx].to_vec();
    left_children.push(child_left);
    let left = write_fragment(store, &node.entries()[..idx], left_children)?;

    let mut right_children = vec![child_right];
    right_children.extend_from_slice(&node.children()[idx + 1..]);
    let right = write_fragment(store, &node.entries()[idx..], right_children)?;

    Ok((left, right))
}

/// Write one half of a split node; a half with no entries collapses to
/// its single child so no empty nodes are ever stored.
fn write_fragment(
    store: &dyn ObjectStore,
    entries: &[Entry],
    children: Vec<Option<ObjectId>>,
) -> BTreeResult<Option<ObjectId>> {
    if entries.is_empty() {
        return Ok(children.into_iter().next().flatten());
    }
    Ok(Some(
        TreeNode::new(entries.to_vec(), children)?.write_to(store)?,
    ))
}

/// Join two adjacent subtrees (every key on the left below every key on
/// the right), as left behind by removing the separator between them.
fn merge_subtrees(
    store: &dyn ObjectStore,
    left: Option<ObjectId>,
    right: Option<ObjectId>,
) -> BTreeResult<Option<ObjectId>> {
    let (left_id, right_id) = match (left, right) {
        (None, r) => return Ok(r),
        (l, None) => return Ok(l),
        (Some(l), Some(r)) => (l, r),
    };
    let left_node = TreeNode::from_object(store, &left_id)?;
    let right_node = TreeNode::from_object(store, &right_id)?;
    let left_level = entry_level(&left_node)?;
    let right_level = entry_level(&right_node)?;

    if left_level == right_level {
        // Same level: concatenate, joining the facing edge children.
        let last = left_node.entry_count();
        let middle = merge_subtrees(
            store,
            left_node.child_id(last).copied(),
            right_node.child_id(0).copied(),
        )?;
        let mut entries = left_node.entries().to_vec();
        entries.extend_from_slice(right_node.entries());
        let mut children = left_node.children()[..last].to_vec();
        children.push(middle);
        children.extend_from_slice(&right_node.children()[1..]);
        return Ok(Some(TreeNode::new(entries, children)?.write_to(store)?));
    }

    if left_level > right_level {
        // The right side belongs inside the left's last gap.
        let last = left_node.entry_count();
        let new_last =
            merge_subtrees(store, left_node.child_id(last).copied(), Some(right_id))?;
        let mut children = left_node.children().to_vec();
        children[last] = new_last;
        return Ok(Some(
            TreeNode::new(left_node.entries().to_vec(), children)?.write_to(store)?,
        ));
    }

    // Mirror case: the left side belongs inside the right's first gap.
    let new_first = merge_subtrees(store, Some(left_id), right_node.child_id(0).copied())?;
    let mut children = right_node.children().to_vec();
    children[0] = new_first;
    Ok(Some(
        TreeNode::new(right_node.entries().to_vec(), children)?.write_to(store)?,
    ))
}
