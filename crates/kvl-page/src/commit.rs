use std::time::{SystemTime, UNIX_EPOCH};

use kvl_btree::{BTreeResult, TreeIterator};
use kvl_store::ObjectStore;
use kvl_types::{CommitId, ObjectId};

use crate::error::{PageError, PageResult};

/// Fixed-width prefix: generation (8) + timestamp (8) + root tree id (32).
const HEADER_LEN: usize = 8 + 8 + ObjectId::LEN;

/// An immutable versioned snapshot of a page.
///
/// A commit records its parents, the root of the tree holding its value,
/// a creation timestamp, and its generation (1 + the maximum parent
/// generation; the initial empty commit is generation 0).
///
/// The canonical serialization is deterministic: generation and timestamp
/// as big-endian u64, then the root tree id, then the parent ids in sorted
/// order. `id = SHA-256(serialization)`, so equal ids imply equal fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    id: CommitId,
    parents: Vec<CommitId>,
    root_tree_id: ObjectId,
    timestamp: u64,
    generation: u64,
}

impl Commit {
    /// The initial commit of a page: generation 0, no parents, the empty
    /// tree as its value, timestamp 0 so that every page starts from the
    /// same record.
    pub fn root(empty_tree_id: ObjectId) -> Self {
        Self::assemble(0, 0, empty_tree_id, Vec::new())
    }

    /// Build a new commit on top of its parents (one for linear commits,
    /// two for merges).
    pub fn from_content_and_parents(
        root_tree_id: ObjectId,
        parents: &[Commit],
    ) -> PageResult<Self> {
        if parents.is_empty() || parents.len() > 2 {
            return Err(PageError::Internal(format!(
                "a commit takes one or two parents, got {}",
                parents.len()
            )));
        }
        let generation = 1 + parents
            .iter()
            .map(|p| p.generation)
            .max()
            .ok_or_else(|| PageError::Internal("parent generation lookup failed".to_string()))?;

        let mut parent_ids: Vec<CommitId> = parents.iter().map(|p| p.id).collect();
        parent_ids.sort();
        parent_ids.dedup();

        Ok(Self::assemble(
            generation,
            current_timestamp(),
            root_tree_id,
            parent_ids,
        ))
    }

    /// Recover a commit from its canonical serialization and recompute its
    /// id for verification.
    pub fn parse(bytes: &[u8]) -> PageResult<Self> {
        if bytes.len() < HEADER_LEN || (bytes.len() - HEADER_LEN) % CommitId::LEN != 0 {
            return Err(PageError::Format(format!(
                "commit record has invalid length {}",
                bytes.len()
            )));
        }

        let generation = u64::from_be_bytes(bytes[0..8].try_into().expect("fixed slice"));
        let timestamp = u64::from_be_bytes(bytes[8..16].try_into().expect("fixed slice"));
        let root_tree_id = ObjectId::from_hash(
            bytes[16..HEADER_LEN].try_into().expect("fixed slice"),
        );

        let parent_count = (bytes.len() - HEADER_LEN) / CommitId::LEN;
        if parent_count > 2 {
            return Err(PageError::Format(format!(
                "commit record lists {parent_count} parents"
            )));
        }
        let mut parents = Vec::with_capacity(parent_count);
        for chunk in bytes[HEADER_LEN..].chunks_exact(CommitId::LEN) {
            parents.push(CommitId::from_hash(chunk.try_into().expect("fixed slice")));
        }
        for pair in parents.windows(2) {
            if pair[0] >= pair[1] {
                return Err(PageError::Format(
                    "commit parents are not in canonical order".to_string(),
                ));
            }
        }

        Ok(Self {
            id: CommitId::from_data(bytes),
            parents,
            root_tree_id,
            timestamp,
            generation,
        })
    }

    fn assemble(
        generation: u64,
        timestamp: u64,
        root_tree_id: ObjectId,
        parents: Vec<CommitId>,
    ) -> Self {
        let mut commit = Self {
            id: CommitId::from_hash([0; 32]),
            parents,
            root_tree_id,
            timestamp,
            generation,
        };
        commit.id = CommitId::from_data(&commit.storage_bytes());
        commit
    }

    /// The canonical serialization this commit's id is computed over.
    pub fn storage_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.parents.len() * CommitId::LEN);
        bytes.extend_from_slice(&self.generation.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(self.root_tree_id.as_bytes());
        for parent in &self.parents {
            bytes.extend_from_slice(parent.as_bytes());
        }
        bytes
    }

    /// The commit's content-addressed id.
    pub fn id(&self) -> &CommitId {
        &self.id
    }

    /// Parent ids in canonical (sorted) order; empty only for the initial
    /// commit.
    pub fn parent_ids(&self) -> &[CommitId] {
        &self.parents
    }

    /// Root of the tree holding this commit's value.
    pub fn root_tree_id(&self) -> &ObjectId {
        &self.root_tree_id
    }

    /// Creation time, nanoseconds since the Unix epoch (0 for the initial
    /// commit).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Distance from the initial commit: 1 + the maximum parent generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Iterate the committed key/value entries in key order.
    pub fn contents<'a>(&self, store: &'a dyn ObjectStore) -> BTreeResult<TreeIterator<'a>> {
        TreeIterator::new(store, &self.root_tree_id)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
