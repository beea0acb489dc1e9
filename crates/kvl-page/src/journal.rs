use std::collections::BTreeMap;

use tracing::{debug, warn};

use kvl_btree::Change;
use kvl_types::{ChangeSource, CommitId, JournalType, Key, KeyPriority, ObjectId};

use crate::commit::Commit;
use crate::error::{PageError, PageResult};
use crate::storage::PageStorage;

/// Lifecycle state of a journal. Both terminal states are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalState {
    Open,
    Committed,
    RolledBack,
}

/// A staged-write transaction against one page.
///
/// Operations accumulate in an ordered pending map (last write per key
/// wins) and take effect only when the journal is sealed by [`commit`].
/// Nothing is written to the store before that point, so dropping an open
/// explicit journal abandons it silently. An open *implicit* journal
/// commits itself on drop, best-effort.
///
/// Merge journals carry two base commits; their pending operations are
/// applied on top of the left base's tree, and the emitted commit has both
/// bases as parents.
///
/// [`commit`]: Journal::commit
pub struct Journal<'a> {
    storage: &'a PageStorage,
    journal_type: JournalType,
    bases: Vec<CommitId>,
    pending: BTreeMap<Key, Change>,
    state: JournalState,
}

impl<'a> Journal<'a> {
    pub(crate) fn new(
        storage: &'a PageStorage,
        bases: Vec<CommitId>,
        journal_type: JournalType,
    ) -> Self {
        Self {
            storage,
            journal_type,
            bases,
            pending: BTreeMap::new(),
            state: JournalState::Open,
        }
    }

    /// How this journal is finalized.
    pub fn journal_type(&self) -> JournalType {
        self.journal_type
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JournalState {
        self.state
    }

    /// Stage a put, overwriting any pending operation on the same key.
    pub fn put(
        &mut self,
        key: impl Into<Key>,
        value_id: ObjectId,
        priority: KeyPriority,
    ) -> PageResult<()> {
        self.check_open()?;
        self.pending
            .insert(key.into(), Change::Put { value_id, priority });
        Ok(())
    }

    /// Stage a delete, overwriting any pending operation on the same key.
    ///
    /// Deleting an absent key is not an error: the net effect on commit is
    /// "the key is absent", which already held.
    pub fn delete(&mut self, key: impl Into<Key>) -> PageResult<()> {
        self.check_open()?;
        self.pending.insert(key.into(), Change::Delete);
        Ok(())
    }

    /// Discard all staged operations and close the journal.
    pub fn rollback(&mut self) -> PageResult<()> {
        self.check_open()?;
        self.pending.clear();
        self.state = JournalState::RolledBack;
        Ok(())
    }

    /// Seal the journal into a commit.
    ///
    /// Staged operations are applied copy-on-write over the base tree; the
    /// new commit is registered with the page (bytes, heads, unsynced set,
    /// watcher fan-out) in one step. A journal whose staged operations
    /// leave the tree unchanged emits no commit and returns the base id
    /// (merge journals always emit; their two-parent commit is the
    /// observable merge). On failure the journal stays open so the caller
    /// may retry or roll back.
    pub fn commit(&mut self) -> PageResult<CommitId> {
        self.check_open()?;
        let id = self.seal()?;
        self.state = JournalState::Committed;
        Ok(id)
    }

    fn seal(&mut self) -> PageResult<CommitId> {
        let base_commits: Vec<Commit> = self
            .bases
            .iter()
            .map(|id| self.storage.get_commit(id))
            .collect::<PageResult<_>>()?;
        let base_root = *base_commits[0].root_tree_id();
        let is_merge = base_commits.len() > 1;

        if self.pending.is_empty() && !is_merge {
            return Ok(self.bases[0]);
        }

        let new_root = kvl_btree::apply(self.storage.object_store(), &base_root, &self.pending)?;
        if !is_merge && new_root == base_root {
            return Ok(self.bases[0]);
        }

        let commit = Commit::from_content_and_parents(new_root, &base_commits)?;
        let id = *commit.id();
        self.storage.insert_commit(&commit, ChangeSource::Local)?;
        debug!(
            commit = %id.short_hex(),
            ops = self.pending.len(),
            kind = %self.journal_type,
            "journal sealed"
        );
        Ok(id)
    }

    fn check_open(&self) -> PageResult<()> {
        match self.state {
            JournalState::Open => Ok(()),
            JournalState::Committed => Err(PageError::IllegalState("journal already committed")),
            JournalState::RolledBack => Err(PageError::IllegalState("journal rolled back")),
        }
    }
}

impl Drop for Journal<'_> {
    fn drop(&mut self) {
        if self.state == JournalState::Open && self.journal_type == JournalType::Implicit {
            if let Err(err) = self.commit() {
                warn!(error = %err, "implicit journal auto-commit failed on drop");
            }
        }
    }
}
