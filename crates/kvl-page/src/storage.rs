use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use kvl_store::{FsObjectStore, Object, ObjectStore};
use kvl_types::{ChangeSource, CommitId, JournalType, ObjectId, PageId};

use crate::commit::Commit;
use crate::error::{PageError, PageResult};
use crate::journal::Journal;
use crate::watcher::{CommitWatcher, WatcherId, WatcherSet};

/// Directory names under the page root.
const OBJECTS_DIR: &str = "objects";
const COMMITS_DIR: &str = "commits";
const HEADS_DIR: &str = "heads";
const UNSYNCED_DIR: &str = "unsynced";

/// In-memory indexes over the on-disk commit graph.
///
/// Reconstructable from the `commits/` directory; the marker directories
/// (`heads/`, `unsynced/`) persist the derived sets across restarts.
#[derive(Default)]
struct PageIndex {
    /// Every commit whose record is on disk.
    known: HashSet<CommitId>,
    /// Every id listed as a parent by some known commit.
    referenced: HashSet<CommitId>,
    /// Commits with no known descendant. Never empty after init.
    heads: BTreeSet<CommitId>,
    /// Locally created commits not yet acknowledged by sync.
    unsynced: BTreeSet<CommitId>,
    /// The most recent locally created commit, if any.
    last_local: Option<CommitId>,
    initialized: bool,
}

/// The per-page storage engine.
///
/// Owns a directory root holding the object store, the commit records, and
/// the head/unsynced markers, plus the in-memory indexes and the watcher
/// list. Values are self-contained: there is no global state, and every
/// page directory is independent.
///
/// All mutating operations take `&self`; internal state is guarded so the
/// engine is `Send + Sync`. Commit insertions are totally ordered per page
/// and watcher notifications preserve that order.
pub struct PageStorage {
    page_id: PageId,
    root: PathBuf,
    store: FsObjectStore,
    index: RwLock<PageIndex>,
    watchers: WatcherSet,
}

impl PageStorage {
    /// Bind a page to a directory root. Creates the object directory;
    /// [`init`] must run before commit-related operations.
    ///
    /// [`init`]: PageStorage::init
    pub fn new(root: impl Into<PathBuf>, page_id: PageId) -> PageResult<Self> {
        let root = root.into();
        let store = FsObjectStore::open(root.join(OBJECTS_DIR))?;
        Ok(Self {
            page_id,
            root,
            store,
            index: RwLock::new(PageIndex::default()),
            watchers: WatcherSet::new(),
        })
    }

    /// Open or create the on-disk state.
    ///
    /// Loads the commit graph and marker sets from disk. An empty page is
    /// seeded with the initial commit (generation 0, empty root tree, no
    /// parents) installed as the sole head; the initial commit is not
    /// marked unsynced. Idempotent.
    pub fn init(&self) -> PageResult<()> {
        let mut index = self.index.write().expect("page index lock poisoned");
        if index.initialized {
            return Ok(());
        }

        for dir in [COMMITS_DIR, HEADS_DIR, UNSYNCED_DIR] {
            fs::create_dir_all(self.root.join(dir))?;
        }

        // Rebuild the commit graph indexes from the records on disk.
        for entry in fs::read_dir(self.root.join(COMMITS_DIR))? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|s| CommitId::from_hex(s).ok()) else {
                warn!(file = ?name, "ignoring stray file in commits directory");
                continue;
            };
            let bytes = fs::read(entry.path())?;
            let commit = Commit::parse(&bytes)?;
            if *commit.id() != id {
                return Err(PageError::Format(format!(
                    "commit record {} hashes to {}",
                    id.short_hex(),
                    commit.id().short_hex()
                )));
            }
            index.known.insert(id);
            index.referenced.extend(commit.parent_ids().iter().copied());
        }

        let heads = self.read_markers(HEADS_DIR, &index.known)?;
        let unsynced = self.read_markers(UNSYNCED_DIR, &index.known)?;
        index.heads = heads;
        index.unsynced = unsynced;

        if index.known.is_empty() {
            // Fresh page: synthesize the initial commit.
            let empty_root = kvl_btree::empty_tree(&self.store)?;
            let commit = Commit::root(empty_root);
            let id = *commit.id();
            fs::write(self.commit_path(&id), commit.storage_bytes())?;
            touch(&self.marker_path(HEADS_DIR, &id))?;
            index.known.insert(id);
            index.heads.insert(id);
            debug!(page = %self.page_id, commit = %id.short_hex(), "seeded initial commit");
        } else if index.heads.is_empty() {
            // Markers were lost; the head set is derivable from the graph.
            let recovered: BTreeSet<CommitId> = index
                .known
                .difference(&index.referenced)
                .copied()
                .collect();
            for id in &recovered {
                touch(&self.marker_path(HEADS_DIR, id))?;
            }
            warn!(page = %self.page_id, heads = recovered.len(), "recovered head markers");
            index.heads = recovered;
        }

        index.initialized = true;
        Ok(())
    }

    /// The caller-supplied page identifier.
    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    /// The directory root this page lives under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The page's object store, for reading committed trees and values.
    pub fn object_store(&self) -> &dyn ObjectStore {
        &self.store
    }

    // -------------------------------------------------------------------
    // Commits
    // -------------------------------------------------------------------

    /// Ids of all commits with no known descendant. Never empty; order
    /// unspecified.
    pub fn head_commit_ids(&self) -> PageResult<Vec<CommitId>> {
        let index = self.read_index()?;
        Ok(index.heads.iter().copied().collect())
    }

    /// Load a commit by id.
    pub fn get_commit(&self, id: &CommitId) -> PageResult<Commit> {
        {
            let index = self.read_index()?;
            if !index.known.contains(id) {
                return Err(PageError::NotFound(format!("commit {id}")));
            }
        }
        let bytes = fs::read(self.commit_path(id))?;
        let commit = Commit::parse(&bytes)?;
        if commit.id() != id {
            return Err(PageError::Format(format!(
                "commit record {} hashes to {}",
                id.short_hex(),
                commit.id().short_hex()
            )));
        }
        Ok(commit)
    }

    /// Insert a locally created commit.
    ///
    /// Every parent must already be known. The commit is written to disk,
    /// marked unsynced, the head set is updated, and watchers are notified
    /// with [`ChangeSource::Local`]. Re-adding a known commit is a no-op.
    pub fn add_commit_from_local(&self, commit: Commit) -> PageResult<()> {
        self.insert_commit(&commit, ChangeSource::Local)
    }

    /// Ingest a commit from the remote replica.
    ///
    /// The bytes are parsed and the recomputed id must match `id`. Every
    /// parent must already be known. Sync commits never enter the unsynced
    /// set; watchers are notified with [`ChangeSource::Sync`]. Re-ingesting
    /// a known commit succeeds without side effect.
    pub fn add_commit_from_sync(&self, id: &CommitId, bytes: &[u8]) -> PageResult<()> {
        let commit = Commit::parse(bytes)?;
        if commit.id() != id {
            return Err(PageError::Format(format!(
                "sync commit {} hashes to {}",
                id.short_hex(),
                commit.id().short_hex()
            )));
        }
        self.insert_commit(&commit, ChangeSource::Sync)
    }

    /// Open a journal staging writes on top of `base`.
    pub fn start_commit(
        &self,
        base: &CommitId,
        journal_type: JournalType,
    ) -> PageResult<Journal<'_>> {
        self.require_known(base)?;
        Ok(Journal::new(self, vec![*base], journal_type))
    }

    /// Open a merge journal whose commit will have both bases as parents.
    ///
    /// Staged operations apply on top of `left`'s tree; reconciling the
    /// two sides is the caller's responsibility. Merge journals are
    /// explicit: the caller must commit or roll back.
    pub fn start_merge_commit(
        &self,
        left: &CommitId,
        right: &CommitId,
    ) -> PageResult<Journal<'_>> {
        self.require_known(left)?;
        self.require_known(right)?;
        Ok(Journal::new(
            self,
            vec![*left, *right],
            JournalType::Explicit,
        ))
    }

    /// The head a locally initiated journal should build on when the page
    /// has several heads.
    ///
    /// Prefers the head descending from the last locally created commit;
    /// otherwise the head with the greatest generation, ties broken by the
    /// lexicographically least id. Stable until the head set changes.
    pub fn local_branch_head(&self) -> PageResult<CommitId> {
        let (head_ids, last_local) = {
            let index = self.read_index()?;
            (
                index.heads.iter().copied().collect::<Vec<_>>(),
                index.last_local,
            )
        };
        if head_ids.len() == 1 {
            return Ok(head_ids[0]);
        }

        let mut heads: Vec<Commit> = head_ids
            .iter()
            .map(|id| self.get_commit(id))
            .collect::<PageResult<_>>()?;
        heads.sort_by(|a, b| {
            b.generation()
                .cmp(&a.generation())
                .then_with(|| a.id().cmp(b.id()))
        });

        if let Some(last) = last_local {
            for head in &heads {
                if self.descends_from(head.id(), &last)? {
                    return Ok(*head.id());
                }
            }
        }
        heads
            .first()
            .map(|c| *c.id())
            .ok_or_else(|| PageError::Internal("page has no heads".to_string()))
    }

    // -------------------------------------------------------------------
    // Objects
    // -------------------------------------------------------------------

    /// Store raw bytes as an object, returning it with its id. Blocks the
    /// caller; intended for bootstrap, tests, and non-runner callers.
    pub fn add_object(&self, data: &[u8]) -> PageResult<Object> {
        self.store.write(data)?;
        Ok(Object::new(data.to_vec()))
    }

    /// Drain a byte stream into the object store.
    ///
    /// `expected_size < 0` means unknown; a non-negative mismatch against
    /// the realized length is an I/O error and nothing is written.
    pub fn add_object_from_reader(
        &self,
        reader: &mut dyn Read,
        expected_size: i64,
    ) -> PageResult<ObjectId> {
        Ok(self.store.write_from_reader(reader, expected_size)?)
    }

    /// Load an object by id, verifying its hash.
    pub fn get_object(&self, id: &ObjectId) -> PageResult<Object> {
        Ok(self.store.read(id)?)
    }

    // -------------------------------------------------------------------
    // Sync consumer interface
    // -------------------------------------------------------------------

    /// Locally created commits not yet acknowledged by the remote, in
    /// topological order (parents first).
    pub fn unsynced_commits(&self) -> PageResult<Vec<Commit>> {
        let ids: Vec<CommitId> = {
            let index = self.read_index()?;
            index.unsynced.iter().copied().collect()
        };
        let mut commits: Vec<Commit> = ids
            .iter()
            .map(|id| self.get_commit(id))
            .collect::<PageResult<_>>()?;
        // A parent's generation is strictly below its child's, so this is
        // a topological order.
        commits.sort_by(|a, b| {
            a.generation()
                .cmp(&b.generation())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(commits)
    }

    /// Record that the remote acknowledged a commit. Unknown commits are
    /// an error; clearing an already-synced commit is a no-op.
    pub fn mark_commit_synced(&self, id: &CommitId) -> PageResult<()> {
        let mut index = self.write_index()?;
        if !index.known.contains(id) {
            return Err(PageError::NotFound(format!("commit {id}")));
        }
        if index.unsynced.remove(id) {
            remove_if_present(&self.marker_path(UNSYNCED_DIR, id))?;
            debug!(commit = %id.short_hex(), "marked commit synced");
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Watchers
    // -------------------------------------------------------------------

    /// Register a watcher; it sees every commit inserted after this call.
    pub fn add_commit_watcher(&self, watcher: Arc<dyn CommitWatcher>) -> WatcherId {
        self.watchers.add(watcher)
    }

    /// Deregister a watcher. Effective immediately; returns whether the
    /// registration existed.
    pub fn remove_commit_watcher(&self, id: WatcherId) -> bool {
        self.watchers.remove(id)
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    /// The single insertion path for commits, local and sync alike.
    ///
    /// Writes the record, updates the head set (a parent stops being a
    /// head; the new commit becomes one unless something already lists it
    /// as a parent), maintains the unsynced set for local commits, and
    /// fans out to watchers after the index lock is released.
    pub(crate) fn insert_commit(
        &self,
        commit: &Commit,
        source: ChangeSource,
    ) -> PageResult<()> {
        let id = *commit.id();
        {
            let mut index = self.write_index()?;
            if index.known.contains(&id) {
                return Ok(());
            }
            for parent in commit.parent_ids() {
                if !index.known.contains(parent) {
                    return Err(PageError::NotFound(format!("parent commit {parent}")));
                }
            }

            fs::write(self.commit_path(&id), commit.storage_bytes())?;
            index.known.insert(id);
            for parent in commit.parent_ids() {
                index.referenced.insert(*parent);
                if index.heads.remove(parent) {
                    remove_if_present(&self.marker_path(HEADS_DIR, parent))?;
                }
            }
            if !index.referenced.contains(&id) {
                index.heads.insert(id);
                touch(&self.marker_path(HEADS_DIR, &id))?;
            }
            if source == ChangeSource::Local {
                index.unsynced.insert(id);
                touch(&self.marker_path(UNSYNCED_DIR, &id))?;
                index.last_local = Some(id);
            }
        }

        debug!(
            page = %self.page_id,
            commit = %id.short_hex(),
            generation = commit.generation(),
            %source,
            "commit inserted"
        );
        self.watchers.notify(commit, source);
        Ok(())
    }

    /// Whether `from` can reach `ancestor` by following parent edges.
    fn descends_from(&self, from: &CommitId, ancestor: &CommitId) -> PageResult<bool> {
        if from == ancestor {
            return Ok(true);
        }
        let floor = self.get_commit(ancestor)?.generation();
        let mut seen: HashSet<CommitId> = HashSet::new();
        let mut queue = vec![*from];
        while let Some(id) = queue.pop() {
            if id == *ancestor {
                return Ok(true);
            }
            let commit = self.get_commit(&id)?;
            // Parent generations only decrease; stop below the target.
            if commit.generation() <= floor {
                continue;
            }
            for parent in commit.parent_ids() {
                if seen.insert(*parent) {
                    queue.push(*parent);
                }
            }
        }
        Ok(false)
    }

    fn require_known(&self, id: &CommitId) -> PageResult<()> {
        let index = self.read_index()?;
        if !index.known.contains(id) {
            return Err(PageError::NotFound(format!("commit {id}")));
        }
        Ok(())
    }

    fn read_index(&self) -> PageResult<std::sync::RwLockReadGuard<'_, PageIndex>> {
        let index = self.index.read().expect("page index lock poisoned");
        if !index.initialized {
            return Err(PageError::IllegalState("page storage not initialized"));
        }
        Ok(index)
    }

    fn write_index(&self) -> PageResult<std::sync::RwLockWriteGuard<'_, PageIndex>> {
        let index = self.index.write().expect("page index lock poisoned");
        if !index.initialized {
            return Err(PageError::IllegalState("page storage not initialized"));
        }
        Ok(index)
    }

    fn commit_path(&self, id: &CommitId) -> PathBuf {
        self.root.join(COMMITS_DIR).join(id.to_hex())
    }

    fn marker_path(&self, dir: &str, id: &CommitId) -> PathBuf {
        self.root.join(dir).join(id.to_hex())
    }

    fn read_markers(
        &self,
        dir: &str,
        known: &HashSet<CommitId>,
    ) -> PageResult<BTreeSet<CommitId>> {
        let mut set = BTreeSet::new();
        for entry in fs::read_dir(self.root.join(dir))? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|s| CommitId::from_hex(s).ok()) else {
                warn!(file = ?name, dir, "ignoring stray marker file");
                continue;
            };
            if !known.contains(&id) {
                warn!(commit = %id.short_hex(), dir, "dropping marker for unknown commit");
                remove_if_present(&entry.path())?;
                continue;
            }
            set.insert(id);
        }
        Ok(set)
    }
}

impl std::fmt::Debug for PageStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStorage")
            .field("page_id", &self.page_id)
            .field("root", &self.root)
            .finish()
    }
}

/// Create a zero-byte marker file.
fn touch(path: &Path) -> std::io::Result<()> {
    fs::write(path, [])
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
