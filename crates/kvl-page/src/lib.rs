//! Per-page storage engine of the KVL distributed key-value ledger.
//!
//! Each page is an immutable history of [`Commit`]s forming a DAG; a
//! commit's value is the root of a content-addressed ordered tree mapping
//! opaque keys to value references. Writes are staged in a [`Journal`] and
//! atomically sealed into a new commit; [`CommitWatcher`]s observe
//! committed changes with their provenance, and the sync layer consumes
//! the unsynced-commit queue and feeds remote commits back through
//! [`PageStorage::add_commit_from_sync`].
//!
//! # Scheduling model
//!
//! A page is meant to be driven from one scheduling context. The engine is
//! `Send + Sync` and internally guarded, but watcher callbacks run
//! synchronously on the inserting context and must not re-enter mutating
//! operations.
//!
//! # On-disk layout
//!
//! Under the page's root directory:
//!
//! - `objects/<hex(id)>` -- raw bytes of each object
//! - `commits/<hex(id)>` -- commit record bytes
//! - `heads/<hex(id)>` -- zero-byte markers, the head set
//! - `unsynced/<hex(id)>` -- zero-byte markers, the unsynced set
//!
//! [`PageStorage::init`] reconstructs the in-memory indexes from these
//! directories.

pub mod commit;
pub mod error;
pub mod journal;
pub mod storage;
pub mod watcher;

pub use commit::Commit;
pub use error::{PageError, PageResult};
pub use journal::{Journal, JournalState};
pub use storage::PageStorage;
pub use watcher::{CommitWatcher, WatcherId};
