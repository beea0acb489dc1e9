//! Core types shared across the KVL page storage engine.
//!
//! Everything in a page is content-addressed: an [`ObjectId`] is the SHA-256
//! of the stored bytes, a [`CommitId`] is the SHA-256 of a commit's canonical
//! serialization. Equal ids imply equal bytes, which makes objects
//! deduplicatable and verifiable on read.
//!
//! The other types here are the shared vocabulary of the engine:
//!
//! - [`Entry`] -- a key/value-reference pair with a sync [`KeyPriority`]
//! - [`ChangeSource`] -- whether a commit originated locally or from sync
//! - [`JournalType`] -- explicit vs. implicit journal finalization

pub mod entry;
pub mod error;
pub mod ids;
pub mod source;

pub use entry::{Entry, Key, KeyPriority};
pub use error::TypeError;
pub use ids::{CommitId, ObjectId, PageId};
pub use source::{ChangeSource, JournalType};
