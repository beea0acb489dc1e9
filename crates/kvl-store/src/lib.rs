//! Content-addressed object storage for KVL pages.
//!
//! Every piece of data in a page -- values, tree nodes, commit records --
//! is stored as an immutable [`Object`] identified by the SHA-256 of its
//! bytes.
//!
//! # Design rules
//!
//! 1. Objects are immutable once written; content-addressing guarantees
//!    that the same data always produces the same id.
//! 2. Writes are idempotent: re-writing existing content is a no-op.
//! 3. Reads verify the hash; bytes that do not hash back to their id are
//!    reported as corruption, never returned silently.
//! 4. The store never interprets object contents.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! # Backends
//!
//! - [`FsObjectStore`] -- one file per object under `objects/<hex(id)>`
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::Object;
pub use traits::ObjectStore;
