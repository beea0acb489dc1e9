use std::io::Read;

use kvl_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::Object;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same data always produces the same id.
/// - Writes are idempotent; re-writing existing content is a no-op.
/// - Reads verify the content hash and fail on mismatch instead of
///   returning corrupt bytes.
/// - Concurrent reads are always safe (objects are immutable).
/// - The store never interprets object contents.
pub trait ObjectStore: Send + Sync {
    /// Write raw bytes and return their content-addressed id.
    fn write(&self, data: &[u8]) -> StoreResult<ObjectId>;

    /// Read an object by id.
    ///
    /// Fails with [`StoreError::NotFound`] when absent and
    /// [`StoreError::HashMismatch`] when the stored bytes do not hash back
    /// to `id`.
    fn read(&self, id: &ObjectId) -> StoreResult<Object>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Drain a byte stream into the store, hashing as it goes.
    ///
    /// `expected_size < 0` means the size is unknown and any drained length
    /// is accepted. A non-negative `expected_size` that differs from the
    /// realized length fails with [`StoreError::SizeMismatch`] and writes
    /// nothing.
    fn write_from_reader(
        &self,
        reader: &mut dyn Read,
        expected_size: i64,
    ) -> StoreResult<ObjectId> {
        let mut data = Vec::new();
        if expected_size >= 0 {
            data.reserve(expected_size as usize);
        }
        reader.read_to_end(&mut data)?;
        if expected_size >= 0 && data.len() as u64 != expected_size as u64 {
            return Err(StoreError::SizeMismatch {
                expected: expected_size as u64,
                actual: data.len() as u64,
            });
        }
        self.write(&data)
    }
}
