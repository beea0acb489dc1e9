use std::collections::HashMap;
use std::sync::RwLock;

use kvl_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::Object;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access; bytes are cloned on read.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn write(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = ObjectId::from_data(data);
        let mut map = self.objects.write().expect("lock poisoned");
        // Idempotent: the same id always maps to the same content.
        map.entry(id).or_insert_with(|| data.to_vec());
        Ok(id)
    }

    fn read(&self, id: &ObjectId) -> StoreResult<Object> {
        let map = self.objects.read().expect("lock poisoned");
        let data = map.get(id).cloned().ok_or(StoreError::NotFound(*id))?;
        let object = Object::new(data);
        if object.id() != id {
            return Err(StoreError::HashMismatch {
                id: *id,
                computed: *object.id(),
            });
        }
        Ok(object)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_roundtrip() {
        let store = InMemoryObjectStore::new();
        let id = store.write(b"hello world").unwrap();
        assert_eq!(id, ObjectId::from_data(b"hello world"));

        let obj = store.read(&id).unwrap();
        assert_eq!(obj.data(), b"hello world");
        assert_eq!(*obj.id(), id);
    }

    #[test]
    fn same_content_produces_same_id() {
        let store = InMemoryObjectStore::new();
        let id1 = store.write(b"identical content").unwrap();
        let id2 = store.write(b"identical content").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn different_content_produces_different_ids() {
        let store = InMemoryObjectStore::new();
        let id1 = store.write(b"aaa").unwrap();
        let id2 = store.write(b"bbb").unwrap();
        assert_ne!(id1, id2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn read_missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_data(b"missing");
        assert!(matches!(store.read(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn exists_reflects_writes() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_data(b"present");
        assert!(!store.exists(&id).unwrap());
        store.write(b"present").unwrap();
        assert!(store.exists(&id).unwrap());
    }

    #[test]
    fn write_from_reader_accepts_matching_size() {
        let store = InMemoryObjectStore::new();
        let content = b"Some data";
        let id = store
            .write_from_reader(&mut &content[..], content.len() as i64)
            .unwrap();
        assert_eq!(id, ObjectId::from_data(content));
    }

    #[test]
    fn write_from_reader_accepts_unknown_size() {
        let store = InMemoryObjectStore::new();
        let content = b"Some data";
        let id = store.write_from_reader(&mut &content[..], -1).unwrap();
        assert_eq!(id, ObjectId::from_data(content));
    }

    #[test]
    fn write_from_reader_rejects_wrong_size() {
        let store = InMemoryObjectStore::new();
        let content = b"Some data";
        let err = store
            .write_from_reader(&mut &content[..], 123)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::SizeMismatch {
                expected: 123,
                actual: 9
            }
        ));
        // Nothing was written.
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let id = store.write(b"shared data").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let obj = store.read(&id).unwrap();
                    assert_eq!(*obj.id(), id);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }
}
