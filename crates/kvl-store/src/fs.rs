use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use kvl_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::Object;
use crate::traits::ObjectStore;

/// Filesystem-backed object store: one file per object.
///
/// Objects live under a single directory, named by the lowercase hex of
/// their id, holding exactly the object bytes. The directory is append-only
/// and write-once-per-id; concurrent writers of the same content produce
/// identical bytes, so the last rename wins harmlessly.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (or create) an object directory at the given path.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory objects are stored under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.to_hex())
    }
}

impl ObjectStore for FsObjectStore {
    fn write(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = ObjectId::from_data(data);
        let path = self.object_path(&id);
        if path.exists() {
            // Idempotent: the id fully determines the content.
            return Ok(id);
        }

        // Stage under a temp name, then rename, so a half-written object is
        // never visible under its final name.
        let tmp = self.root.join(format!(".tmp-{}", id.to_hex()));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        debug!(object = %id.short_hex(), bytes = data.len(), "wrote object");
        Ok(id)
    }

    fn read(&self, id: &ObjectId) -> StoreResult<Object> {
        let path = self.object_path(id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

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
        match fs::metadata(self.object_path(id)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, FsObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::open(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[test]
    fn write_creates_file_named_by_hex_id() {
        let (_dir, store) = make_store();
        let id = store.write(b"Some data").unwrap();

        let path = store.root().join(id.to_hex());
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk, b"Some data");
    }

    #[test]
    fn read_roundtrips_bytes() {
        let (_dir, store) = make_store();
        let id = store.write(b"hello world").unwrap();
        let obj = store.read(&id).unwrap();
        assert_eq!(obj.data(), b"hello world");
    }

    #[test]
    fn write_is_idempotent() {
        let (_dir, store) = make_store();
        let id1 = store.write(b"idempotent").unwrap();
        let id2 = store.write(b"idempotent").unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn read_missing_object_is_not_found() {
        let (_dir, store) = make_store();
        let id = ObjectId::from_data(b"never written");
        assert!(matches!(store.read(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn read_detects_corruption() {
        let (_dir, store) = make_store();
        let id = store.write(b"original bytes").unwrap();

        // Tamper with the file behind the store's back.
        fs::write(store.root().join(id.to_hex()), b"tampered").unwrap();

        let err = store.read(&id).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }

    #[test]
    fn exists_reflects_directory_contents() {
        let (_dir, store) = make_store();
        let id = ObjectId::from_data(b"check me");
        assert!(!store.exists(&id).unwrap());
        store.write(b"check me").unwrap();
        assert!(store.exists(&id).unwrap());
    }

    #[test]
    fn reopen_sees_existing_objects() {
        let dir = TempDir::new().unwrap();
        let objects = dir.path().join("objects");
        let id = {
            let store = FsObjectStore::open(&objects).unwrap();
            store.write(b"persistent").unwrap()
        };

        let store = FsObjectStore::open(&objects).unwrap();
        assert_eq!(store.read(&id).unwrap().data(), b"persistent");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, store) = make_store();
        store.write(b"a").unwrap();
        store.write(b"b").unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "found temp files: {leftovers:?}");
    }
}
