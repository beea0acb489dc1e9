use kvl_types::ObjectId;

/// An immutable byte blob addressed by the SHA-256 of its content.
///
/// The id is computed at construction, so an `Object` in hand always
/// satisfies `id == SHA-256(data)`. Stored files hold exactly `data`; there
/// is no framing or kind tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    id: ObjectId,
    data: Vec<u8>,
}

impl Object {
    /// Create an object from raw bytes, computing its id.
    pub fn new(data: Vec<u8>) -> Self {
        let id = ObjectId::from_data(&data);
        Self { id, data }
    }

    /// The content-addressed id.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// The object bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the object in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the object holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the object, returning its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_matches_content_hash() {
        let obj = Object::new(b"hello world".to_vec());
        assert_eq!(*obj.id(), ObjectId::from_data(b"hello world"));
        assert_eq!(obj.data(), b"hello world");
        assert_eq!(obj.len(), 11);
    }

    #[test]
    fn empty_object() {
        let obj = Object::new(Vec::new());
        assert!(obj.is_empty());
        assert_eq!(*obj.id(), ObjectId::from_data(b""));
    }

    #[test]
    fn into_data_returns_original_bytes() {
        let obj = Object::new(b"payload".to_vec());
        assert_eq!(obj.into_data(), b"payload".to_vec());
    }
}
