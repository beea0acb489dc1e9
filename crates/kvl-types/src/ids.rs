use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TypeError;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the SHA-256 hash of the object's bytes. Identical content
/// always produces the same `ObjectId`, so the id doubles as an integrity
/// check: reading an object back and re-hashing it must reproduce the id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Width of an id in bytes (raw SHA-256 output).
    pub const LEN: usize = 32;

    /// Compute the id of the given bytes.
    pub fn from_data(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation, used for filesystem paths.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_hash(s).map(Self)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for ObjectId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Identifier of a commit: the SHA-256 of its canonical serialization.
///
/// A distinct type from [`ObjectId`] so that commit references and object
/// references cannot be mixed up, even though both are 32-byte hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId([u8; 32]);

impl CommitId {
    /// Width of an id in bytes (raw SHA-256 output).
    pub const LEN: usize = 32;

    /// Compute the id of the given canonical commit bytes.
    pub fn from_data(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation, used for filesystem paths.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_hash(s).map(Self)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short_hex())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for CommitId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

fn decode_hash(s: &str) -> Result<[u8; 32], TypeError> {
    let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(TypeError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Opaque identifier of a page, supplied by the caller at construction.
///
/// The engine never interprets the contents; it is carried around so that
/// observers and logs can tell pages apart.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(Vec<u8>);

impl PageId {
    /// Wrap raw page id bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw id bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.to_hex())
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<Vec<u8>> for PageId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_is_sha256_of_data() {
        // SHA-256("Some data"), independently computed.
        let expected = "1fe638b478f8f0b2c2aab3dbfd3f05d6dfe2191cd7b4482241fe58567e37aef6";
        let id = ObjectId::from_data(b"Some data");
        assert_eq!(id.to_hex(), expected);
    }

    #[test]
    fn from_data_is_deterministic() {
        let id1 = ObjectId::from_data(b"hello world");
        let id2 = ObjectId::from_data(b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_data_produces_different_ids() {
        assert_ne!(ObjectId::from_data(b"hello"), ObjectId::from_data(b"world"));
    }

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::from_data(b"test");
        let parsed = ObjectId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(matches!(
            ObjectId::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
        assert!(matches!(
            ObjectId::from_hex("abcd"),
            Err(TypeError::InvalidLength {
                expected: 32,
                actual: 2
            })
        ));
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(ObjectId::from_data(b"test").short_hex().len(), 8);
    }

    #[test]
    fn display_is_full_lowercase_hex() {
        let id = CommitId::from_data(b"test");
        let display = format!("{id}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, display.to_lowercase());
    }

    #[test]
    fn commit_and_object_ids_are_distinct_types_with_equal_hashing() {
        let oid = ObjectId::from_data(b"same bytes");
        let cid = CommitId::from_data(b"same bytes");
        assert_eq!(oid.as_bytes(), cid.as_bytes());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let id1 = CommitId::from_hash([0; 32]);
        let id2 = CommitId::from_hash([1; 32]);
        assert!(id1 < id2);
    }

    #[test]
    fn page_id_roundtrip() {
        let page = PageId::new(b"page-0001".to_vec());
        assert_eq!(page.as_bytes(), b"page-0001");
        assert_eq!(page.to_hex(), hex::encode(b"page-0001"));
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::from_data(b"serde test");
        let bytes = bincode::serialize(&id).unwrap();
        let parsed: ObjectId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, parsed);
    }
}
