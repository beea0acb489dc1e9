use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;

/// Keys are opaque byte strings; the engine only compares them.
pub type Key = Vec<u8>;

/// Sync hint for how aggressively a referenced value must be fetched.
///
/// `Eager` values travel with their commit; `Lazy` values are fetched on
/// demand. The storage engine records the priority but never acts on it --
/// it is consumed by the sync layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPriority {
    /// The value must be fetched together with its commit.
    Eager,
    /// The value may be fetched on first access.
    Lazy,
}

impl fmt::Display for KeyPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager => write!(f, "eager"),
            Self::Lazy => write!(f, "lazy"),
        }
    }
}

/// A single key/value pair in a committed tree.
///
/// The value is stored by reference: `value_id` addresses an object in the
/// page's object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque key bytes.
    pub key: Key,
    /// Content-addressed reference to the value object.
    pub value_id: ObjectId,
    /// Sync priority of the referenced value.
    pub priority: KeyPriority,
}

impl Entry {
    /// Create a new entry.
    pub fn new(key: impl Into<Key>, value_id: ObjectId, priority: KeyPriority) -> Self {
        Self {
            key: key.into(),
            value_id,
            priority,
        }
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_order_by_key() {
        let a = Entry::new(b"alpha".to_vec(), ObjectId::from_data(b"v1"), KeyPriority::Eager);
        let b = Entry::new(b"beta".to_vec(), ObjectId::from_data(b"v2"), KeyPriority::Lazy);
        assert!(a < b);

        let mut entries = vec![b.clone(), a.clone()];
        entries.sort();
        assert_eq!(entries, vec![a, b]);
    }

    #[test]
    fn priority_display() {
        assert_eq!(format!("{}", KeyPriority::Eager), "eager");
        assert_eq!(format!("{}", KeyPriority::Lazy), "lazy");
    }

    #[test]
    fn serde_roundtrip() {
        let entry = Entry::new(b"key".to_vec(), ObjectId::from_data(b"value"), KeyPriority::Lazy);
        let bytes = bincode::serialize(&entry).unwrap();
        let parsed: Entry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(entry, parsed);
    }
}
