use kvl_btree::BTreeError;
use kvl_store::StoreError;

/// Unified error surface of the page storage engine.
///
/// Lower layers report their own error types; everything crossing the
/// public page surface is folded into this taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// An addressed object, commit, or parent is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A tree-node child slot is empty (distinct from a missing object).
    #[error("tree node child slot {0} is empty")]
    NoSuchChild(usize),

    /// The operation is invalid in the journal's or page's current state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// Underlying storage failure, including stream length mismatches.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialized commit or tree node is corrupt.
    #[error("malformed record: {0}")]
    Format(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for page operations.
pub type PageResult<T> = Result<T, PageError>;

impl From<StoreError> for PageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(format!("object {id}")),
            StoreError::HashMismatch { .. } => Self::Format(err.to_string()),
            StoreError::SizeMismatch { .. } => Self::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err.to_string(),
            )),
            StoreError::Io(e) => Self::Io(e),
        }
    }
}

impl From<BTreeError> for PageError {
    fn from(err: BTreeError) -> Self {
        match err {
            BTreeError::NoSuchChild(index) => Self::NoSuchChild(index),
            BTreeError::Format(msg) => Self::Format(msg),
            BTreeError::Store(e) => e.into(),
            BTreeError::Internal(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvl_types::ObjectId;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: PageError = StoreError::NotFound(ObjectId::from_data(b"x")).into();
        assert!(matches!(err, PageError::NotFound(_)));
    }

    #[test]
    fn store_size_mismatch_maps_to_io() {
        let err: PageError = StoreError::SizeMismatch {
            expected: 123,
            actual: 9,
        }
        .into();
        assert!(matches!(err, PageError::Io(_)));
    }

    #[test]
    fn store_hash_mismatch_maps_to_format() {
        let id = ObjectId::from_data(b"x");
        let err: PageError = StoreError::HashMismatch { id, computed: id }.into();
        assert!(matches!(err, PageError::Format(_)));
    }

    #[test]
    fn btree_no_such_child_is_preserved() {
        let err: PageError = BTreeError::NoSuchChild(3).into();
        assert!(matches!(err, PageError::NoSuchChild(3)));
    }
}
