use kvl_store::StoreError;

/// Errors from tree construction and traversal.
#[derive(Debug, thiserror::Error)]
pub enum BTreeError {
    /// The addressed child slot is empty.
    ///
    /// Distinct from a missing object: the node exists, the slot does not
    /// reference anything. Traversal code branches on this.
    #[error("tree node child slot {0} is empty")]
    NoSuchChild(usize),

    /// A serialized node could not be decoded, or violates node invariants.
    #[error("malformed tree node: {0}")]
    Format(String),

    /// Failure in the underlying object store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A construction invariant was violated.
    #[error("tree invariant violated: {0}")]
    Internal(String),
}

/// Result alias for tree operations.
pub type BTreeResult<T> = Result<T, BTreeError>;
