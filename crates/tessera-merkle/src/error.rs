//! Error types for the Merkle tree crate.

/// Errors that can occur during Merkle tree operations.
#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    /// The requested leaf index or tree size is not covered by this tree.
    ///
    /// Also returned for root queries on an empty tree (size 0 has no root).
    #[error("not found: requested {requested}, tree size {size}")]
    NotFound {
        /// Leaf index or tree size that was asked for.
        requested: u64,
        /// Current number of leaves.
        size: u64,
    },
}
