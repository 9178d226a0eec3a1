//! Error types for the transparency log.

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The submitted event failed schema or size validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested entry or checkpoint does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A checkpoint's root could not be reproduced from the local tree.
    #[error("checkpoint root for size {tree_size} does not match the local tree")]
    RootMismatch {
        /// Tree size of the offending checkpoint.
        tree_size: u64,
    },

    /// Merkle tree error.
    #[error(transparent)]
    Merkle(#[from] tessera_merkle::MerkleError),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<postcard::Error> for LogError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
