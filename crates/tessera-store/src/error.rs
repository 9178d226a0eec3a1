//! Error types for record storage operations.

use tessera_types::RecordId;

/// Errors that can occur during record storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// I/O error (e.g. from Fjall guard operations).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] postcard::Error),

    /// Record bytes on disk no longer hash to the content address.
    ///
    /// The record is withheld from the caller and reported so replicas can
    /// re-supply it.
    #[error("record corruption detected: expected {expected}, actual hash {actual}")]
    Corrupt {
        /// The ID that was requested.
        expected: RecordId,
        /// The ID computed from the bytes actually stored.
        actual: RecordId,
    },
}
