//! Error types for the distributed value store.

use tessera_types::RecordId;

/// Errors that can occur during DHT operations.
#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    /// The offered key is not the content address of the value.
    #[error("key mismatch: value hashes to {actual}, not {provided}")]
    KeyMismatch {
        /// The key the caller provided.
        provided: RecordId,
        /// The hash the value actually has.
        actual: RecordId,
    },

    /// Retrieved bytes no longer hash to the requested key.
    #[error("integrity error for {expected}: retrieved bytes hash to {actual}")]
    IntegrityError {
        /// The requested key.
        expected: RecordId,
        /// The hash of the bytes that came back.
        actual: RecordId,
    },

    /// The value could not be found locally or on any reachable peer.
    #[error("value not found: {0}")]
    NotFound(RecordId),

    /// Fewer replicas acknowledged the write than a majority requires.
    #[error("replication failed: {acks} acks, needed {needed}")]
    ReplicationFailed {
        /// Peers that acknowledged the store.
        acks: usize,
        /// Majority threshold over the replica set.
        needed: usize,
    },

    /// Local storage error.
    #[error(transparent)]
    Store(#[from] tessera_store::StoreError),

    /// Network error.
    #[error(transparent)]
    Net(#[from] tessera_net::NetError),
}
