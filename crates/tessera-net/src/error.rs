//! Error types for network operations.

use tessera_types::{PeerId, RecordId};

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to connect to a remote endpoint.
    #[error("connection error: {0}")]
    Connect(String),

    /// A QUIC connection error.
    #[error("connection error: {0}")]
    Connection(#[from] iroh::endpoint::ConnectionError),

    /// Failed to open a stream.
    #[error("stream open error: {0}")]
    StreamOpen(String),

    /// Error writing to a stream.
    #[error("write error: {0}")]
    Write(#[from] iroh::endpoint::WriteError),

    /// Stream was already closed when trying to finish.
    #[error("stream closed: {0}")]
    ClosedStream(#[from] iroh::endpoint::ClosedStream),

    /// Error reading from a stream.
    #[error("read error: {0}")]
    ReadToEnd(#[from] iroh::endpoint::ReadToEndError),

    /// Error reading exact bytes.
    #[error("read exact error: {0}")]
    ReadExact(#[from] iroh::endpoint::ReadExactError),

    /// Serialization or deserialization failed, or the peer responded with
    /// an unexpected message type.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record data integrity check failed: blake3 hash mismatch.
    #[error("integrity check failed for record {expected}: actual hash {actual}")]
    IntegrityFailure {
        /// The expected record ID.
        expected: RecordId,
        /// The actual hash of the received data.
        actual: RecordId,
    },

    /// The remote endpoint was not found or unreachable.
    #[error("endpoint error: {0}")]
    Endpoint(String),

    /// No known endpoint for the given peer.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// The peer explicitly rejected the request.
    #[error("request rejected by peer")]
    Rejected,
}
