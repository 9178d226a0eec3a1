//! Error types for the quorum coordinator.

/// Errors that can occur while collecting signature shares.
#[derive(Debug, thiserror::Error)]
pub enum QuorumError {
    /// No session is open for the given checkpoint.
    #[error("no signing session for checkpoint at size {0}")]
    UnknownSession(u64),

    /// The session's collection deadline has passed.
    #[error("signing session for checkpoint at size {0} has expired")]
    SessionExpired(u64),

    /// The share came from a signer index not in the roster.
    #[error("signer {0} is not in the signer roster")]
    UnknownSigner(u16),

    /// The share failed verification against the signer's public share.
    #[error("share from signer {0} failed verification")]
    InvalidShare(u16),

    /// Threshold cryptography error.
    #[error(transparent)]
    Crypto(#[from] tessera_crypto::CryptoError),
}
