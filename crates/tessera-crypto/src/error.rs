//! Error types for threshold-signature operations.

/// Errors that can occur during threshold key or signature operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Dealer parameters are unusable (t = 0, n = 0, or t > n).
    #[error("invalid threshold parameters: t={t} n={n}")]
    InvalidParameters {
        /// Requested threshold.
        t: u16,
        /// Requested signer count.
        n: u16,
    },

    /// A secret share did not decode to a valid nonzero scalar.
    #[error("invalid secret share encoding")]
    InvalidSecretShare,

    /// A public key did not decode to a valid curve point.
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    /// A signature did not decode to a valid curve point.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// The same signer index appeared more than once in a combination set.
    #[error("duplicate signer index {0} in share set")]
    DuplicateSigner(u16),

    /// Fewer distinct shares than the threshold requires.
    #[error("cannot combine {got} shares: threshold is {threshold}")]
    BelowThreshold {
        /// Distinct shares supplied.
        got: usize,
        /// Required threshold.
        threshold: usize,
    },

    /// No shares supplied at all.
    #[error("empty share set")]
    EmptyShareSet,
}
