//! BLS12-381 threshold signatures on [`blst`] (min_pk: 48-byte public keys,
//! 96-byte signatures in G2).
//!
//! A trusted dealer splits one group secret into `n` Shamir shares with
//! reconstruction threshold `t`. Each signer produces a partial signature
//! with its share; any `t` distinct partials combine — by Lagrange
//! interpolation in the exponent — into one signature that verifies against
//! the fixed group public key. Fewer than `t` partials interpolate to a
//! point that fails verification.
//!
//! Partial signatures are individually verifiable against the signer's
//! public share, so invalid contributions are rejected before they can
//! affect a quorum count.

mod error;
mod keys;
mod sign;

pub use error::CryptoError;
pub use keys::{generate_shares, DealerOutput, GroupPublicKey, PublicShare, SecretShare};
pub use sign::{combine, interpolate, PartialSignature, ThresholdSignature};

/// Domain separation tag for BLS signatures (Ethereum 2.0 compatible).
pub(crate) const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";
