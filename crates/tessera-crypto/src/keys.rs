//! Trusted-dealer key generation and Shamir share handling.
//!
//! The dealer samples a random degree `t-1` polynomial over the BLS12-381
//! scalar field. The constant term is the group secret; signer `i` receives
//! the evaluation at `x = i` (indices start at 1, zero is the group secret
//! itself and must never be an evaluation point).

use blst::min_pk::{PublicKey, SecretKey};
use blst::{
    blst_bendian_from_scalar, blst_fr, blst_fr_add, blst_fr_from_scalar, blst_fr_from_uint64,
    blst_fr_mul, blst_scalar, blst_scalar_from_bendian, blst_scalar_from_fr,
};
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::sign::PartialSignature;
use crate::DST;

// ---------------------------------------------------------------------------
// Scalar field helpers
// ---------------------------------------------------------------------------

/// Lift a small integer into the scalar field.
pub(crate) fn fr_from_u64(x: u64) -> blst_fr {
    let limbs = [x, 0, 0, 0];
    let mut out = blst_fr::default();
    unsafe { blst_fr_from_uint64(&mut out, limbs.as_ptr()) };
    out
}

/// Sample a uniformly random nonzero field element.
///
/// Routed through `SecretKey::key_gen` so the reduction from raw entropy to
/// a canonical scalar is blst's own, not ours.
fn random_fr(rng: &mut impl RngCore) -> Result<blst_fr, CryptoError> {
    let mut ikm = [0u8; 32];
    rng.fill_bytes(&mut ikm);
    let sk = SecretKey::key_gen(&ikm, &[]).map_err(|_| CryptoError::InvalidSecretShare)?;
    ikm.zeroize();

    let mut bytes = sk.to_bytes();
    let mut scalar = blst_scalar::default();
    let mut out = blst_fr::default();
    unsafe {
        blst_scalar_from_bendian(&mut scalar, bytes.as_ptr());
        blst_fr_from_scalar(&mut out, &scalar);
    }
    bytes.zeroize();
    Ok(out)
}

/// Evaluate the dealer polynomial at `x` by Horner's rule.
///
/// `coeffs[0]` is the constant term.
fn eval_poly(coeffs: &[blst_fr], x: &blst_fr) -> blst_fr {
    let mut acc = coeffs[coeffs.len() - 1];
    for coeff in coeffs.iter().rev().skip(1) {
        let mut tmp = blst_fr::default();
        unsafe {
            blst_fr_mul(&mut tmp, &acc, x);
            blst_fr_add(&mut acc, &tmp, coeff);
        }
    }
    acc
}

/// Convert a field element into a usable signing key.
fn secret_key_from_fr(fr: &blst_fr) -> Result<SecretKey, CryptoError> {
    let mut scalar = blst_scalar::default();
    let mut bytes = [0u8; 32];
    unsafe {
        blst_scalar_from_fr(&mut scalar, fr);
        blst_bendian_from_scalar(bytes.as_mut_ptr(), &scalar);
    }
    let sk = SecretKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidSecretShare);
    bytes.zeroize();
    sk
}

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// The fixed public key the combined threshold signature verifies against.
#[derive(Debug, Clone)]
pub struct GroupPublicKey {
    key: PublicKey,
}

impl GroupPublicKey {
    /// Verify a combined threshold signature over `msg`.
    pub fn verify(&self, msg: &[u8], sig: &crate::sign::ThresholdSignature) -> bool {
        sig.as_inner().verify(true, msg, DST, &[], &self.key, true)
            == blst::BLST_ERROR::BLST_SUCCESS
    }

    /// Compressed 48-byte encoding.
    pub fn to_bytes(&self) -> [u8; 48] {
        self.key.to_bytes()
    }

    /// Decode from the compressed 48-byte encoding, rejecting points off the
    /// curve or outside the prime-order subgroup.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = PublicKey::key_validate(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { key })
    }
}

impl PartialEq for GroupPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for GroupPublicKey {}

/// A signer's public verification key for its partial signatures.
#[derive(Debug, Clone)]
pub struct PublicShare {
    signer: u16,
    key: PublicKey,
}

impl PublicShare {
    /// The signer index this share belongs to (1-based).
    pub fn signer(&self) -> u16 {
        self.signer
    }

    /// Check that `partial` is this signer's signature over `msg`.
    ///
    /// Also rejects partials claiming a different signer index, so a share
    /// can never be counted toward the wrong slot.
    pub fn verify(&self, msg: &[u8], partial: &PartialSignature) -> bool {
        partial.signer == self.signer
            && partial.as_inner().verify(true, msg, DST, &[], &self.key, true)
                == blst::BLST_ERROR::BLST_SUCCESS
    }

    /// Compressed 48-byte encoding of the verification key.
    pub fn to_bytes(&self) -> [u8; 48] {
        self.key.to_bytes()
    }

    /// Decode a verification key for signer `signer`.
    pub fn from_bytes(signer: u16, bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = PublicKey::key_validate(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { signer, key })
    }
}

/// A signer's secret Shamir share.
pub struct SecretShare {
    signer: u16,
    key: SecretKey,
}

impl SecretShare {
    /// The signer index this share belongs to (1-based).
    pub fn signer(&self) -> u16 {
        self.signer
    }

    /// Produce a partial signature over `msg`.
    pub fn sign(&self, msg: &[u8]) -> PartialSignature {
        PartialSignature {
            signer: self.signer,
            sig: self.key.sign(msg, DST, &[]),
        }
    }

    /// The verification key matching this share.
    pub fn public_share(&self) -> PublicShare {
        PublicShare {
            signer: self.signer,
            key: self.key.sk_to_pk(),
        }
    }

    /// Big-endian 32-byte scalar encoding. Handle with care.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Decode a share for signer `signer` from its 32-byte scalar encoding.
    pub fn from_bytes(signer: u16, bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = SecretKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidSecretShare)?;
        Ok(Self { signer, key })
    }
}

// SecretKey zeroizes itself on drop; only the index remains here.
impl std::fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretShare")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Dealer
// ---------------------------------------------------------------------------

/// Everything the trusted dealer hands out for one signer set.
pub struct DealerOutput {
    /// The group verification key. Published.
    pub group_key: GroupPublicKey,
    /// Per-signer verification keys, ordered by signer index. Published.
    pub public_shares: Vec<PublicShare>,
    /// Per-signer secret shares, ordered by signer index. Distribute over a
    /// secure channel and discard.
    pub secret_shares: Vec<SecretShare>,
}

/// Split a fresh group secret into `n` shares with threshold `t`.
///
/// Signer indices are `1..=n`. Any `t` of the returned shares reconstruct a
/// signature under `group_key`; `t - 1` reveal nothing.
pub fn generate_shares(
    n: u16,
    t: u16,
    rng: &mut impl RngCore,
) -> Result<DealerOutput, CryptoError> {
    if t == 0 || n == 0 || t > n {
        return Err(CryptoError::InvalidParameters { t, n });
    }

    let mut coeffs = Vec::with_capacity(t as usize);
    for _ in 0..t {
        coeffs.push(random_fr(rng)?);
    }

    let group_secret = secret_key_from_fr(&coeffs[0])?;
    let group_key = GroupPublicKey {
        key: group_secret.sk_to_pk(),
    };

    let mut secret_shares = Vec::with_capacity(n as usize);
    let mut public_shares = Vec::with_capacity(n as usize);
    for i in 1..=n {
        let x = fr_from_u64(u64::from(i));
        let eval = eval_poly(&coeffs, &x);
        let key = secret_key_from_fr(&eval)?;
        public_shares.push(PublicShare {
            signer: i,
            key: key.sk_to_pk(),
        });
        secret_shares.push(SecretShare { signer: i, key });
    }

    Ok(DealerOutput {
        group_key,
        public_shares,
        secret_shares,
    })
}
