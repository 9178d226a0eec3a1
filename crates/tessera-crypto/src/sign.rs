//! Partial signatures and Lagrange combination.
//!
//! Combination happens in the exponent: each partial signature is a G2 point
//! `H(msg)^{f(x_i)}`; scaling partial `i` by the Lagrange basis coefficient
//! `λ_i` evaluated at zero and summing yields `H(msg)^{f(0)}`, the signature
//! under the group secret.

use blst::min_pk::Signature;
use blst::{
    blst_fr, blst_fr_inverse, blst_fr_mul, blst_fr_sub, blst_p2, blst_p2_add_or_double,
    blst_p2_affine, blst_p2_compress, blst_p2_from_affine, blst_p2_mult, blst_p2_uncompress,
    blst_scalar, blst_scalar_from_fr, BLST_ERROR,
};

use crate::error::CryptoError;
use crate::keys::fr_from_u64;

/// One signer's contribution toward a threshold signature.
#[derive(Debug, Clone)]
pub struct PartialSignature {
    /// The contributing signer's index (1-based).
    pub signer: u16,
    pub(crate) sig: Signature,
}

impl PartialSignature {
    pub(crate) fn as_inner(&self) -> &Signature {
        &self.sig
    }

    /// Compressed 96-byte encoding.
    pub fn to_bytes(&self) -> [u8; 96] {
        self.sig.to_bytes()
    }

    /// Decode a partial signature attributed to `signer`.
    pub fn from_bytes(signer: u16, bytes: &[u8]) -> Result<Self, CryptoError> {
        let sig = Signature::from_bytes(bytes).map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self { signer, sig })
    }
}

/// A combined signature that verifies against the group public key.
#[derive(Debug, Clone)]
pub struct ThresholdSignature {
    sig: Signature,
}

impl ThresholdSignature {
    pub(crate) fn as_inner(&self) -> &Signature {
        &self.sig
    }

    /// Compressed 96-byte encoding.
    pub fn to_bytes(&self) -> [u8; 96] {
        self.sig.to_bytes()
    }

    /// Decode from the compressed 96-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let sig = Signature::from_bytes(bytes).map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self { sig })
    }
}

/// Combine at least `threshold` distinct partial signatures.
///
/// The caller is expected to have verified each partial against its signer's
/// public share; combination itself cannot tell a forged partial from a
/// genuine one.
pub fn combine(
    partials: &[PartialSignature],
    threshold: usize,
) -> Result<ThresholdSignature, CryptoError> {
    check_distinct(partials)?;
    if partials.len() < threshold {
        return Err(CryptoError::BelowThreshold {
            got: partials.len(),
            threshold,
        });
    }
    interpolate(partials)
}

/// Lagrange-interpolate a set of distinct partials without a threshold check.
///
/// With fewer shares than the dealer's threshold this produces a well-formed
/// point that fails verification, never a panic.
pub fn interpolate(partials: &[PartialSignature]) -> Result<ThresholdSignature, CryptoError> {
    check_distinct(partials)?;

    let mut acc: Option<blst_p2> = None;
    for (i, partial) in partials.iter().enumerate() {
        let lambda = lagrange_coeff_at_zero(partials, i);
        let mut scalar = blst_scalar::default();
        unsafe { blst_scalar_from_fr(&mut scalar, &lambda) };

        let mut affine = blst_p2_affine::default();
        let err = unsafe { blst_p2_uncompress(&mut affine, partial.to_bytes().as_ptr()) };
        if err != BLST_ERROR::BLST_SUCCESS {
            return Err(CryptoError::InvalidSignature);
        }
        let mut point = blst_p2::default();
        let mut term = blst_p2::default();
        unsafe {
            blst_p2_from_affine(&mut point, &affine);
            blst_p2_mult(&mut term, &point, scalar.b.as_ptr(), 255);
        }

        acc = Some(match acc {
            None => term,
            Some(prev) => {
                let mut sum = blst_p2::default();
                unsafe { blst_p2_add_or_double(&mut sum, &prev, &term) };
                sum
            }
        });
    }

    let combined = acc.ok_or(CryptoError::EmptyShareSet)?;
    let mut compressed = [0u8; 96];
    unsafe { blst_p2_compress(compressed.as_mut_ptr(), &combined) };

    let sig = Signature::from_bytes(&compressed).map_err(|_| CryptoError::InvalidSignature)?;
    Ok(ThresholdSignature { sig })
}

/// Lagrange basis coefficient for `partials[i]` evaluated at zero:
/// `λ_i = Π_{j≠i} x_j / (x_j - x_i)`.
///
/// Indices are distinct by the time this runs, so no denominator is zero.
fn lagrange_coeff_at_zero(partials: &[PartialSignature], i: usize) -> blst_fr {
    let x_i = fr_from_u64(u64::from(partials[i].signer));
    let mut num = fr_from_u64(1);
    let mut den = fr_from_u64(1);
    for (j, other) in partials.iter().enumerate() {
        if j == i {
            continue;
        }
        let x_j = fr_from_u64(u64::from(other.signer));
        let mut diff = blst_fr::default();
        let mut tmp = blst_fr::default();
        unsafe {
            blst_fr_mul(&mut tmp, &num, &x_j);
            num = tmp;
            blst_fr_sub(&mut diff, &x_j, &x_i);
            blst_fr_mul(&mut tmp, &den, &diff);
            den = tmp;
        }
    }
    let mut inv = blst_fr::default();
    let mut out = blst_fr::default();
    unsafe {
        blst_fr_inverse(&mut inv, &den);
        blst_fr_mul(&mut out, &num, &inv);
    }
    out
}

fn check_distinct(partials: &[PartialSignature]) -> Result<(), CryptoError> {
    if partials.is_empty() {
        return Err(CryptoError::EmptyShareSet);
    }
    let mut seen = Vec::with_capacity(partials.len());
    for partial in partials {
        if seen.contains(&partial.signer) {
            return Err(CryptoError::DuplicateSigner(partial.signer));
        }
        seen.push(partial.signer);
    }
    Ok(())
}
