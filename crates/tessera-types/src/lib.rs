//! Shared types and identifiers for Tessera.
//!
//! This crate defines the core types used across the Tessera workspace:
//! identifiers ([`RecordId`], [`PeerId`]), the checkpoint data model
//! ([`CheckpointHead`], [`SignedCheckpoint`]), and the cluster event enum
//! ([`NodeEvent`]).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

mod events;

pub use events::NodeEvent;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Content-addressed identifier for a stored value: `blake3(value)`.
    ///
    /// Also used for event payload hashes — the payload reference in a log
    /// entry is the content address under which the payload lives in the
    /// distributed store.
    RecordId
);

define_id!(
    /// Identifier for a cluster node, derived from its iroh endpoint key.
    PeerId
);

impl PeerId {
    /// XOR distance between two peer IDs (Kademlia metric).
    pub fn distance(&self, other: &PeerId) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        out
    }
}

impl From<RecordId> for PeerId {
    /// Reinterpret a content address as a point in the routing keyspace.
    ///
    /// DHT keys and peer IDs share the same 256-bit XOR metric space.
    fn from(id: RecordId) -> Self {
        PeerId(id.0)
    }
}

// ---------------------------------------------------------------------------
// Checkpoint data model
// ---------------------------------------------------------------------------

/// The signed portion of a checkpoint: a snapshot of the log at a point in
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHead {
    /// Merkle root over exactly `tree_size` leaves.
    pub root_hash: [u8; 32],
    /// Number of leaves covered by `root_hash`.
    pub tree_size: u64,
    /// Unix timestamp (seconds) when the snapshot was taken.
    pub timestamp: u64,
}

impl CheckpointHead {
    /// Canonical byte encoding that signers sign: fixed-width
    /// `root_hash (32) || tree_size (8, BE) || timestamp (8, BE)`.
    ///
    /// Fixed-width so external verifiers can reproduce it without a Rust
    /// serializer. Any change here invalidates existing signatures.
    pub fn signing_bytes(&self) -> [u8; 48] {
        let mut out = [0u8; 48];
        out[..32].copy_from_slice(&self.root_hash);
        out[32..40].copy_from_slice(&self.tree_size.to_be_bytes());
        out[40..48].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }
}

/// A 96-byte BLS12-381 signature, stored as three 32-byte chunks for serde
/// compatibility (serde doesn't derive for `[u8; 96]` out of the box).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBytes {
    chunks: [[u8; 32]; 3],
}

impl SignatureBytes {
    /// Wrap a raw 96-byte compressed signature.
    pub fn new(bytes: [u8; 96]) -> Self {
        let mut chunks = [[0u8; 32]; 3];
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.copy_from_slice(&bytes[i * 32..(i + 1) * 32]);
        }
        Self { chunks }
    }

    /// Reconstruct the raw 96-byte form.
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        for (i, chunk) in self.chunks.iter().enumerate() {
            out[i * 32..(i + 1) * 32].copy_from_slice(chunk);
        }
        out
    }
}

/// A checkpoint carrying a valid threshold signature.
///
/// Immutable once produced. `signer_set` records which signer indices
/// contributed shares; verification only needs the group public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCheckpoint {
    /// The signed snapshot.
    pub head: CheckpointHead,
    /// Combined BLS threshold signature over the canonical head encoding.
    pub signature: SignatureBytes,
    /// Indices of the signers whose shares were combined.
    pub signer_set: Vec<u16>,
}

impl SignedCheckpoint {
    /// Check the threshold signature against the group public key.
    pub fn verify(&self, group_key: &tessera_crypto::GroupPublicKey) -> bool {
        match tessera_crypto::ThresholdSignature::from_bytes(&self.signature.to_bytes()) {
            Ok(sig) => group_key.verify(&self.head.signing_bytes(), &sig),
            Err(_) => false,
        }
    }
}

/// Unix timestamp in seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
