//! JSON wire types for the public HTTP API.
//!
//! Shared between the daemon's HTTP handlers and the audit client. Hashes
//! and signatures cross the HTTP boundary hex-encoded so responses stay
//! readable and copy-pasteable.

use serde::{Deserialize, Serialize};
use tessera_merkle::InclusionProof;
use tessera_types::{CheckpointHead, SignatureBytes, SignedCheckpoint};

use crate::error::AuditError;

fn decode_hex32(field: &str, s: &str) -> Result<[u8; 32], AuditError> {
    let bytes = hex::decode(s).map_err(|e| AuditError::Encoding(format!("{field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| AuditError::Encoding(format!("{field}: expected 32 bytes")))
}

fn decode_hex96(field: &str, s: &str) -> Result<[u8; 96], AuditError> {
    let bytes = hex::decode(s).map_err(|e| AuditError::Encoding(format!("{field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| AuditError::Encoding(format!("{field}: expected 96 bytes")))
}

/// Body of `POST /log/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    /// Event classification.
    pub event_type: String,
    /// Event payload as a JSON string; its UTF-8 bytes are what the log
    /// commits to.
    pub payload: String,
    /// Caller-chosen deduplication key.
    pub idempotency_key: String,
}

/// An inclusion proof on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofDto {
    pub leaf_index: u64,
    pub tree_size: u64,
    /// Sibling hashes, leaf to root, hex-encoded.
    pub path: Vec<String>,
}

impl From<&InclusionProof> for ProofDto {
    fn from(proof: &InclusionProof) -> Self {
        Self {
            leaf_index: proof.leaf_index,
            tree_size: proof.tree_size,
            path: proof.path.iter().map(hex::encode).collect(),
        }
    }
}

impl ProofDto {
    /// Decode into the verifiable form.
    pub fn decode(&self) -> Result<InclusionProof, AuditError> {
        let mut path = Vec::with_capacity(self.path.len());
        for s in &self.path {
            path.push(decode_hex32("proof.path", s)?);
        }
        Ok(InclusionProof {
            leaf_index: self.leaf_index,
            tree_size: self.tree_size,
            path,
        })
    }
}

/// Response of `POST /log/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    pub leaf_index: u64,
    pub tree_size: u64,
    /// Root the proof targets, hex-encoded.
    pub root_hash: String,
    pub proof: ProofDto,
}

/// A signed checkpoint on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDto {
    pub root_hash: String,
    pub tree_size: u64,
    pub timestamp: u64,
    /// Combined BLS signature, hex-encoded.
    pub signature: String,
    pub signer_set: Vec<u16>,
}

impl From<&SignedCheckpoint> for CheckpointDto {
    fn from(cp: &SignedCheckpoint) -> Self {
        Self {
            root_hash: hex::encode(cp.head.root_hash),
            tree_size: cp.head.tree_size,
            timestamp: cp.head.timestamp,
            signature: hex::encode(cp.signature.to_bytes()),
            signer_set: cp.signer_set.clone(),
        }
    }
}

impl CheckpointDto {
    /// Decode into the verifiable form.
    pub fn decode(&self) -> Result<SignedCheckpoint, AuditError> {
        Ok(SignedCheckpoint {
            head: CheckpointHead {
                root_hash: decode_hex32("checkpoint.root_hash", &self.root_hash)?,
                tree_size: self.tree_size,
                timestamp: self.timestamp,
            },
            signature: SignatureBytes::new(decode_hex96(
                "checkpoint.signature",
                &self.signature,
            )?),
            signer_set: self.signer_set.clone(),
        })
    }
}

/// A log entry's committed fields on the wire.
///
/// Carries everything needed to recompute the Merkle leaf hash without
/// trusting the server: the canonical leaf encoding is fixed-width fields
/// plus a length-prefixed event type, hashed with the leaf domain prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDto {
    pub index: u64,
    pub timestamp: u64,
    pub event_type: String,
    /// BLAKE3 hash of the payload, hex-encoded.
    pub payload_hash: String,
    /// Content address of the archived payload, hex-encoded.
    pub payload_ref: String,
}

impl EntryDto {
    /// Recompute the Merkle leaf hash from the committed fields.
    pub fn leaf_hash(&self) -> Result<[u8; 32], AuditError> {
        let payload_hash = decode_hex32("entry.payload_hash", &self.payload_hash)?;
        let payload_ref = decode_hex32("entry.payload_ref", &self.payload_ref)?;
        let mut data = Vec::with_capacity(84 + self.event_type.len());
        data.extend_from_slice(&self.index.to_be_bytes());
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        data.extend_from_slice(&(self.event_type.len() as u32).to_be_bytes());
        data.extend_from_slice(self.event_type.as_bytes());
        data.extend_from_slice(&payload_hash);
        data.extend_from_slice(&payload_ref);
        Ok(tessera_merkle::leaf_hash(&data))
    }
}

/// Response of `GET /log/proof/{leaf_index}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofResponse {
    pub entry: EntryDto,
    pub proof: ProofDto,
    /// The latest signed checkpoint covering the leaf.
    pub checkpoint: CheckpointDto,
}

/// Response of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// This node's peer ID, hex-encoded.
    pub peer_id: String,
    /// Current number of log leaves.
    pub tree_size: u64,
    /// Latest signed checkpoint, if any has been produced.
    pub latest_checkpoint: Option<CheckpointDto>,
    /// Number of peers in the routing table.
    pub peer_count: usize,
}
