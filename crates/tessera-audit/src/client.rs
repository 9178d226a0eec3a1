//! HTTP client for fetching checkpoints and proofs from a log node.

use serde::de::DeserializeOwned;
use tessera_crypto::GroupPublicKey;
use tessera_merkle::{verify_proof, InclusionProof};
use tessera_types::SignedCheckpoint;
use tracing::debug;

use crate::api::{AppendRequest, AppendResponse, CheckpointDto, EntryDto, ProofResponse, StatusResponse};
use crate::error::AuditError;

type Result<T> = std::result::Result<T, AuditError>;

/// Everything fetched for one leaf: the entry's committed fields, its
/// inclusion proof, and the signed checkpoint the proof targets.
#[derive(Debug, Clone)]
pub struct ProofBundle {
    pub entry: EntryDto,
    pub proof: InclusionProof,
    pub checkpoint: SignedCheckpoint,
}

/// Client for a log node's public HTTP API.
///
/// Fetches are untrusted: everything returned is decoded and then checked
/// with [`verify`] against the group public key, which is the only thing
/// the auditor has to hold out of band.
pub struct AuditClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuditClient {
    /// Create a client for the node at `base_url` (e.g. `http://host:8080`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// The normalized base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the most recent signed checkpoint.
    pub async fn fetch_latest_checkpoint(&self) -> Result<SignedCheckpoint> {
        let dto: CheckpointDto = self.get_json("/log/checkpoints/latest").await?;
        dto.decode()
    }

    /// Fetch the signed checkpoint at an exact tree size.
    pub async fn fetch_checkpoint(&self, tree_size: u64) -> Result<SignedCheckpoint> {
        let dto: CheckpointDto = self
            .get_json(&format!("/log/checkpoints/{tree_size}"))
            .await?;
        dto.decode()
    }

    /// Fetch a leaf's entry, inclusion proof, and covering checkpoint.
    pub async fn fetch_proof(&self, leaf_index: u64) -> Result<ProofBundle> {
        let resp: ProofResponse = self.get_json(&format!("/log/proof/{leaf_index}")).await?;
        Ok(ProofBundle {
            proof: resp.proof.decode()?,
            checkpoint: resp.checkpoint.decode()?,
            entry: resp.entry,
        })
    }

    /// Submit an event for appending.
    pub async fn submit_event(&self, request: &AppendRequest) -> Result<AppendResponse> {
        let url = format!("{}/log/events", self.base_url);
        debug!(%url, "submitting event");
        let resp = self.http.post(&url).json(request).send().await?;
        Self::check(resp).await
    }

    /// Fetch the node's status.
    pub async fn fetch_status(&self) -> Result<StatusResponse> {
        self.get_json("/status").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "fetching");
        let resp = self.http.get(&url).send().await?;
        Self::check(resp).await
    }

    async fn check<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let message = resp.text().await.unwrap_or_default();
            return Err(AuditError::NotFound(message));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AuditError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }
}

/// Verify that an event is covered by a quorum-signed checkpoint.
///
/// Pure: needs only the group public key, no network or storage. Checks
/// that the proof targets the checkpoint's tree, that the Merkle path
/// links `event_hash` to the checkpoint's root, and that the threshold
/// signature over the checkpoint head is valid.
pub fn verify(
    event_hash: &[u8; 32],
    proof: &InclusionProof,
    checkpoint: &SignedCheckpoint,
    group_key: &GroupPublicKey,
) -> bool {
    proof.tree_size == checkpoint.head.tree_size
        && checkpoint.verify(group_key)
        && verify_proof(event_hash, proof, &checkpoint.head.root_hash)
}
