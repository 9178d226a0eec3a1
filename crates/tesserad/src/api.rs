//! Public HTTP API.
//!
//! Serves the append and audit endpoints over axum. Wire shapes live in
//! `tessera-audit` so the audit client and this server cannot drift apart.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tessera_audit::api::{
    AppendRequest, AppendResponse, CheckpointDto, EntryDto, ProofDto, ProofResponse,
    StatusResponse,
};
use tessera_dht::DhtNode;
use tessera_log::{EventSubmission, LogEntry, LogError, TransparencyLogService};
use tessera_types::{PeerId, RecordId};
use tracing::warn;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub log: Arc<TransparencyLogService>,
    pub dht: Arc<DhtNode>,
    pub local_peer: PeerId,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/log/events", post(append_event))
        .route("/log/checkpoints/latest", get(latest_checkpoint))
        .route("/log/checkpoints/:tree_size", get(checkpoint_at))
        .route("/log/proof/:leaf_index", get(proof_for_leaf))
        .route("/status", get(status))
        .with_state(state)
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl From<LogError> for ApiError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Validation(_) => ApiError(StatusCode::BAD_REQUEST, e.to_string()),
            LogError::NotFound(_) => ApiError(StatusCode::NOT_FOUND, e.to_string()),
            _ => ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

fn entry_dto(entry: &LogEntry) -> EntryDto {
    EntryDto {
        index: entry.index,
        timestamp: entry.timestamp,
        event_type: entry.event_type.clone(),
        payload_hash: entry.payload_hash.to_string(),
        payload_ref: entry.payload_ref.to_string(),
    }
}

async fn append_event(
    State(state): State<AppState>,
    Json(request): Json<AppendRequest>,
) -> Result<Json<AppendResponse>, ApiError> {
    let payload = request.payload.into_bytes();
    let receipt = state.log.append_event(EventSubmission {
        event_type: request.event_type,
        payload: payload.clone(),
        idempotency_key: request.idempotency_key,
    })?;

    // Archive the payload in the background; the log already committed to
    // its hash, so a replication hiccup does not fail the append.
    let key = RecordId::from_data(&payload);
    let dht = state.dht.clone();
    tokio::spawn(async move {
        if let Err(e) = dht.put(key, payload).await {
            warn!(%key, %e, "payload archival failed");
        }
    });

    Ok(Json(AppendResponse {
        leaf_index: receipt.leaf_index,
        tree_size: receipt.tree_size,
        root_hash: hex::encode(receipt.root_hash),
        proof: ProofDto::from(&receipt.proof),
    }))
}

async fn latest_checkpoint(
    State(state): State<AppState>,
) -> Result<Json<CheckpointDto>, ApiError> {
    let checkpoint = state
        .log
        .latest_signed_checkpoint()?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, "no signed checkpoint yet".into()))?;
    Ok(Json(CheckpointDto::from(&checkpoint)))
}

async fn checkpoint_at(
    State(state): State<AppState>,
    Path(tree_size): Path<u64>,
) -> Result<Json<CheckpointDto>, ApiError> {
    let checkpoint = state.log.signed_checkpoint(tree_size)?.ok_or_else(|| {
        ApiError(
            StatusCode::NOT_FOUND,
            format!("no signed checkpoint at size {tree_size}"),
        )
    })?;
    Ok(Json(CheckpointDto::from(&checkpoint)))
}

async fn proof_for_leaf(
    State(state): State<AppState>,
    Path(leaf_index): Path<u64>,
) -> Result<Json<ProofResponse>, ApiError> {
    let (proof, checkpoint) = state.log.proof_for_audit(leaf_index)?;
    let entry = state
        .log
        .entry(leaf_index)?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("no entry {leaf_index}")))?;
    Ok(Json(ProofResponse {
        entry: entry_dto(&entry),
        proof: ProofDto::from(&proof),
        checkpoint: CheckpointDto::from(&checkpoint),
    }))
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let latest = state.log.latest_signed_checkpoint()?;
    Ok(Json(StatusResponse {
        peer_id: state.local_peer.to_string(),
        tree_size: state.log.tree_size(),
        latest_checkpoint: latest.as_ref().map(CheckpointDto::from),
        peer_count: state.dht.peer_count(),
    }))
}
