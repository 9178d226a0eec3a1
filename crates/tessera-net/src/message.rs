//! Protocol messages for the Tessera network layer.
//!
//! All messages are serialized with postcard over QUIC streams.

use serde::{Deserialize, Serialize};
use tessera_types::{CheckpointHead, PeerId, RecordId, SignedCheckpoint};

/// A peer's identity as carried on the wire.
///
/// `endpoint_id` is the raw iroh endpoint public key; `peer` is its hash,
/// the position in the XOR routing keyspace. Receivers must check the two
/// agree before trusting the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Routing-keyspace ID, `blake3(endpoint_id)`.
    pub peer: PeerId,
    /// The peer's iroh endpoint public key bytes.
    pub endpoint_id: [u8; 32],
}

impl PeerEntry {
    /// Build an entry from an endpoint public key, deriving the peer ID.
    pub fn from_endpoint_id(endpoint_id: [u8; 32]) -> Self {
        Self {
            peer: PeerId::from_data(&endpoint_id),
            endpoint_id,
        }
    }

    /// True if the routing ID matches the endpoint key it claims.
    pub fn is_consistent(&self) -> bool {
        self.peer == PeerId::from_data(&self.endpoint_id)
    }
}

/// A content-addressed record as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Content address, `blake3(value)`.
    pub id: RecordId,
    /// The record bytes.
    pub value: Vec<u8>,
    /// Unix timestamp (seconds) after which the record may be swept.
    pub expires_at: u64,
}

/// Protocol messages exchanged between Tessera nodes.
///
/// Each message is sent as a length-prefixed postcard-encoded payload over a
/// QUIC stream. Request variants expect their response on the same bi-stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TesseraMessage {
    /// Liveness check (bi-directional, expects [`TesseraMessage::Pong`]).
    Ping {
        /// Timestamp (millis since epoch) when the ping was sent.
        timestamp: u64,
    },

    /// Response to a [`TesseraMessage::Ping`].
    Pong {
        /// Timestamp from the original ping.
        timestamp: u64,
    },

    /// Replicate a record to a remote node (bi-directional, expects
    /// [`TesseraMessage::StoreAck`]).
    ///
    /// The receiver verifies `blake3(value) == id` before storing; the
    /// sender must not count the replica until the ACK arrives.
    Store(RecordPayload),

    /// Acknowledgement that a replicated record was stored.
    StoreAck {
        /// ID of the record that was offered.
        id: RecordId,
        /// Whether the store succeeded.
        ok: bool,
    },

    /// Ask a peer for the nodes it knows closest to `target`.
    FindNode {
        /// The routing-keyspace point to search toward.
        target: PeerId,
    },

    /// Response to a [`TesseraMessage::FindNode`].
    FindNodeResponse {
        /// Up to `k` known peers closest to the target.
        peers: Vec<PeerEntry>,
    },

    /// Ask a peer for a record, or failing that, for closer peers.
    FindValue {
        /// Content address of the wanted record.
        key: RecordId,
    },

    /// Response to a [`TesseraMessage::FindValue`].
    FindValueResponse {
        /// The record, if this peer holds it.
        record: Option<RecordPayload>,
        /// Otherwise, up to `k` known peers closer to the key.
        closer: Vec<PeerEntry>,
    },

    /// Ask a signer node for its partial signature over a checkpoint head
    /// (bi-directional, expects [`TesseraMessage::ShareSubmit`]).
    ShareRequest {
        /// The snapshot to sign.
        head: CheckpointHead,
    },

    /// A signer's answer to a [`TesseraMessage::ShareRequest`].
    ///
    /// `partial` is `None` when the signer declines, e.g. its own log does
    /// not reproduce the requested root at that size.
    ShareSubmit {
        /// Tree size of the checkpoint being signed.
        checkpoint_id: u64,
        /// The responding signer's index.
        signer: u16,
        /// Compressed 96-byte partial signature, if granted.
        partial: Option<Vec<u8>>,
    },

    /// Broadcast of a freshly signed checkpoint (uni-directional).
    CheckpointAnnounce(SignedCheckpoint),
}
