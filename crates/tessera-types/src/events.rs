//! Cluster-visible events emitted by node components.

use serde::{Deserialize, Serialize};

use crate::{PeerId, RecordId, SignedCheckpoint};

/// Events that components publish on the node's broadcast channel.
///
/// Subscribers (the daemon's announcement loop, operational alerting) react
/// to these without direct coupling to the producing component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvent {
    /// A checkpoint reached quorum and carries a valid threshold signature.
    CheckpointSigned(SignedCheckpoint),
    /// A checkpoint's share-collection deadline passed before quorum.
    ///
    /// Operational alert, not data loss — the log keeps appending and a
    /// fresh checkpoint is attempted at the next cadence.
    CheckpointExpired {
        /// Tree size of the checkpoint that expired.
        tree_size: u64,
    },
    /// A record was accepted into the local store from a peer.
    RecordStored(RecordId, PeerId),
    /// A verification recomputed a hash or signature that did not match.
    ///
    /// Possible tampering; surfaced as an audit alert.
    IntegrityAlert {
        /// The record or checkpoint the mismatch was observed on.
        subject: RecordId,
    },
}
