//! Per-checkpoint signing session state.

use std::collections::BTreeMap;

use tessera_crypto::PartialSignature;
use tessera_types::{CheckpointHead, SignedCheckpoint};
use tokio::time::Instant;

/// Lifecycle of a signing session.
///
/// A session only moves forward: collecting shares until either the
/// threshold is met (`Signed`) or the deadline passes (`Expired`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting shares, threshold not yet met.
    Collecting,
    /// Threshold met and the combined signature verified.
    Signed,
    /// Deadline passed before the threshold was met.
    Expired,
}

/// Point-in-time view of a session, for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Number of distinct verified shares collected so far.
    pub shares: usize,
    /// Shares required to sign.
    pub threshold: u16,
}

/// One signing attempt over a fixed checkpoint head.
pub(crate) struct SigningSession {
    pub(crate) head: CheckpointHead,
    pub(crate) state: SessionState,
    /// Verified shares, keyed by signer index. BTreeMap keeps the signer
    /// set ordered for the final checkpoint.
    pub(crate) shares: BTreeMap<u16, PartialSignature>,
    pub(crate) deadline: Instant,
    /// Set once the session reaches `Signed`.
    pub(crate) result: Option<SignedCheckpoint>,
}

impl SigningSession {
    pub(crate) fn new(head: CheckpointHead, deadline: Instant) -> Self {
        Self {
            head,
            state: SessionState::Collecting,
            shares: BTreeMap::new(),
            deadline,
            result: None,
        }
    }

    pub(crate) fn status(&self, threshold: u16) -> SessionStatus {
        SessionStatus {
            state: self.state,
            shares: self.shares.len(),
            threshold,
        }
    }
}
