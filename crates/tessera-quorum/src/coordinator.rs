//! Threshold signature collection over checkpoint heads.
//!
//! One signing session per proposed checkpoint, keyed by tree size. Shares
//! are verified against the signer roster before they count; once the
//! threshold is met the partials are combined, the combined signature is
//! checked against the group key, and a [`SignedCheckpoint`] is published
//! on the event channel. Sessions that miss their deadline expire — the
//! log keeps appending and a fresh checkpoint is attempted later.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tessera_crypto::{combine, GroupPublicKey, PartialSignature, PublicShare};
use tessera_types::{CheckpointHead, NodeEvent, SignatureBytes, SignedCheckpoint};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::QuorumError;
use crate::session::{SessionState, SessionStatus, SigningSession};

/// Quorum size for `n` signers: strictly more than two thirds.
pub fn threshold_for(n: usize) -> u16 {
    (2 * n / 3 + 1) as u16
}

/// Configuration for the signing coordinator.
#[derive(Debug, Clone)]
pub struct QuorumConfig {
    /// The group verification key combined signatures must satisfy.
    pub group_key: GroupPublicKey,
    /// Verification keys of all eligible signers.
    pub signers: Vec<PublicShare>,
    /// How long a session accepts shares before expiring.
    pub session_ttl: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
}

impl QuorumConfig {
    /// Production defaults: 30 second collection window.
    pub fn new(group_key: GroupPublicKey, signers: Vec<PublicShare>) -> Self {
        Self {
            group_key,
            signers,
            session_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
        }
    }

    /// Shares required to produce a signed checkpoint.
    pub fn threshold(&self) -> u16 {
        threshold_for(self.signers.len())
    }
}

type SessionMap = Arc<RwLock<HashMap<u64, SigningSession>>>;

/// Background sweep that expires sessions past their deadline.
struct Sweeper {
    sessions: SessionMap,
    events: broadcast::Sender<NodeEvent>,
    session_ttl: Duration,
    sweep_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl Sweeper {
    async fn run(&self) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.expire_overdue().await;
                }
                _ = shutdown_rx.changed() => {
                    debug!("quorum sweeper shutting down");
                    break;
                }
            }
        }
    }

    async fn expire_overdue(&self) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|tree_size, session| {
            if session.state == SessionState::Collecting && now >= session.deadline {
                session.state = SessionState::Expired;
                warn!(
                    tree_size,
                    shares = session.shares.len(),
                    "signing session expired before quorum"
                );
                let _ = self.events.send(NodeEvent::CheckpointExpired {
                    tree_size: *tree_size,
                });
            }
            // Expired sessions linger one TTL so late shares get a precise
            // error, then their state is released.
            session.state != SessionState::Expired || now < session.deadline + self.session_ttl
        });
    }
}

/// Handle to the running signing coordinator.
pub struct QuorumHandle {
    config: QuorumConfig,
    threshold: u16,
    sessions: SessionMap,
    events: broadcast::Sender<NodeEvent>,
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl QuorumHandle {
    /// Shares required to produce a signed checkpoint.
    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Open a signing session for a checkpoint head.
    ///
    /// Opening the same tree size twice while collecting is a no-op:
    /// shares already gathered under the first head are kept. An expired
    /// session is replaced, so a checkpoint that missed its window can be
    /// re-proposed with a fresh collection window on the next cycle.
    pub async fn begin_session(&self, head: CheckpointHead) {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&head.tree_size) {
            Some(existing) if existing.state != SessionState::Expired => return,
            Some(_) => debug!(tree_size = head.tree_size, "reopened expired signing session"),
            None => debug!(tree_size = head.tree_size, "opened signing session"),
        }
        sessions.insert(
            head.tree_size,
            SigningSession::new(head, Instant::now() + self.config.session_ttl),
        );
    }

    /// Submit a signature share for the checkpoint at `tree_size`.
    ///
    /// The share is verified against the signer's registered public share
    /// before it counts; duplicates from the same signer are idempotent.
    /// Reaching the threshold finalizes the session in this call.
    pub async fn submit_share(
        &self,
        tree_size: u64,
        partial: PartialSignature,
    ) -> Result<SessionStatus, QuorumError> {
        let roster_entry = self
            .config
            .signers
            .iter()
            .find(|s| s.signer() == partial.signer)
            .ok_or(QuorumError::UnknownSigner(partial.signer))?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&tree_size)
            .ok_or(QuorumError::UnknownSession(tree_size))?;

        match session.state {
            SessionState::Expired => return Err(QuorumError::SessionExpired(tree_size)),
            // Quorum already met; the late share changes nothing.
            SessionState::Signed => return Ok(session.status(self.threshold)),
            SessionState::Collecting => {}
        }

        if session.shares.contains_key(&partial.signer) {
            return Ok(session.status(self.threshold));
        }

        let msg = session.head.signing_bytes();
        if !roster_entry.verify(&msg, &partial) {
            return Err(QuorumError::InvalidShare(partial.signer));
        }

        let signer = partial.signer;
        session.shares.insert(signer, partial);
        debug!(
            tree_size,
            signer,
            shares = session.shares.len(),
            threshold = self.threshold,
            "accepted signature share"
        );

        if session.shares.len() >= usize::from(self.threshold) {
            self.finalize(tree_size, session);
        }
        Ok(session.status(self.threshold))
    }

    /// Combine the collected shares and publish the signed checkpoint.
    ///
    /// Every share was individually verified, so a combined signature that
    /// fails the group key points at an inconsistency in the key material
    /// itself. That is logged and the session stays open rather than
    /// publishing a checkpoint that would not verify.
    fn finalize(&self, tree_size: u64, session: &mut SigningSession) {
        let partials: Vec<PartialSignature> = session.shares.values().cloned().collect();
        let combined = match combine(&partials, usize::from(self.threshold)) {
            Ok(sig) => sig,
            Err(e) => {
                error!(tree_size, %e, "failed to combine verified shares");
                return;
            }
        };

        let msg = session.head.signing_bytes();
        if !self.config.group_key.verify(&msg, &combined) {
            error!(
                tree_size,
                "combined signature failed group verification; signer roster \
                 and group key are inconsistent"
            );
            return;
        }

        let checkpoint = SignedCheckpoint {
            head: session.head,
            signature: SignatureBytes::new(combined.to_bytes()),
            signer_set: session.shares.keys().copied().collect(),
        };
        session.state = SessionState::Signed;
        session.result = Some(checkpoint.clone());
        info!(
            tree_size,
            signers = checkpoint.signer_set.len(),
            "checkpoint reached quorum"
        );
        let _ = self.events.send(NodeEvent::CheckpointSigned(checkpoint));
    }

    /// Current status of a session, if one exists.
    pub async fn status(&self, tree_size: u64) -> Option<SessionStatus> {
        let sessions = self.sessions.read().await;
        sessions.get(&tree_size).map(|s| s.status(self.threshold))
    }

    /// The signed checkpoint for a session that reached quorum.
    pub async fn signed_checkpoint(&self, tree_size: u64) -> Option<SignedCheckpoint> {
        let sessions = self.sessions.read().await;
        sessions.get(&tree_size).and_then(|s| s.result.clone())
    }

    /// Subscribe to checkpoint events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Stop the background sweep.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Abort the background task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Check whether the background task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Start the signing coordinator and return a handle.
///
/// Spawns the expiry sweep; sessions and events are shared between the
/// handle and the sweep task.
pub fn start(config: QuorumConfig, events: broadcast::Sender<NodeEvent>) -> QuorumHandle {
    let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = Sweeper {
        sessions: sessions.clone(),
        events: events.clone(),
        session_ttl: config.session_ttl,
        sweep_interval: config.sweep_interval,
        shutdown_rx,
    };
    let task = tokio::spawn(async move {
        sweeper.run().await;
    });

    let threshold = config.threshold();
    QuorumHandle {
        config,
        threshold,
        sessions,
        events,
        shutdown_tx,
        task,
    }
}
