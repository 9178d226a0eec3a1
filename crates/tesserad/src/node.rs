//! Background orchestration for a running node.
//!
//! The daemon wires the components together in `main`; the loops here
//! drive the periodic work: proposing checkpoints, reacting to quorum
//! events, and sweeping expired records.

use std::sync::Arc;
use std::time::Duration;

use tessera_crypto::{PartialSignature, SecretShare};
use tessera_dht::DhtNode;
use tessera_log::TransparencyLogService;
use tessera_net::{TesseraMessage, TesseraRpc, TesseraTransport};
use tessera_quorum::QuorumHandle;
use tessera_types::{NodeEvent, RecordId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::keys::Roster;

/// A node's signing identity: its index, its secret share, and the public
/// roster it belongs to.
pub struct SignerContext {
    pub index: u16,
    pub share: SecretShare,
    pub roster: Roster,
}

/// Periodically propose a checkpoint of the current tree head and collect
/// signature shares from the signer set.
///
/// A new session is only opened when the tree has grown past the last
/// signed checkpoint; an idle log does not produce a stream of identical
/// checkpoints.
pub fn spawn_checkpoint_loop(
    log: Arc<TransparencyLogService>,
    quorum: Arc<QuorumHandle>,
    transport: Arc<TesseraTransport>,
    rpc: Arc<TesseraRpc>,
    signer: Arc<SignerContext>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a freshly started
        // node bootstraps peers before proposing.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let last_signed = match log.latest_signed_checkpoint() {
                Ok(cp) => cp.map(|c| c.head.tree_size).unwrap_or(0),
                Err(e) => {
                    warn!(%e, "failed to read latest checkpoint");
                    continue;
                }
            };
            if log.tree_size() <= last_signed {
                continue;
            }

            let head = match log.checkpoint_head() {
                Ok(h) => h,
                Err(e) => {
                    debug!(%e, "no checkpoint head yet");
                    continue;
                }
            };

            info!(
                tree_size = head.tree_size,
                "proposing checkpoint for signing"
            );
            quorum.begin_session(head).await;

            // Our own share first.
            let own = signer.share.sign(&head.signing_bytes());
            if let Err(e) = quorum.submit_share(head.tree_size, own).await {
                warn!(%e, "failed to submit own share");
                continue;
            }

            // Fan the request out to every known peer; non-signers and
            // diverged nodes decline with an empty share.
            for peer in rpc.known_peers() {
                let addr = match rpc.resolve(peer) {
                    Ok(a) => a,
                    Err(_) => continue,
                };
                let response = transport
                    .request(addr, &TesseraMessage::ShareRequest { head })
                    .await;
                let (checkpoint_id, signer_index, partial) = match response {
                    Ok(TesseraMessage::ShareSubmit {
                        checkpoint_id,
                        signer,
                        partial: Some(partial),
                    }) => (checkpoint_id, signer, partial),
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(%peer, %e, "share request failed");
                        continue;
                    }
                };
                if checkpoint_id != head.tree_size {
                    continue;
                }
                let partial = match PartialSignature::from_bytes(signer_index, &partial) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(%peer, %e, "peer sent undecodable share");
                        continue;
                    }
                };
                match quorum.submit_share(head.tree_size, partial).await {
                    Ok(status) => {
                        if status.state == tessera_quorum::SessionState::Signed {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(%peer, %e, "share rejected");
                    }
                }
            }
        }
    })
}

/// React to quorum events: persist and propagate signed checkpoints.
///
/// A signed checkpoint is recorded locally, archived into the distributed
/// value store, and announced to every known peer.
pub fn spawn_event_loop(
    log: Arc<TransparencyLogService>,
    dht: Arc<DhtNode>,
    transport: Arc<TesseraTransport>,
    rpc: Arc<TesseraRpc>,
    mut events: broadcast::Receiver<NodeEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "event loop lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                NodeEvent::CheckpointSigned(checkpoint) => {
                    if let Err(e) = log.record_signed_checkpoint(&checkpoint) {
                        warn!(%e, "failed to record signed checkpoint");
                        continue;
                    }

                    // Archive the checkpoint under its content address so
                    // auditors can fetch it from any replica.
                    match postcard::to_allocvec(&checkpoint) {
                        Ok(bytes) => {
                            let key = RecordId::from_data(&bytes);
                            if let Err(e) = dht.put(key, bytes).await {
                                warn!(%key, %e, "checkpoint archival failed");
                            }
                        }
                        Err(e) => warn!(%e, "failed to encode checkpoint"),
                    }

                    // Announce to the cluster.
                    let msg = TesseraMessage::CheckpointAnnounce(checkpoint.clone());
                    for peer in rpc.known_peers() {
                        if let Ok(addr) = rpc.resolve(peer) {
                            if let Err(e) = transport.send_to(addr, &msg).await {
                                debug!(%peer, %e, "checkpoint announce failed");
                            }
                        }
                    }
                    info!(
                        tree_size = checkpoint.head.tree_size,
                        "signed checkpoint recorded and announced"
                    );
                }
                NodeEvent::CheckpointExpired { tree_size } => {
                    warn!(tree_size, "checkpoint expired without quorum");
                }
                NodeEvent::IntegrityAlert { subject } => {
                    warn!(%subject, "integrity alert");
                }
                NodeEvent::RecordStored(id, peer) => {
                    debug!(%id, %peer, "record stored from peer");
                }
            }
        }
    })
}

/// Periodically remove records past the retention window.
pub fn spawn_sweep_loop(dht: Arc<DhtNode>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match dht.sweep_expired().await {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "swept expired records"),
                Err(e) => warn!(%e, "retention sweep failed"),
            }
        }
    })
}
