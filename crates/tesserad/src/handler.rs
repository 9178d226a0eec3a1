//! Incoming protocol handler for the Tessera daemon.
//!
//! Implements iroh's [`ProtocolHandler`] trait to handle incoming QUIC
//! connections dispatched by the iroh [`Router`]. Dispatches messages to
//! the value store, the transparency log, and the signing machinery.
//!
//! [`ProtocolHandler`]: iroh::protocol::ProtocolHandler
//! [`Router`]: iroh::protocol::Router

use std::fmt;
use std::sync::Arc;

use iroh::endpoint::Connection;
use iroh::protocol::AcceptError;
use tessera_dht::DhtNode;
use tessera_log::TransparencyLogService;
use tessera_net::{PeerEntry, TesseraMessage, TesseraRpc, TesseraTransport};
use tessera_types::{CheckpointHead, NodeEvent, PeerId, RecordId, SignedCheckpoint};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::node::SignerContext;

/// Handles incoming Tessera protocol connections.
pub struct TesseraProtocol {
    log: Arc<TransparencyLogService>,
    dht: Arc<DhtNode>,
    rpc: Arc<TesseraRpc>,
    signer: Option<Arc<SignerContext>>,
    events: broadcast::Sender<NodeEvent>,
}

impl fmt::Debug for TesseraProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TesseraProtocol").finish_non_exhaustive()
    }
}

impl TesseraProtocol {
    /// Create a new protocol handler.
    pub fn new(
        log: Arc<TransparencyLogService>,
        dht: Arc<DhtNode>,
        rpc: Arc<TesseraRpc>,
        signer: Option<Arc<SignerContext>>,
        events: broadcast::Sender<NodeEvent>,
    ) -> Self {
        Self {
            log,
            dht,
            rpc,
            signer,
            events,
        }
    }
}

/// Answer a peer's request for our signature share over a checkpoint head.
///
/// A signer only signs heads whose root it can reproduce from its own
/// tree; a forked or lagging log declines rather than countersigning a
/// root it has never seen. Non-signer nodes always decline (signer 0 is
/// never a valid index).
fn answer_share_request(
    log: &TransparencyLogService,
    signer: Option<&SignerContext>,
    head: CheckpointHead,
) -> TesseraMessage {
    let declined = |signer_index| TesseraMessage::ShareSubmit {
        checkpoint_id: head.tree_size,
        signer: signer_index,
        partial: None,
    };

    let Some(ctx) = signer else {
        return declined(0);
    };

    match log.root_at(head.tree_size) {
        Ok(root) if root == head.root_hash => {
            let partial = ctx.share.sign(&head.signing_bytes());
            TesseraMessage::ShareSubmit {
                checkpoint_id: head.tree_size,
                signer: ctx.index,
                partial: Some(partial.to_bytes().to_vec()),
            }
        }
        Ok(_) => {
            warn!(
                tree_size = head.tree_size,
                "declining share request: head root does not match local tree"
            );
            declined(ctx.index)
        }
        Err(e) => {
            debug!(tree_size = head.tree_size, %e, "declining share request");
            declined(ctx.index)
        }
    }
}

/// Process an announced checkpoint: verify the threshold signature, then
/// confirm and persist it against the local tree.
fn handle_checkpoint_announce(
    log: &TransparencyLogService,
    signer: Option<&SignerContext>,
    events: &broadcast::Sender<NodeEvent>,
    checkpoint: SignedCheckpoint,
) {
    if let Some(ctx) = signer {
        if !checkpoint.verify(&ctx.roster.group_key) {
            warn!(
                tree_size = checkpoint.head.tree_size,
                "announced checkpoint failed signature verification"
            );
            let _ = events.send(NodeEvent::IntegrityAlert {
                subject: RecordId::from_data(&checkpoint.head.signing_bytes()),
            });
            return;
        }
    }
    match log.record_signed_checkpoint(&checkpoint) {
        Ok(()) => {
            info!(
                tree_size = checkpoint.head.tree_size,
                "stored announced checkpoint"
            );
        }
        Err(e) => {
            warn!(
                tree_size = checkpoint.head.tree_size,
                %e,
                "rejecting announced checkpoint"
            );
        }
    }
}

impl iroh::protocol::ProtocolHandler for TesseraProtocol {
    async fn accept(&self, conn: Connection) -> Result<(), AcceptError> {
        // Learn the remote peer for routing and future fan-outs.
        let remote_id = conn.remote_id();
        let peer = self
            .rpc
            .add_peer_addr(iroh::EndpointAddr::new(remote_id));
        self.dht.record_peer(peer);

        // Uni-directional streams: checkpoint announcements.
        let conn_uni = conn.clone();
        let log_uni = self.log.clone();
        let signer_uni = self.signer.clone();
        let events_uni = self.events.clone();
        tokio::spawn(async move {
            TesseraTransport::handle_connection(conn_uni, move |msg, _conn| {
                let log = log_uni.clone();
                let signer = signer_uni.clone();
                let events = events_uni.clone();
                async move {
                    match msg {
                        TesseraMessage::CheckpointAnnounce(checkpoint) => {
                            handle_checkpoint_announce(
                                &log,
                                signer.as_deref(),
                                &events,
                                checkpoint,
                            );
                        }
                        other => {
                            debug!("unhandled uni-stream message: {other:?}");
                        }
                    }
                }
            })
            .await;
        });

        // Bi-directional streams: DHT RPCs and share requests.
        let log_bi = self.log.clone();
        let dht_bi = self.dht.clone();
        let rpc_bi = self.rpc.clone();
        let signer_bi = self.signer.clone();
        let events_bi = self.events.clone();
        tokio::spawn(async move {
            TesseraTransport::handle_bi_streams(conn, move |msg| {
                let log = log_bi.clone();
                let dht = dht_bi.clone();
                let rpc = rpc_bi.clone();
                let signer = signer_bi.clone();
                let events = events_bi.clone();
                async move {
                    match msg {
                        TesseraMessage::Ping { timestamp } => {
                            Some(TesseraMessage::Pong { timestamp })
                        }
                        TesseraMessage::Store(record) => {
                            let id = record.id;
                            let ok = dht.handle_store(record).await;
                            if ok {
                                let _ = events.send(NodeEvent::RecordStored(id, peer));
                            }
                            Some(TesseraMessage::StoreAck { id, ok })
                        }
                        TesseraMessage::FindNode { target } => {
                            let peers = peer_entries(&rpc, dht.closest_peers(&target, 20));
                            Some(TesseraMessage::FindNodeResponse { peers })
                        }
                        TesseraMessage::FindValue { key } => {
                            let (record, closer) = dht.handle_find_value(key).await;
                            Some(TesseraMessage::FindValueResponse {
                                record,
                                closer: peer_entries(&rpc, closer),
                            })
                        }
                        TesseraMessage::ShareRequest { head } => {
                            Some(answer_share_request(&log, signer.as_deref(), head))
                        }
                        _ => None,
                    }
                }
            })
            .await;
        });

        Ok(())
    }
}

/// Resolve routing IDs back to wire entries carrying endpoint keys.
///
/// Peers whose endpoint address we no longer hold are omitted; an entry
/// without a dialable key is useless to the requester.
fn peer_entries(rpc: &TesseraRpc, peers: Vec<PeerId>) -> Vec<PeerEntry> {
    peers
        .into_iter()
        .filter_map(|peer| {
            let addr = rpc.resolve(peer).ok()?;
            Some(PeerEntry::from_endpoint_id(*addr.id.as_bytes()))
        })
        .collect()
}
