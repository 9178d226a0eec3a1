//! Peer RPC seam and its live QUIC implementation.
//!
//! The DHT and quorum layers talk to peers through the [`Rpc`] trait so
//! tests can substitute an in-process mock instead of real iroh endpoints.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use iroh::{EndpointAddr, EndpointId};
use tessera_types::{now_unix, PeerId, RecordId};
use tracing::debug;

use crate::error::NetError;
use crate::message::{PeerEntry, RecordPayload, TesseraMessage};
use crate::transport::TesseraTransport;

/// Outcome of a `FindValue` query against one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindValueResult {
    /// The record, if the peer held it.
    pub record: Option<RecordPayload>,
    /// Peers the responder considers closer to the key.
    pub closer: Vec<PeerEntry>,
}

/// Peer-to-peer request operations.
///
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait::async_trait]
pub trait Rpc: Send + Sync {
    /// Liveness probe. Returns the round-trip echo timestamp.
    async fn ping(&self, peer: PeerId) -> Result<(), NetError>;

    /// Offer a record for replication. `Ok(true)` means the peer stored it.
    async fn store(&self, peer: PeerId, record: RecordPayload) -> Result<bool, NetError>;

    /// Ask a peer for the nodes it knows closest to `target`.
    async fn find_node(&self, peer: PeerId, target: PeerId) -> Result<Vec<PeerEntry>, NetError>;

    /// Ask a peer for a record or for closer peers.
    async fn find_value(&self, peer: PeerId, key: RecordId) -> Result<FindValueResult, NetError>;
}

/// Live [`Rpc`] implementation over [`TesseraTransport`].
///
/// Keeps a directory from routing-keyspace peer IDs to iroh endpoint
/// addresses, fed from bootstrap configuration and from `FindNode`
/// responses.
pub struct TesseraRpc {
    transport: Arc<TesseraTransport>,
    directory: RwLock<HashMap<PeerId, EndpointAddr>>,
}

impl TesseraRpc {
    /// Wrap a transport with an empty peer directory.
    pub fn new(transport: Arc<TesseraTransport>) -> Self {
        Self {
            transport,
            directory: RwLock::new(HashMap::new()),
        }
    }

    /// Register a peer's full endpoint address (bootstrap path).
    /// Returns the peer's routing ID.
    pub fn add_peer_addr(&self, addr: EndpointAddr) -> PeerId {
        let peer = PeerId::from_data(addr.id.as_bytes());
        let mut dir = self.directory.write().expect("lock poisoned");
        dir.insert(peer, addr);
        peer
    }

    /// Register a peer learned from a wire [`PeerEntry`].
    ///
    /// Inconsistent entries (routing ID not matching the endpoint key) are
    /// dropped; a peer lying about another peer's position in the keyspace
    /// could otherwise skew lookups.
    pub fn learn_peer(&self, entry: &PeerEntry) -> Option<PeerId> {
        if !entry.is_consistent() {
            debug!(peer = %entry.peer, "dropping inconsistent peer entry");
            return None;
        }
        let endpoint_id = EndpointId::from_bytes(&entry.endpoint_id).ok()?;
        let mut dir = self.directory.write().expect("lock poisoned");
        // Keep any richer address we already have; dialing by ID relies on
        // discovery.
        dir.entry(entry.peer)
            .or_insert_with(|| EndpointAddr::from(endpoint_id));
        Some(entry.peer)
    }

    /// Look up the endpoint address for a peer.
    pub fn resolve(&self, peer: PeerId) -> Result<EndpointAddr, NetError> {
        let dir = self.directory.read().expect("lock poisoned");
        dir.get(&peer).cloned().ok_or(NetError::UnknownPeer(peer))
    }

    /// All peers currently known to the directory.
    pub fn known_peers(&self) -> Vec<PeerId> {
        let dir = self.directory.read().expect("lock poisoned");
        dir.keys().copied().collect()
    }

    async fn request(
        &self,
        peer: PeerId,
        msg: &TesseraMessage,
    ) -> Result<TesseraMessage, NetError> {
        let addr = self.resolve(peer)?;
        self.transport.request(addr, msg).await
    }
}

#[async_trait::async_trait]
impl Rpc for TesseraRpc {
    async fn ping(&self, peer: PeerId) -> Result<(), NetError> {
        let msg = TesseraMessage::Ping {
            timestamp: now_unix() * 1000,
        };
        match self.request(peer, &msg).await? {
            TesseraMessage::Pong { .. } => Ok(()),
            other => Err(NetError::Serialization(format!(
                "expected Pong, got: {other:?}"
            ))),
        }
    }

    async fn store(&self, peer: PeerId, record: RecordPayload) -> Result<bool, NetError> {
        let id = record.id;
        match self.request(peer, &TesseraMessage::Store(record)).await? {
            TesseraMessage::StoreAck { id: ack_id, ok } => {
                if ack_id != id {
                    return Err(NetError::Serialization(format!(
                        "StoreAck for wrong record: expected {id}, got {ack_id}"
                    )));
                }
                Ok(ok)
            }
            other => Err(NetError::Serialization(format!(
                "expected StoreAck, got: {other:?}"
            ))),
        }
    }

    async fn find_node(&self, peer: PeerId, target: PeerId) -> Result<Vec<PeerEntry>, NetError> {
        match self
            .request(peer, &TesseraMessage::FindNode { target })
            .await?
        {
            TesseraMessage::FindNodeResponse { peers } => {
                for entry in &peers {
                    self.learn_peer(entry);
                }
                Ok(peers)
            }
            other => Err(NetError::Serialization(format!(
                "expected FindNodeResponse, got: {other:?}"
            ))),
        }
    }

    async fn find_value(&self, peer: PeerId, key: RecordId) -> Result<FindValueResult, NetError> {
        match self
            .request(peer, &TesseraMessage::FindValue { key })
            .await?
        {
            TesseraMessage::FindValueResponse { record, closer } => {
                for entry in &closer {
                    self.learn_peer(entry);
                }
                Ok(FindValueResult { record, closer })
            }
            other => Err(NetError::Serialization(format!(
                "expected FindValueResponse, got: {other:?}"
            ))),
        }
    }
}
