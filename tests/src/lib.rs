//! Shared test harness for Tessera integration tests.
//!
//! Provides [`TestCluster`] — an N-node cluster wired through an in-process
//! RPC router instead of live QUIC. Each node carries a real transparency
//! log and a real value-store node; only the network seam is mocked, with
//! failure injection for partition and node-loss scenarios.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tessera_crypto::{combine, DealerOutput, PartialSignature};
use tessera_dht::{DhtConfig, DhtNode};
use tessera_log::{AppendReceipt, EventSubmission, LogStore, TransparencyLogService};
use tessera_net::{FindValueResult, NetError, PeerEntry, RecordPayload, Rpc};
use tessera_store::MemoryStore;
use tessera_types::{
    CheckpointHead, PeerId, RecordId, SignatureBytes, SignedCheckpoint,
};

/// One simulated node: a transparency log plus its view of the value store.
pub struct ClusterNode {
    pub entry: PeerEntry,
    pub log: Arc<TransparencyLogService>,
    pub dht: Arc<DhtNode>,
}

impl ClusterNode {
    pub fn id(&self) -> PeerId {
        self.entry.peer
    }
}

/// In-process RPC router: requests go straight to the target node's
/// handlers. Nodes in the `down` set are unreachable.
#[derive(Default)]
pub struct ClusterRpc {
    nodes: RwLock<HashMap<PeerId, Arc<ClusterNode>>>,
    down: RwLock<HashSet<PeerId>>,
}

impl ClusterRpc {
    fn node(&self, peer: PeerId) -> Result<Arc<ClusterNode>, NetError> {
        if self.down.read().expect("lock poisoned").contains(&peer) {
            return Err(NetError::Connect("node is down".into()));
        }
        self.nodes
            .read()
            .expect("lock poisoned")
            .get(&peer)
            .cloned()
            .ok_or(NetError::UnknownPeer(peer))
    }

    fn entries_for(&self, peers: &[PeerId]) -> Vec<PeerEntry> {
        let nodes = self.nodes.read().expect("lock poisoned");
        peers
            .iter()
            .filter_map(|p| nodes.get(p).map(|n| n.entry))
            .collect()
    }
}

#[async_trait]
impl Rpc for ClusterRpc {
    async fn ping(&self, peer: PeerId) -> Result<(), NetError> {
        self.node(peer).map(|_| ())
    }

    async fn store(&self, peer: PeerId, record: RecordPayload) -> Result<bool, NetError> {
        let node = self.node(peer)?;
        Ok(node.dht.handle_store(record).await)
    }

    async fn find_node(&self, peer: PeerId, target: PeerId) -> Result<Vec<PeerEntry>, NetError> {
        let node = self.node(peer)?;
        Ok(self.entries_for(&node.dht.closest_peers(&target, 20)))
    }

    async fn find_value(&self, peer: PeerId, key: RecordId) -> Result<FindValueResult, NetError> {
        let node = self.node(peer)?;
        let (record, closer) = node.dht.handle_find_value(key).await;
        Ok(FindValueResult {
            record,
            closer: self.entries_for(&closer),
        })
    }
}

/// An N-node cluster sharing one in-process RPC router.
pub struct TestCluster {
    pub rpc: Arc<ClusterRpc>,
    pub nodes: Vec<Arc<ClusterNode>>,
}

impl TestCluster {
    /// Build a fully meshed cluster of `n` nodes with default tuning.
    pub fn new(n: usize) -> Self {
        Self::with_config(n, DhtConfig::default())
    }

    /// Build a fully meshed cluster of `n` nodes.
    pub fn with_config(n: usize, config: DhtConfig) -> Self {
        let rpc = Arc::new(ClusterRpc::default());
        let mut nodes = Vec::with_capacity(n);

        for i in 0..n {
            let entry = PeerEntry::from_endpoint_id([i as u8 + 1; 32]);
            let log = Arc::new(
                TransparencyLogService::open(LogStore::in_memory(), 64 * 1024)
                    .expect("open log"),
            );
            let dht = Arc::new(DhtNode::new(
                entry.peer,
                config.clone(),
                Arc::new(MemoryStore::new()),
                rpc.clone(),
            ));
            let node = Arc::new(ClusterNode { entry, log, dht });
            rpc.nodes
                .write()
                .expect("lock poisoned")
                .insert(entry.peer, node.clone());
            nodes.push(node);
        }

        // Full mesh: every routing table knows every other node.
        for node in &nodes {
            for other in &nodes {
                if other.id() != node.id() {
                    node.dht.record_peer(other.id());
                }
            }
        }

        Self { rpc, nodes }
    }

    /// Make a node unreachable (or reachable again).
    pub fn set_down(&self, peer: PeerId, down: bool) {
        let mut set = self.rpc.down.write().expect("lock poisoned");
        if down {
            set.insert(peer);
        } else {
            set.remove(&peer);
        }
    }

    /// Register an extra node that joined after cluster construction.
    ///
    /// The node is reachable over RPC but starts with an empty routing
    /// table; callers bootstrap it explicitly.
    pub fn register(&self, node: Arc<ClusterNode>) {
        self.rpc
            .nodes
            .write()
            .expect("lock poisoned")
            .insert(node.id(), node);
    }
}

/// Build a node that is not yet part of any cluster.
pub fn standalone_node(seed: u8, rpc: Arc<ClusterRpc>) -> Arc<ClusterNode> {
    let entry = PeerEntry::from_endpoint_id([seed; 32]);
    let log = Arc::new(
        TransparencyLogService::open(LogStore::in_memory(), 64 * 1024).expect("open log"),
    );
    let dht = Arc::new(DhtNode::new(
        entry.peer,
        DhtConfig::default(),
        Arc::new(MemoryStore::new()),
        rpc,
    ));
    Arc::new(ClusterNode { entry, log, dht })
}

/// Deal a fresh signer set with `t = ⌊2n/3⌋ + 1`.
pub fn signer_set(n: u16) -> DealerOutput {
    let t = tessera_quorum::threshold_for(n as usize);
    tessera_crypto::generate_shares(n, t, &mut rand::thread_rng()).expect("dealer")
}

/// Append a test event and return its receipt.
pub fn append_event(log: &TransparencyLogService, tag: &str) -> AppendReceipt {
    log.append_event(EventSubmission {
        event_type: "ballot_cast".to_string(),
        payload: format!("ballot {tag}").into_bytes(),
        idempotency_key: format!("key-{tag}"),
    })
    .expect("append")
}

/// Clone a log by replaying its persisted entries into a fresh store, the
/// same way a restarted or catching-up replica rebuilds its tree.
pub fn replicate_log(source: &TransparencyLogService) -> Arc<TransparencyLogService> {
    let store = LogStore::in_memory();
    for index in 0..source.tree_size() {
        let entry = source
            .entry(index)
            .expect("read entry")
            .expect("entry exists");
        store.put_entry(&entry).expect("replicate entry");
    }
    Arc::new(TransparencyLogService::open(store, 64 * 1024).expect("open replica"))
}

/// Threshold-sign a head with the first `t` shares of a dealer output.
pub fn sign_head(out: &DealerOutput, head: CheckpointHead) -> SignedCheckpoint {
    let t = usize::from(tessera_quorum::threshold_for(out.public_shares.len()));
    let msg = head.signing_bytes();
    let partials: Vec<PartialSignature> = out.secret_shares[..t]
        .iter()
        .map(|s| s.sign(&msg))
        .collect();
    let sig = combine(&partials, t).expect("combine");
    SignedCheckpoint {
        head,
        signature: SignatureBytes::new(sig.to_bytes()),
        signer_set: (1..=t as u16).collect(),
    }
}
