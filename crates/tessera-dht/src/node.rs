//! The distributed value store: content-addressed put/get with
//! replication and iterative lookup.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tessera_net::{RecordPayload, Rpc};
use tessera_store::{RecordStore, StoredRecord};
use tessera_types::{now_unix, PeerId, RecordId};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::DhtError;
use crate::routing::RoutingTable;

type Result<T> = std::result::Result<T, DhtError>;

/// Tunables for the value store.
#[derive(Debug, Clone)]
pub struct DhtConfig {
    /// Number of peers each record is replicated to (`R`).
    pub replication: usize,
    /// Parallelism of iterative lookups (`α`).
    pub alpha: usize,
    /// Routing bucket size and lookup shortlist width (`k`).
    pub bucket_size: usize,
    /// Statutory retention window in seconds. Records are kept at least
    /// this long; nothing evicts them earlier.
    pub retention_secs: u64,
    /// Per-peer timeout for a single RPC.
    pub rpc_timeout: Duration,
    /// Initial backoff between replication retries; doubles per attempt.
    pub retry_backoff: Duration,
    /// Replication retry attempts per straggler before giving up.
    pub max_retries: u32,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            replication: 3,
            alpha: 3,
            bucket_size: 20,
            // 5 years, the statutory audit window.
            retention_secs: 1825 * 24 * 60 * 60,
            rpc_timeout: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(1),
            max_retries: 5,
        }
    }
}

/// A node's view of the distributed value store.
///
/// Owns the local record store and routing table; talks to peers through
/// the [`Rpc`] seam.
pub struct DhtNode {
    config: DhtConfig,
    table: RwLock<RoutingTable>,
    store: Arc<dyn RecordStore>,
    rpc: Arc<dyn Rpc>,
}

impl DhtNode {
    /// Create a node identified by `local` in the routing keyspace.
    pub fn new(
        local: PeerId,
        config: DhtConfig,
        store: Arc<dyn RecordStore>,
        rpc: Arc<dyn Rpc>,
    ) -> Self {
        let table = RwLock::new(RoutingTable::new(local, config.bucket_size));
        Self {
            config,
            table,
            store,
            rpc,
        }
    }

    /// The local node's routing ID.
    pub fn local(&self) -> PeerId {
        self.table.read().expect("lock poisoned").local()
    }

    /// Record that a peer was seen (incoming RPC, FindNode response).
    pub fn record_peer(&self, peer: PeerId) {
        self.table.write().expect("lock poisoned").insert(peer);
    }

    /// Drop a peer from the routing table.
    pub fn forget_peer(&self, peer: &PeerId) {
        self.table.write().expect("lock poisoned").remove(peer);
    }

    /// The `n` known peers closest to `target`.
    pub fn closest_peers(&self, target: &PeerId, n: usize) -> Vec<PeerId> {
        self.table.read().expect("lock poisoned").closest(target, n)
    }

    /// Number of peers currently in the routing table.
    pub fn peer_count(&self) -> usize {
        self.table.read().expect("lock poisoned").len()
    }

    /// Retention deadline for a record stored now.
    pub fn retention_deadline(&self) -> u64 {
        now_unix() + self.config.retention_secs
    }

    /// Populate the routing table by walking toward our own ID through the
    /// given bootstrap peers.
    pub async fn bootstrap(&self, seeds: &[PeerId]) {
        for seed in seeds {
            self.record_peer(*seed);
        }
        let local = self.local();
        if let Err(e) = self.iterative_find_node(local).await {
            warn!("bootstrap lookup failed: {e}");
        }
        debug!(peers = self.peer_count(), "bootstrap complete");
    }

    // -------------------------------------------------------------------
    // Public store/retrieve
    // -------------------------------------------------------------------

    /// Store a value under its content address.
    ///
    /// Persists locally, then replicates to the `R` closest peers in
    /// parallel. Succeeds once a majority of the replica set has
    /// acknowledged; peers that missed the write are retried in the
    /// background with exponential backoff.
    pub async fn put(&self, key: RecordId, value: Vec<u8>) -> Result<()> {
        let actual = RecordId::from_data(&value);
        if actual != key {
            return Err(DhtError::KeyMismatch {
                provided: key,
                actual,
            });
        }

        let expires_at = self.retention_deadline();
        self.store
            .put(StoredRecord {
                id: key,
                value: value.clone(),
                expires_at,
            })
            .await?;

        let targets = self.closest_peers(&PeerId::from(key), self.config.replication);
        if targets.is_empty() {
            debug!(%key, "no peers known, stored locally only");
            return Ok(());
        }

        let payload = RecordPayload {
            id: key,
            value,
            expires_at,
        };

        let mut set = JoinSet::new();
        for peer in targets.iter().copied() {
            let rpc = self.rpc.clone();
            let record = payload.clone();
            let timeout = self.config.rpc_timeout;
            set.spawn(async move {
                let outcome = tokio::time::timeout(timeout, rpc.store(peer, record)).await;
                (peer, matches!(outcome, Ok(Ok(true))))
            });
        }

        let mut acks = 0;
        let mut stragglers = Vec::new();
        while let Some(joined) = set.join_next().await {
            let Ok((peer, ok)) = joined else { continue };
            if ok {
                acks += 1;
            } else {
                stragglers.push(peer);
            }
        }

        let needed = targets.len() / 2 + 1;
        debug!(%key, acks, replicas = targets.len(), "replication fan-out complete");

        for peer in &stragglers {
            self.spawn_replication_retry(*peer, payload.clone());
        }

        if acks < needed {
            return Err(DhtError::ReplicationFailed { acks, needed });
        }
        Ok(())
    }

    /// Retrieve a value by content address.
    ///
    /// Checks the local store first, then runs an iterative lookup across
    /// progressively closer peers. Returned bytes are always re-hashed
    /// against the key before being handed to the caller.
    pub async fn get(&self, key: RecordId) -> Result<Vec<u8>> {
        if let Some(record) = self.store.get(key).await? {
            return verify_value(key, record.value);
        }
        self.iterative_find_value(key).await
    }

    // -------------------------------------------------------------------
    // Handlers for incoming peer RPCs (called by the daemon's dispatcher)
    // -------------------------------------------------------------------

    /// Handle an incoming `Store`: verify content address, persist.
    pub async fn handle_store(&self, record: RecordPayload) -> bool {
        if RecordId::from_data(&record.value) != record.id {
            warn!(id = %record.id, "rejecting store with mismatched content address");
            return false;
        }
        let stored = StoredRecord {
            id: record.id,
            value: record.value,
            expires_at: record.expires_at.min(self.retention_deadline()),
        };
        match self.store.put(stored).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %record.id, "failed to store replicated record: {e}");
                false
            }
        }
    }

    /// Handle an incoming `FindValue`: the record if held, else the closest
    /// known peers.
    pub async fn handle_find_value(
        &self,
        key: RecordId,
    ) -> (Option<RecordPayload>, Vec<PeerId>) {
        match self.store.get(key).await {
            Ok(Some(record)) if RecordId::from_data(&record.value) == key => (
                Some(RecordPayload {
                    id: record.id,
                    value: record.value,
                    expires_at: record.expires_at,
                }),
                Vec::new(),
            ),
            _ => (
                None,
                self.closest_peers(&PeerId::from(key), self.config.bucket_size),
            ),
        }
    }

    /// Remove records past their retention deadline. Returns the count.
    pub async fn sweep_expired(&self) -> Result<usize> {
        Ok(self.store.sweep_expired(now_unix()).await?)
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn spawn_replication_retry(&self, peer: PeerId, record: RecordPayload) {
        let rpc = self.rpc.clone();
        let timeout = self.config.rpc_timeout;
        let mut backoff = self.config.retry_backoff;
        let max_retries = self.config.max_retries;
        let key = record.id;
        tokio::spawn(async move {
            for attempt in 1..=max_retries {
                tokio::time::sleep(backoff).await;
                match tokio::time::timeout(timeout, rpc.store(peer, record.clone())).await {
                    Ok(Ok(true)) => {
                        debug!(%key, %peer, attempt, "replication retry succeeded");
                        return;
                    }
                    outcome => {
                        debug!(%key, %peer, attempt, ?outcome, "replication retry failed");
                    }
                }
                backoff *= 2;
            }
            warn!(%key, %peer, "giving up on replica after {max_retries} retries");
        });
    }

    /// Iterative node lookup toward `target`; populates the routing table.
    async fn iterative_find_node(&self, target: PeerId) -> Result<()> {
        let mut shortlist = self.closest_peers(&target, self.config.bucket_size);
        let mut queried: HashSet<PeerId> = HashSet::new();

        loop {
            let batch: Vec<PeerId> = shortlist
                .iter()
                .filter(|p| !queried.contains(*p))
                .take(self.config.alpha)
                .copied()
                .collect();
            if batch.is_empty() {
                return Ok(());
            }

            let mut set = JoinSet::new();
            for peer in batch {
                queried.insert(peer);
                let rpc = self.rpc.clone();
                let timeout = self.config.rpc_timeout;
                set.spawn(async move {
                    (peer, tokio::time::timeout(timeout, rpc.find_node(peer, target)).await)
                });
            }

            while let Some(joined) = set.join_next().await {
                let Ok((peer, outcome)) = joined else { continue };
                match outcome {
                    Ok(Ok(entries)) => {
                        for entry in entries {
                            if entry.is_consistent() {
                                self.record_peer(entry.peer);
                                if !shortlist.contains(&entry.peer) {
                                    shortlist.push(entry.peer);
                                }
                            }
                        }
                    }
                    _ => self.forget_peer(&peer),
                }
            }

            shortlist.sort_by_key(|p| p.distance(&target));
            shortlist.truncate(self.config.bucket_size);
        }
    }

    /// Iterative value lookup: α parallel queries stepping through
    /// progressively closer peers, O(log n) hops.
    async fn iterative_find_value(&self, key: RecordId) -> Result<Vec<u8>> {
        let target = PeerId::from(key);
        let mut shortlist = self.closest_peers(&target, self.config.bucket_size);
        let mut queried: HashSet<PeerId> = HashSet::new();

        loop {
            let batch: Vec<PeerId> = shortlist
                .iter()
                .filter(|p| !queried.contains(*p))
                .take(self.config.alpha)
                .copied()
                .collect();
            if batch.is_empty() {
                return Err(DhtError::NotFound(key));
            }

            let mut set = JoinSet::new();
            for peer in batch {
                queried.insert(peer);
                let rpc = self.rpc.clone();
                let timeout = self.config.rpc_timeout;
                set.spawn(async move {
                    (peer, tokio::time::timeout(timeout, rpc.find_value(peer, key)).await)
                });
            }

            while let Some(joined) = set.join_next().await {
                let Ok((peer, outcome)) = joined else { continue };
                match outcome {
                    Ok(Ok(result)) => {
                        if let Some(record) = result.record {
                            set.abort_all();
                            let value = verify_value(key, record.value)?;
                            // Cache locally so the neighborhood converges on
                            // holding popular records.
                            let _ = self
                                .store
                                .put(StoredRecord {
                                    id: key,
                                    value: value.clone(),
                                    expires_at: record.expires_at.min(self.retention_deadline()),
                                })
                                .await;
                            return Ok(value);
                        }
                        for entry in result.closer {
                            if entry.is_consistent() {
                                self.record_peer(entry.peer);
                                if !shortlist.contains(&entry.peer) {
                                    shortlist.push(entry.peer);
                                }
                            }
                        }
                    }
                    _ => self.forget_peer(&peer),
                }
            }

            shortlist.sort_by_key(|p| p.distance(&target));
            shortlist.truncate(self.config.bucket_size);
        }
    }
}

/// Re-hash retrieved bytes against the key they were stored under.
fn verify_value(key: RecordId, value: Vec<u8>) -> Result<Vec<u8>> {
    let actual = RecordId::from_data(&value);
    if actual != key {
        return Err(DhtError::IntegrityError {
            expected: key,
            actual,
        });
    }
    Ok(value)
}
