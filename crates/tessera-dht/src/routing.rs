//! XOR-metric routing table.
//!
//! Peers are bucketed by the bit length of their XOR distance from the
//! local node: bucket `i` holds peers whose distance has its highest set
//! bit at position `i`. Closer peers land in lower buckets, which cover
//! exponentially smaller slices of the keyspace, giving each node a dense
//! view of its neighborhood and a sparse view of the rest.

use tessera_types::PeerId;

/// Routing table over the 256-bit XOR keyspace.
pub struct RoutingTable {
    local: PeerId,
    bucket_size: usize,
    buckets: Vec<Vec<PeerId>>,
}

impl RoutingTable {
    /// Create a table for the given local ID with `bucket_size` entries
    /// per bucket (Kademlia's `k`).
    pub fn new(local: PeerId, bucket_size: usize) -> Self {
        Self {
            local,
            bucket_size,
            buckets: vec![Vec::new(); 256],
        }
    }

    /// The local node's ID.
    pub fn local(&self) -> PeerId {
        self.local
    }

    /// Insert a peer. Returns `false` if the peer is the local node, is
    /// already present, or its bucket is full.
    ///
    /// A full bucket keeps its existing entries: long-lived peers are more
    /// likely to stay reachable than newly seen ones.
    pub fn insert(&mut self, peer: PeerId) -> bool {
        let Some(index) = self.bucket_index(&peer) else {
            return false;
        };
        let bucket = &mut self.buckets[index];
        if bucket.contains(&peer) {
            return false;
        }
        if bucket.len() >= self.bucket_size {
            return false;
        }
        bucket.push(peer);
        true
    }

    /// Remove a peer (e.g. after repeated RPC failures).
    pub fn remove(&mut self, peer: &PeerId) {
        if let Some(index) = self.bucket_index(peer) {
            self.buckets[index].retain(|p| p != peer);
        }
    }

    /// Whether the peer is present.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.bucket_index(peer)
            .is_some_and(|i| self.buckets[i].contains(peer))
    }

    /// Total number of peers across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// True if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `n` known peers closest to `target` by XOR distance.
    pub fn closest(&self, target: &PeerId, n: usize) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.buckets.iter().flatten().copied().collect();
        // XOR distances compare lexicographically on the raw bytes.
        peers.sort_by_key(|p| p.distance(target));
        peers.truncate(n);
        peers
    }

    /// Bucket index for a peer: highest set bit of the XOR distance.
    /// `None` for the local node itself.
    fn bucket_index(&self, peer: &PeerId) -> Option<usize> {
        let distance = self.local.distance(peer);
        for (byte_idx, byte) in distance.iter().enumerate() {
            if *byte != 0 {
                let bit = 7 - byte.leading_zeros() as usize;
                return Some((31 - byte_idx) * 8 + bit);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(data: &[u8]) -> PeerId {
        PeerId::from_data(data)
    }

    #[test]
    fn test_insert_and_contains() {
        let mut table = RoutingTable::new(peer(b"local"), 20);
        let p = peer(b"remote");
        assert!(table.insert(p));
        assert!(table.contains(&p));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_rejects_self_and_duplicates() {
        let local = peer(b"local");
        let mut table = RoutingTable::new(local, 20);
        assert!(!table.insert(local));
        let p = peer(b"remote");
        assert!(table.insert(p));
        assert!(!table.insert(p));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_full_bucket_keeps_existing_entries() {
        let local = PeerId::from([0u8; 32]);
        let mut table = RoutingTable::new(local, 2);
        // All these share the top distance bit, so they hit the same bucket.
        let a = PeerId::from({
            let mut b = [0u8; 32];
            b[0] = 0x80;
            b
        });
        let b = PeerId::from({
            let mut b = [0u8; 32];
            b[0] = 0x81;
            b
        });
        let c = PeerId::from({
            let mut b = [0u8; 32];
            b[0] = 0x82;
            b
        });
        assert!(table.insert(a));
        assert!(table.insert(b));
        assert!(!table.insert(c));
        assert!(table.contains(&a));
        assert!(!table.contains(&c));
    }

    #[test]
    fn test_remove() {
        let mut table = RoutingTable::new(peer(b"local"), 20);
        let p = peer(b"remote");
        table.insert(p);
        table.remove(&p);
        assert!(!table.contains(&p));
    }

    #[test]
    fn test_closest_orders_by_xor_distance() {
        let local = peer(b"local");
        let mut table = RoutingTable::new(local, 20);
        let peers: Vec<PeerId> = (0..10u8).map(|i| peer(&[i])).collect();
        for p in &peers {
            table.insert(*p);
        }

        let target = peer(b"target");
        let closest = table.closest(&target, 3);
        assert_eq!(closest.len(), 3);

        let mut expected = peers.clone();
        expected.sort_by_key(|p| p.distance(&target));
        assert_eq!(closest, expected[..3]);
    }

    #[test]
    fn test_closest_caps_at_known_peers() {
        let mut table = RoutingTable::new(peer(b"local"), 20);
        table.insert(peer(b"only"));
        assert_eq!(table.closest(&peer(b"t"), 5).len(), 1);
    }
}
