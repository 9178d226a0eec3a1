//! Incremental Merkle tree over an append-only node arena.
//!
//! Tree shape follows RFC 6962: a tree over `n` leaves splits at `k`, the
//! largest power of two strictly below `n`. Leaves are hashed by the caller
//! (see [`leaf_hash`]); interior nodes are `blake3(0x01 || left || right)`.
//!
//! The tree is maintained as a forest of perfect subtrees ("peaks"), one per
//! set bit of the leaf count. An append pushes one leaf node and merges
//! complete pairs upward, so existing nodes are never touched and historical
//! roots stay recomputable from the arena.

use crate::error::MerkleError;
use crate::proof::InclusionProof;

type Result<T> = std::result::Result<T, MerkleError>;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash a leaf's content: `blake3(0x00 || data)`.
///
/// The prefix keeps leaf hashes out of the interior-node hash domain, so no
/// crafted payload can masquerade as an internal node.
pub fn leaf_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash two child hashes into their parent: `blake3(0x01 || left || right)`.
pub(crate) fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// One node in the arena. Leaves have no children.
#[derive(Debug, Clone, Copy)]
pub struct MerkleNode {
    /// BLAKE3 hash of this subtree.
    pub hash: [u8; 32],
    /// Arena index of the left child, if any.
    pub left: Option<u32>,
    /// Arena index of the right child, if any.
    pub right: Option<u32>,
}

/// Append-only Merkle tree.
///
/// Not internally synchronized; the log service wraps it in a `RwLock` with
/// a single writer section.
pub struct MerkleTree {
    nodes: Vec<MerkleNode>,
    /// `levels[h]` holds arena indices of every complete subtree root of
    /// height `h`, left to right. `levels[0]` is the leaves.
    levels: Vec<Vec<u32>>,
    size: u64,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            levels: vec![Vec::new()],
            size: 0,
        }
    }

    /// Number of leaves.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append a leaf hash, returning its leaf index.
    ///
    /// Amortized O(log n): one arena push for the leaf plus one per complete
    /// pair that the append closes.
    pub fn append(&mut self, leaf: [u8; 32]) -> u64 {
        let index = self.size;
        let leaf_idx = self.push_node(MerkleNode {
            hash: leaf,
            left: None,
            right: None,
        });
        self.levels[0].push(leaf_idx);
        self.size += 1;

        // Merge complete pairs upward. Level h has a new complete subtree
        // exactly when its entry count just became even.
        let mut h = 0;
        while self.levels[h].len() % 2 == 0 && !self.levels[h].is_empty() {
            let level = &self.levels[h];
            let left = level[level.len() - 2];
            let right = level[level.len() - 1];
            let hash = node_hash(&self.nodes[left as usize].hash, &self.nodes[right as usize].hash);
            let parent = self.push_node(MerkleNode {
                hash,
                left: Some(left),
                right: Some(right),
            });
            if self.levels.len() == h + 1 {
                self.levels.push(Vec::new());
            }
            self.levels[h + 1].push(parent);
            h += 1;
        }

        index
    }

    /// Root over all current leaves.
    pub fn root(&self) -> Result<[u8; 32]> {
        self.root_at(self.size)
    }

    /// Root over the first `tree_size` leaves, as it was when the tree had
    /// exactly that many.
    ///
    /// Perfect aligned subtrees are arena lookups; only the ragged right
    /// edge is recomputed, so this is O(log n) hashes.
    pub fn root_at(&self, tree_size: u64) -> Result<[u8; 32]> {
        if tree_size == 0 || tree_size > self.size {
            return Err(MerkleError::NotFound {
                requested: tree_size,
                size: self.size,
            });
        }
        Ok(self.range_root(0, tree_size))
    }

    /// Inclusion proof for `leaf_index` against the current root.
    pub fn proof(&self, leaf_index: u64) -> Result<InclusionProof> {
        self.proof_at(leaf_index, self.size)
    }

    /// Inclusion proof for `leaf_index` against the root over the first
    /// `tree_size` leaves (a historical checkpoint).
    pub fn proof_at(&self, leaf_index: u64, tree_size: u64) -> Result<InclusionProof> {
        if tree_size > self.size || leaf_index >= tree_size {
            return Err(MerkleError::NotFound {
                requested: leaf_index,
                size: tree_size.min(self.size),
            });
        }
        let mut path = Vec::new();
        self.audit_path(leaf_index, 0, tree_size, &mut path);
        Ok(InclusionProof {
            leaf_index,
            tree_size,
            path,
        })
    }

    // ----- Internal -----

    fn push_node(&mut self, node: MerkleNode) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        idx
    }

    /// Root of the `len` leaves starting at `lo`.
    ///
    /// Callers maintain the invariant that `lo` is aligned to the largest
    /// power of two not above `len`, so every perfect range resolves to a
    /// stored subtree root.
    fn range_root(&self, lo: u64, len: u64) -> [u8; 32] {
        debug_assert!(len >= 1);
        if len.is_power_of_two() && lo % len == 0 {
            let h = len.trailing_zeros() as usize;
            let idx = self.levels[h][(lo >> h) as usize];
            return self.nodes[idx as usize].hash;
        }
        let k = largest_power_of_two_below(len);
        let left = self.range_root(lo, k);
        let right = self.range_root(lo + k, len - k);
        node_hash(&left, &right)
    }

    /// RFC 6962 audit path for leaf `m` within the `len` leaves at `lo`,
    /// appended bottom-up.
    fn audit_path(&self, m: u64, lo: u64, len: u64, out: &mut Vec<[u8; 32]>) {
        if len == 1 {
            return;
        }
        let k = largest_power_of_two_below(len);
        if m < k {
            self.audit_path(m, lo, k, out);
            out.push(self.range_root(lo + k, len - k));
        } else {
            self.audit_path(m - k, lo + k, len - k, out);
            out.push(self.range_root(lo, k));
        }
    }
}

/// Largest power of two strictly less than `n` (RFC 6962 split point).
fn largest_power_of_two_below(n: u64) -> u64 {
    debug_assert!(n >= 2);
    let p = n.next_power_of_two();
    if p == n { n / 2 } else { p / 2 }
}
