//! Inclusion proofs and standalone verification.

use serde::{Deserialize, Serialize};

use crate::tree::node_hash;

/// An audit path proving that one leaf is covered by a root over
/// `tree_size` leaves.
///
/// `path` holds sibling subtree hashes bottom-up, the RFC 6962 audit path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Index of the proven leaf.
    pub leaf_index: u64,
    /// Number of leaves under the root this proof targets.
    pub tree_size: u64,
    /// Sibling hashes from the leaf up to the root.
    pub path: Vec<[u8; 32]>,
}

/// Verify an inclusion proof without access to the tree.
///
/// This is the RFC 9162 §2.1.3.2 algorithm: walk the path bottom-up,
/// tracking the leaf's position (`fnode`) and the last node's position
/// (`snode`) at the current level to decide on which side each sibling
/// joins. Accepts only if the path is consumed exactly and the recomputed
/// root matches.
pub fn verify_proof(
    leaf_hash: &[u8; 32],
    proof: &InclusionProof,
    expected_root: &[u8; 32],
) -> bool {
    if proof.leaf_index >= proof.tree_size || proof.tree_size == 0 {
        return false;
    }

    let mut fnode = proof.leaf_index;
    let mut snode = proof.tree_size - 1;
    let mut hash = *leaf_hash;

    for sibling in &proof.path {
        if snode == 0 {
            // Path longer than the tree is tall.
            return false;
        }
        if fnode & 1 == 1 || fnode == snode {
            hash = node_hash(sibling, &hash);
            if fnode & 1 == 0 {
                // Right-edge node with no right sibling at this level; skip
                // levels until it becomes a right child.
                loop {
                    fnode >>= 1;
                    snode >>= 1;
                    if fnode & 1 == 1 || fnode == 0 {
                        break;
                    }
                }
            }
        } else {
            hash = node_hash(&hash, sibling);
        }
        fnode >>= 1;
        snode >>= 1;
    }

    snode == 0 && hash == *expected_root
}
