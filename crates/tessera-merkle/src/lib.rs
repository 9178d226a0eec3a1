//! Append-only Merkle log tree for Tessera.
//!
//! An incremental RFC 6962-shaped tree: O(log n) amortized appends into a
//! node arena, current and historical roots, inclusion proofs, and a pure
//! verification function usable by clients that never see the tree.

mod error;
mod proof;
mod tree;

pub use error::MerkleError;
pub use proof::{verify_proof, InclusionProof};
pub use tree::{leaf_hash, MerkleNode, MerkleTree};
