//! The transparency log service.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tessera_crypto::GroupPublicKey;
use tessera_merkle::{verify_proof, InclusionProof, MerkleTree};
use tessera_types::{now_unix, CheckpointHead, RecordId, SignedCheckpoint};
use tracing::{debug, info, warn};

use crate::entry::LogEntry;
use crate::error::LogError;
use crate::store::LogStore;

type Result<T> = std::result::Result<T, LogError>;

/// An event offered for appending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubmission {
    /// Event classification, non-empty.
    pub event_type: String,
    /// Opaque event payload.
    pub payload: Vec<u8>,
    /// Caller-chosen key for at-most-once semantics, non-empty.
    pub idempotency_key: String,
}

/// What the caller gets back for an accepted (or replayed) append.
///
/// The proof is provisional: it targets the current root, which has not
/// necessarily been co-signed yet. Durable verification uses a proof
/// against a signed checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// Index of the appended leaf.
    pub leaf_index: u64,
    /// Tree size after the append.
    pub tree_size: u64,
    /// Root over `tree_size` leaves.
    pub root_hash: [u8; 32],
    /// Inclusion proof for the leaf against `root_hash`.
    pub proof: InclusionProof,
}

/// Append-only transparency log over a Merkle tree.
///
/// Appends are serialized by the tree's write lock; proofs and roots read
/// the committed tree concurrently. Entries are the durable truth — the
/// in-memory tree is rebuilt from them when the service opens.
pub struct TransparencyLogService {
    store: LogStore,
    tree: RwLock<MerkleTree>,
    max_payload_bytes: usize,
}

impl TransparencyLogService {
    /// Open the service over a store, replaying persisted entries to
    /// rebuild the Merkle tree.
    pub fn open(store: LogStore, max_payload_bytes: usize) -> Result<Self> {
        let mut tree = MerkleTree::new();
        for entry in store.entries_in_order()? {
            if entry.index != tree.size() {
                return Err(LogError::Storage(format!(
                    "entry index {} does not match rebuild position {}",
                    entry.index,
                    tree.size()
                )));
            }
            tree.append(entry.leaf_hash());
        }
        if tree.size() > 0 {
            info!(tree_size = tree.size(), "rebuilt log tree from storage");
        }
        Ok(Self {
            store,
            tree: RwLock::new(tree),
            max_payload_bytes,
        })
    }

    /// Append an event, or replay the receipt if its idempotency key has
    /// been seen before.
    pub fn append_event(&self, submission: EventSubmission) -> Result<AppendReceipt> {
        self.validate(&submission)?;

        // Writer section: idempotency check and append must be atomic, or
        // two submissions with the same key could both pass the check.
        let mut tree = self.tree.write().expect("lock poisoned");

        if let Some(leaf_index) = self.store.get_idempotency(&submission.idempotency_key)? {
            debug!(leaf_index, "idempotency key replay, no new leaf");
            return self.receipt_for(&tree, leaf_index);
        }

        let payload_hash = RecordId::from_data(&submission.payload);
        let entry = LogEntry {
            index: tree.size(),
            timestamp: now_unix(),
            event_type: submission.event_type,
            payload_hash,
            payload_ref: payload_hash,
        };

        // Persist before touching the tree: a crash in between is healed
        // by the rebuild, which replays exactly the persisted entries.
        self.store.put_entry(&entry)?;
        self.store
            .put_idempotency(&submission.idempotency_key, entry.index)?;
        let leaf_index = tree.append(entry.leaf_hash());

        debug!(
            leaf_index,
            event_type = %entry.event_type,
            "appended log entry"
        );
        self.receipt_for(&tree, leaf_index)
    }

    /// Fetch a persisted entry by leaf index.
    pub fn entry(&self, leaf_index: u64) -> Result<Option<LogEntry>> {
        self.store.get_entry(leaf_index)
    }

    /// Current number of leaves.
    pub fn tree_size(&self) -> u64 {
        self.tree.read().expect("lock poisoned").size()
    }

    /// Current root. Fails on an empty log.
    pub fn root(&self) -> Result<[u8; 32]> {
        Ok(self.tree.read().expect("lock poisoned").root()?)
    }

    /// Inclusion proof against the current root.
    pub fn proof(&self, leaf_index: u64) -> Result<InclusionProof> {
        Ok(self.tree.read().expect("lock poisoned").proof(leaf_index)?)
    }

    /// Snapshot the current `(root, size, now)` for signing.
    pub fn checkpoint_head(&self) -> Result<CheckpointHead> {
        let tree = self.tree.read().expect("lock poisoned");
        Ok(CheckpointHead {
            root_hash: tree.root()?,
            tree_size: tree.size(),
            timestamp: now_unix(),
        })
    }

    /// Root over the first `tree_size` leaves, for countersigning peers'
    /// checkpoint heads.
    pub fn root_at(&self, tree_size: u64) -> Result<[u8; 32]> {
        Ok(self.tree.read().expect("lock poisoned").root_at(tree_size)?)
    }

    /// Persist a signed checkpoint after confirming its root is
    /// reproducible from the local tree.
    ///
    /// A mismatch means this node's log diverged from what the quorum
    /// signed — that is surfaced, never silently stored.
    pub fn record_signed_checkpoint(&self, checkpoint: &SignedCheckpoint) -> Result<()> {
        let local_root = self.root_at(checkpoint.head.tree_size)?;
        if local_root != checkpoint.head.root_hash {
            warn!(
                tree_size = checkpoint.head.tree_size,
                "refusing checkpoint whose root does not match the local tree"
            );
            return Err(LogError::RootMismatch {
                tree_size: checkpoint.head.tree_size,
            });
        }
        self.store.put_checkpoint(checkpoint)?;
        info!(
            tree_size = checkpoint.head.tree_size,
            signers = checkpoint.signer_set.len(),
            "recorded signed checkpoint"
        );
        Ok(())
    }

    /// The signed checkpoint at an exact tree size.
    pub fn signed_checkpoint(&self, tree_size: u64) -> Result<Option<SignedCheckpoint>> {
        self.store.get_checkpoint(tree_size)
    }

    /// The most recent signed checkpoint.
    pub fn latest_signed_checkpoint(&self) -> Result<Option<SignedCheckpoint>> {
        self.store.latest_checkpoint()
    }

    /// Inclusion proof against the latest signed checkpoint covering the
    /// leaf, paired with that checkpoint.
    pub fn proof_for_audit(
        &self,
        leaf_index: u64,
    ) -> Result<(InclusionProof, SignedCheckpoint)> {
        let checkpoint = self
            .latest_signed_checkpoint()?
            .filter(|cp| leaf_index < cp.head.tree_size)
            .ok_or_else(|| {
                LogError::NotFound(format!("no signed checkpoint covers leaf {leaf_index}"))
            })?;
        let tree = self.tree.read().expect("lock poisoned");
        let proof = tree.proof_at(leaf_index, checkpoint.head.tree_size)?;
        Ok((proof, checkpoint))
    }

    // ----- Internal -----

    fn validate(&self, submission: &EventSubmission) -> Result<()> {
        if submission.event_type.is_empty() {
            return Err(LogError::Validation("event_type must not be empty".into()));
        }
        if submission.idempotency_key.is_empty() {
            return Err(LogError::Validation(
                "idempotency_key must not be empty".into(),
            ));
        }
        if submission.payload.len() > self.max_payload_bytes {
            return Err(LogError::Validation(format!(
                "payload of {} bytes exceeds cap of {}",
                submission.payload.len(),
                self.max_payload_bytes
            )));
        }
        Ok(())
    }

    fn receipt_for(&self, tree: &MerkleTree, leaf_index: u64) -> Result<AppendReceipt> {
        Ok(AppendReceipt {
            leaf_index,
            tree_size: tree.size(),
            root_hash: tree.root()?,
            proof: tree.proof(leaf_index)?,
        })
    }
}

/// Verify that an event is covered by a quorum-signed checkpoint.
///
/// Checks the Merkle path from `event_hash` to the checkpoint's root and
/// the threshold signature over the checkpoint head. One boolean: any
/// failing link makes the whole claim false.
pub fn verify_integrity(
    event_hash: &[u8; 32],
    proof: &InclusionProof,
    checkpoint: &SignedCheckpoint,
    group_key: &GroupPublicKey,
) -> bool {
    proof.tree_size == checkpoint.head.tree_size
        && checkpoint.verify(group_key)
        && verify_proof(event_hash, proof, &checkpoint.head.root_hash)
}

#[cfg(test)]
mod tests {
    use tessera_crypto::{combine, generate_shares, PartialSignature};
    use tessera_types::SignatureBytes;

    use super::*;

    const MAX_PAYLOAD: usize = 64 * 1024;

    fn service() -> TransparencyLogService {
        TransparencyLogService::open(LogStore::in_memory(), MAX_PAYLOAD).unwrap()
    }

    fn submission(n: u64) -> EventSubmission {
        EventSubmission {
            event_type: "ballot_cast".to_string(),
            payload: format!("payload {n}").into_bytes(),
            idempotency_key: format!("key-{n}"),
        }
    }

    #[test]
    fn test_append_returns_verifiable_receipt() {
        let log = service();
        for n in 0..5 {
            log.append_event(submission(n)).unwrap();
        }
        let receipt = log.append_event(submission(5)).unwrap();
        assert_eq!(receipt.leaf_index, 5);
        assert_eq!(receipt.tree_size, 6);

        let leaf = log.entry(5).unwrap().unwrap().leaf_hash();
        assert!(verify_proof(&leaf, &receipt.proof, &receipt.root_hash));
    }

    #[test]
    fn test_validation_rejects_bad_submissions() {
        let log = service();

        let mut s = submission(0);
        s.event_type.clear();
        assert!(matches!(
            log.append_event(s),
            Err(LogError::Validation(_))
        ));

        let mut s = submission(0);
        s.idempotency_key.clear();
        assert!(matches!(
            log.append_event(s),
            Err(LogError::Validation(_))
        ));

        let mut s = submission(0);
        s.payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            log.append_event(s),
            Err(LogError::Validation(_))
        ));

        assert_eq!(log.tree_size(), 0, "nothing may be appended on rejection");
    }

    #[test]
    fn test_idempotent_replay_returns_original_index() {
        let log = service();
        let first = log.append_event(submission(0)).unwrap();
        log.append_event(submission(1)).unwrap();

        let replay = log.append_event(submission(0)).unwrap();
        assert_eq!(replay.leaf_index, first.leaf_index);
        assert_eq!(log.tree_size(), 2, "replay must not append a new leaf");

        // The replayed proof is against the current, larger tree.
        let leaf = log.entry(0).unwrap().unwrap().leaf_hash();
        assert!(verify_proof(&leaf, &replay.proof, &replay.root_hash));
    }

    #[test]
    fn test_checkpoint_head_fails_on_empty_log() {
        let log = service();
        assert!(log.checkpoint_head().is_err());
    }

    #[test]
    fn test_rebuild_reproduces_root_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().to_path_buf();

        let root = {
            let log =
                TransparencyLogService::open(LogStore::open(&path).unwrap(), MAX_PAYLOAD).unwrap();
            for n in 0..20 {
                log.append_event(submission(n)).unwrap();
            }
            log.root().unwrap()
        };

        let log =
            TransparencyLogService::open(LogStore::open(&path).unwrap(), MAX_PAYLOAD).unwrap();
        assert_eq!(log.tree_size(), 20);
        assert_eq!(log.root().unwrap(), root);

        // And the rebuilt tree keeps accepting appends.
        let receipt = log.append_event(submission(20)).unwrap();
        assert_eq!(receipt.leaf_index, 20);
    }

    #[test]
    fn test_record_checkpoint_rejects_foreign_root() {
        let log = service();
        for n in 0..3 {
            log.append_event(submission(n)).unwrap();
        }
        let forged = SignedCheckpoint {
            head: CheckpointHead {
                root_hash: [0xaa; 32],
                tree_size: 3,
                timestamp: now_unix(),
            },
            signature: SignatureBytes::new([0u8; 96]),
            signer_set: vec![1, 2],
        };
        assert!(matches!(
            log.record_signed_checkpoint(&forged),
            Err(LogError::RootMismatch { tree_size: 3 })
        ));
        assert!(log.latest_signed_checkpoint().unwrap().is_none());
    }

    fn sign_head(head: CheckpointHead) -> (SignedCheckpoint, tessera_crypto::GroupPublicKey) {
        let out = generate_shares(4, 3, &mut rand::thread_rng()).unwrap();
        let msg = head.signing_bytes();
        let partials: Vec<PartialSignature> = out.secret_shares[..3]
            .iter()
            .map(|s| s.sign(&msg))
            .collect();
        let sig = combine(&partials, 3).unwrap();
        let checkpoint = SignedCheckpoint {
            head,
            signature: SignatureBytes::new(sig.to_bytes()),
            signer_set: vec![1, 2, 3],
        };
        (checkpoint, out.group_key)
    }

    #[test]
    fn test_verify_integrity_end_to_end() {
        let log = service();
        for n in 0..7 {
            log.append_event(submission(n)).unwrap();
        }

        let head = log.checkpoint_head().unwrap();
        let (checkpoint, group_key) = sign_head(head);
        log.record_signed_checkpoint(&checkpoint).unwrap();

        // More appends after the checkpoint must not affect verification.
        for n in 7..10 {
            log.append_event(submission(n)).unwrap();
        }

        let (proof, cp) = log.proof_for_audit(4).unwrap();
        assert_eq!(cp.head.tree_size, 7);
        let leaf = log.entry(4).unwrap().unwrap().leaf_hash();
        assert!(verify_integrity(&leaf, &proof, &cp, &group_key));

        // Wrong event hash fails.
        assert!(!verify_integrity(&[0u8; 32], &proof, &cp, &group_key));

        // Signature from a different signer set fails.
        let (_, other_key) = sign_head(cp.head);
        assert!(!verify_integrity(&leaf, &proof, &cp, &other_key));
    }

    #[test]
    fn test_proof_for_audit_requires_covering_checkpoint() {
        let log = service();
        for n in 0..3 {
            log.append_event(submission(n)).unwrap();
        }
        // No signed checkpoint yet.
        assert!(matches!(
            log.proof_for_audit(0),
            Err(LogError::NotFound(_))
        ));

        let (checkpoint, _) = sign_head(log.checkpoint_head().unwrap());
        log.record_signed_checkpoint(&checkpoint).unwrap();
        log.append_event(submission(3)).unwrap();

        assert!(log.proof_for_audit(2).is_ok());
        // Leaf 3 is newer than the latest signed checkpoint.
        assert!(matches!(
            log.proof_for_audit(3),
            Err(LogError::NotFound(_))
        ));
    }
}
