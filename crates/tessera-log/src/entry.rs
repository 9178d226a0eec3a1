//! Log entry type.

use serde::{Deserialize, Serialize};
use tessera_types::RecordId;

/// A single entry in the transparency log.
///
/// Entries are immutable once appended and are the durable source of
/// truth: the Merkle tree is rebuilt from them at startup. The payload
/// itself lives in the distributed value store under `payload_ref`; the
/// log only commits to its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log, assigned at append time.
    pub index: u64,
    /// Unix timestamp (seconds) when the entry was appended.
    pub timestamp: u64,
    /// Caller-supplied event classification (e.g. `ballot_cast`).
    pub event_type: String,
    /// BLAKE3 hash of the event payload.
    pub payload_hash: RecordId,
    /// Content address under which the payload is archived.
    pub payload_ref: RecordId,
}

impl LogEntry {
    /// The Merkle leaf hash committing to this entry.
    ///
    /// Fixed-width fields plus a length-prefixed event type, so the
    /// encoding is unambiguous and reproducible by external verifiers.
    pub fn leaf_hash(&self) -> [u8; 32] {
        let mut data = Vec::with_capacity(84 + self.event_type.len());
        data.extend_from_slice(&self.index.to_be_bytes());
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        data.extend_from_slice(&(self.event_type.len() as u32).to_be_bytes());
        data.extend_from_slice(self.event_type.as_bytes());
        data.extend_from_slice(self.payload_hash.as_bytes());
        data.extend_from_slice(self.payload_ref.as_bytes());
        tessera_merkle::leaf_hash(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LogEntry {
        LogEntry {
            index: 3,
            timestamp: 1_700_000_000,
            event_type: "ballot_cast".to_string(),
            payload_hash: RecordId::from_data(b"payload"),
            payload_ref: RecordId::from_data(b"payload"),
        }
    }

    #[test]
    fn test_leaf_hash_is_deterministic() {
        assert_eq!(entry().leaf_hash(), entry().leaf_hash());
    }

    #[test]
    fn test_leaf_hash_commits_to_every_field() {
        let base = entry();

        let mut changed = base.clone();
        changed.index = 4;
        assert_ne!(base.leaf_hash(), changed.leaf_hash());

        let mut changed = base.clone();
        changed.event_type = "ballot_cast2".to_string();
        assert_ne!(base.leaf_hash(), changed.leaf_hash());

        let mut changed = base.clone();
        changed.payload_hash = RecordId::from_data(b"other");
        assert_ne!(base.leaf_hash(), changed.leaf_hash());
    }

    #[test]
    fn test_entry_postcard_roundtrip() {
        let e = entry();
        let bytes = postcard::to_allocvec(&e).unwrap();
        let decoded: LogEntry = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(e, decoded);
    }
}
