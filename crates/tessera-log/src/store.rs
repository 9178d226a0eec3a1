//! Storage backend for the transparency log (Fjall disk or pure in-memory).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tessera_types::SignedCheckpoint;

use crate::entry::LogEntry;
use crate::error::LogError;

type Result<T> = std::result::Result<T, LogError>;

/// Inner backend: either Fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        entries: Keyspace,
        checkpoints: Keyspace,
        idempotency: Keyspace,
    },
    Memory(Box<MemoryBackend>),
}

/// Pure in-memory storage.
struct MemoryBackend {
    /// index → serialized LogEntry.
    entries: RwLock<BTreeMap<u64, Vec<u8>>>,
    /// tree_size → serialized SignedCheckpoint.
    checkpoints: RwLock<BTreeMap<u64, Vec<u8>>>,
    /// idempotency key → leaf index.
    idempotency: RwLock<HashMap<String, u64>>,
}

/// Storage backend for log entries, signed checkpoints, and idempotency
/// keys.
///
/// Entries and checkpoints are keyed big-endian so Fjall's lexicographic
/// iteration order matches numeric order.
pub struct LogStore {
    backend: Backend,
}

fn storage_err(e: impl std::fmt::Display) -> LogError {
    LogError::Storage(e.to_string())
}

impl LogStore {
    /// Open a persistent store at the given path (Fjall backend).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open().map_err(storage_err)?;
        let backend = Self::init_fjall(db)?;
        Ok(Self { backend })
    }

    /// Open a temporary store backed by Fjall (cleaned up on drop).
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(storage_err)?;
        let db = Database::builder(tmp.path())
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        let backend = Self::init_fjall(db)?;
        Ok(Self { backend })
    }

    /// Create a pure in-memory store.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Box::new(MemoryBackend {
                entries: RwLock::new(BTreeMap::new()),
                checkpoints: RwLock::new(BTreeMap::new()),
                idempotency: RwLock::new(HashMap::new()),
            })),
        }
    }

    fn init_fjall(db: Database) -> Result<Backend> {
        let entries = db
            .keyspace("log_entries", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        let checkpoints = db
            .keyspace("log_checkpoints", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        let idempotency = db
            .keyspace("log_idempotency", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        Ok(Backend::Fjall {
            db,
            entries,
            checkpoints,
            idempotency,
        })
    }

    // ----- Entries -----

    /// Store a log entry under its index. Entries are never overwritten
    /// or deleted.
    pub fn put_entry(&self, entry: &LogEntry) -> Result<()> {
        let bytes = postcard::to_allocvec(entry)?;
        match &self.backend {
            Backend::Fjall { entries, .. } => {
                entries
                    .insert(entry.index.to_be_bytes(), bytes)
                    .map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.entries
                    .write()
                    .expect("lock poisoned")
                    .insert(entry.index, bytes);
            }
        }
        Ok(())
    }

    /// Retrieve a log entry by index.
    pub fn get_entry(&self, index: u64) -> Result<Option<LogEntry>> {
        let bytes = match &self.backend {
            Backend::Fjall { entries, .. } => entries
                .get(index.to_be_bytes())
                .map_err(storage_err)?
                .map(|v| v.to_vec()),
            Backend::Memory(m) => m
                .entries
                .read()
                .expect("lock poisoned")
                .get(&index)
                .cloned(),
        };
        match bytes {
            Some(b) => Ok(Some(postcard::from_bytes(&b)?)),
            None => Ok(None),
        }
    }

    /// All entries in index order. Used to rebuild the Merkle tree at
    /// startup.
    pub fn entries_in_order(&self) -> Result<Vec<LogEntry>> {
        let mut out = Vec::new();
        match &self.backend {
            Backend::Fjall { entries, .. } => {
                for guard in entries.iter() {
                    let v = guard.value().map_err(storage_err)?;
                    out.push(postcard::from_bytes(&v)?);
                }
            }
            Backend::Memory(m) => {
                for bytes in m.entries.read().expect("lock poisoned").values() {
                    out.push(postcard::from_bytes(bytes)?);
                }
            }
        }
        Ok(out)
    }

    // ----- Idempotency keys -----

    /// Record that `key` produced the entry at `index`.
    pub fn put_idempotency(&self, key: &str, index: u64) -> Result<()> {
        match &self.backend {
            Backend::Fjall { idempotency, .. } => {
                idempotency
                    .insert(key.as_bytes(), index.to_be_bytes())
                    .map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.idempotency
                    .write()
                    .expect("lock poisoned")
                    .insert(key.to_string(), index);
            }
        }
        Ok(())
    }

    /// Look up the leaf index a key was first appended under.
    pub fn get_idempotency(&self, key: &str) -> Result<Option<u64>> {
        match &self.backend {
            Backend::Fjall { idempotency, .. } => {
                match idempotency.get(key.as_bytes()).map_err(storage_err)? {
                    Some(bytes) => {
                        let arr: [u8; 8] = bytes[..8]
                            .try_into()
                            .map_err(|_| LogError::Storage("bad idempotency value".into()))?;
                        Ok(Some(u64::from_be_bytes(arr)))
                    }
                    None => Ok(None),
                }
            }
            Backend::Memory(m) => Ok(m
                .idempotency
                .read()
                .expect("lock poisoned")
                .get(key)
                .copied()),
        }
    }

    // ----- Signed checkpoints -----

    /// Store a signed checkpoint under its tree size.
    pub fn put_checkpoint(&self, checkpoint: &SignedCheckpoint) -> Result<()> {
        let bytes = postcard::to_allocvec(checkpoint)?;
        match &self.backend {
            Backend::Fjall { checkpoints, .. } => {
                checkpoints
                    .insert(checkpoint.head.tree_size.to_be_bytes(), bytes)
                    .map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.checkpoints
                    .write()
                    .expect("lock poisoned")
                    .insert(checkpoint.head.tree_size, bytes);
            }
        }
        Ok(())
    }

    /// Retrieve the signed checkpoint at a specific tree size.
    pub fn get_checkpoint(&self, tree_size: u64) -> Result<Option<SignedCheckpoint>> {
        let bytes = match &self.backend {
            Backend::Fjall { checkpoints, .. } => checkpoints
                .get(tree_size.to_be_bytes())
                .map_err(storage_err)?
                .map(|v| v.to_vec()),
            Backend::Memory(m) => m
                .checkpoints
                .read()
                .expect("lock poisoned")
                .get(&tree_size)
                .cloned(),
        };
        match bytes {
            Some(b) => Ok(Some(postcard::from_bytes(&b)?)),
            None => Ok(None),
        }
    }

    /// The signed checkpoint with the largest tree size, if any.
    pub fn latest_checkpoint(&self) -> Result<Option<SignedCheckpoint>> {
        let bytes = match &self.backend {
            Backend::Fjall { checkpoints, .. } => match checkpoints.last_key_value() {
                Some(guard) => {
                    let (_, v) = guard.into_inner().map_err(storage_err)?;
                    Some(v.to_vec())
                }
                None => None,
            },
            Backend::Memory(m) => m
                .checkpoints
                .read()
                .expect("lock poisoned")
                .last_key_value()
                .map(|(_, v)| v.clone()),
        };
        match bytes {
            Some(b) => Ok(Some(postcard::from_bytes(&b)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use tessera_types::{CheckpointHead, RecordId, SignatureBytes};

    use super::*;

    fn entry(index: u64) -> LogEntry {
        LogEntry {
            index,
            timestamp: 1_700_000_000 + index,
            event_type: "ballot_cast".to_string(),
            payload_hash: RecordId::from_data(&index.to_be_bytes()),
            payload_ref: RecordId::from_data(&index.to_be_bytes()),
        }
    }

    fn checkpoint(tree_size: u64) -> SignedCheckpoint {
        SignedCheckpoint {
            head: CheckpointHead {
                root_hash: [7u8; 32],
                tree_size,
                timestamp: 1_700_000_000,
            },
            signature: SignatureBytes::new([9u8; 96]),
            signer_set: vec![1, 2, 3],
        }
    }

    fn both_backends() -> Vec<LogStore> {
        vec![LogStore::in_memory(), LogStore::open_temporary().unwrap()]
    }

    #[test]
    fn test_entry_put_get_roundtrip() {
        for store in both_backends() {
            let e = entry(0);
            store.put_entry(&e).unwrap();
            assert_eq!(store.get_entry(0).unwrap(), Some(e));
            assert_eq!(store.get_entry(1).unwrap(), None);
        }
    }

    #[test]
    fn test_entries_in_order_follows_index_order() {
        for store in both_backends() {
            // Insert out of order; 300 crosses a big-endian byte boundary.
            for index in [300u64, 5, 0, 256] {
                store.put_entry(&entry(index)).unwrap();
            }
            let indices: Vec<u64> = store
                .entries_in_order()
                .unwrap()
                .iter()
                .map(|e| e.index)
                .collect();
            assert_eq!(indices, vec![0, 5, 256, 300]);
        }
    }

    #[test]
    fn test_idempotency_roundtrip() {
        for store in both_backends() {
            assert_eq!(store.get_idempotency("k1").unwrap(), None);
            store.put_idempotency("k1", 42).unwrap();
            assert_eq!(store.get_idempotency("k1").unwrap(), Some(42));
        }
    }

    #[test]
    fn test_checkpoint_lookup_and_latest() {
        for store in both_backends() {
            assert!(store.latest_checkpoint().unwrap().is_none());
            store.put_checkpoint(&checkpoint(10)).unwrap();
            store.put_checkpoint(&checkpoint(300)).unwrap();
            store.put_checkpoint(&checkpoint(20)).unwrap();

            assert_eq!(store.get_checkpoint(10).unwrap(), Some(checkpoint(10)));
            assert_eq!(store.get_checkpoint(11).unwrap(), None);
            assert_eq!(
                store.latest_checkpoint().unwrap().map(|c| c.head.tree_size),
                Some(300)
            );
        }
    }

    #[test]
    fn test_fjall_persistence_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let store = LogStore::open(&path).unwrap();
            store.put_entry(&entry(0)).unwrap();
            store.put_idempotency("key", 0).unwrap();
            store.put_checkpoint(&checkpoint(1)).unwrap();
        }
        {
            let store = LogStore::open(&path).unwrap();
            assert_eq!(store.get_entry(0).unwrap(), Some(entry(0)));
            assert_eq!(store.get_idempotency("key").unwrap(), Some(0));
            assert_eq!(store.get_checkpoint(1).unwrap(), Some(checkpoint(1)));
        }
    }
}
