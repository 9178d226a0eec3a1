//! Fjall-backed record storage.

use std::path::Path;

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tessera_types::RecordId;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{RecordStore, StoredRecord};

type Result<T> = std::result::Result<T, StoreError>;

/// Persistent record store backed by Fjall.
///
/// Records are postcard-encoded under their 32-byte content address in the
/// `dht_records` keyspace; the expiry rides inside the encoded record, so a
/// sweep is a full scan. Record counts here are bounded by the retention
/// window, not the write rate.
pub struct FjallStore {
    #[allow(dead_code)]
    db: Database,
    records: Keyspace,
}

impl FjallStore {
    /// Open a persistent store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_keyspaces(db)
    }

    /// Open a temporary store that is cleaned up on drop.
    ///
    /// Useful for tests.
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(std::io::Error::other)?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init_keyspaces(db)
    }

    fn init_keyspaces(db: Database) -> Result<Self> {
        let records = db.keyspace("dht_records", KeyspaceCreateOptions::default)?;
        Ok(Self { db, records })
    }

    fn read_record(&self, id: &RecordId) -> Result<Option<StoredRecord>> {
        match self.records.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for FjallStore {
    async fn put(&self, record: StoredRecord) -> Result<()> {
        let record = match self.read_record(&record.id)? {
            Some(existing) if existing.expires_at >= record.expires_at => return Ok(()),
            Some(existing) => StoredRecord {
                expires_at: record.expires_at,
                ..existing
            },
            None => record,
        };
        let value = postcard::to_allocvec(&record)?;
        self.records.insert(record.id.as_bytes(), value.as_slice())?;
        debug!(id = %record.id, size = record.value.len(), "stored record");
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<StoredRecord>> {
        self.read_record(&id)
    }

    async fn contains(&self, id: RecordId) -> Result<bool> {
        Ok(self.records.get(id.as_bytes())?.is_some())
    }

    async fn remove(&self, id: RecordId) -> Result<()> {
        self.records.remove(id.as_bytes())?;
        debug!(%id, "deleted record");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RecordId>> {
        let mut ids = Vec::new();
        for guard in self.records.iter() {
            let k = guard.key()?;
            let arr: [u8; 32] = k[..32].try_into().map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "record key is not 32 bytes")
            })?;
            ids.push(RecordId::from(arr));
        }
        Ok(ids)
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize> {
        let mut expired = Vec::new();
        for guard in self.records.iter() {
            let v = guard.value()?;
            let record: StoredRecord = postcard::from_bytes(&v)?;
            if record.expires_at <= now {
                expired.push(record.id);
            }
        }
        for id in &expired {
            self.records.remove(id.as_bytes())?;
        }
        if !expired.is_empty() {
            debug!(swept = expired.len(), "swept expired records");
        }
        Ok(expired.len())
    }

    async fn verify(&self, id: RecordId) -> Result<bool> {
        match self.read_record(&id)? {
            Some(record) => Ok(RecordId::from_data(&record.value) == id),
            None => Err(StoreError::NotFound(id)),
        }
    }
}
