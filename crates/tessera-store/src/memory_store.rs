//! In-memory record storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use tessera_types::RecordId;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{RecordStore, StoredRecord};

/// In-memory record store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for nodes configured to run in memory-only mode.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordId, StoredRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a reference to the inner map (for testing purposes).
    #[cfg(test)]
    pub(crate) fn inner(&self) -> &RwLock<HashMap<RecordId, StoredRecord>> {
        &self.records
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        let mut map = self.records.write().expect("lock poisoned");
        debug!(id = %record.id, size = record.value.len(), "storing record in memory");
        match map.get_mut(&record.id) {
            Some(existing) => {
                // Same content; only the retention deadline can move, and
                // only forward.
                existing.expires_at = existing.expires_at.max(record.expires_at);
            }
            None => {
                map.insert(record.id, record);
            }
        }
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<StoredRecord>, StoreError> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.get(&id).cloned())
    }

    async fn contains(&self, id: RecordId) -> Result<bool, StoreError> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.contains_key(&id))
    }

    async fn remove(&self, id: RecordId) -> Result<(), StoreError> {
        let mut map = self.records.write().expect("lock poisoned");
        map.remove(&id);
        debug!(%id, "deleted record from memory");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RecordId>, StoreError> {
        let map = self.records.read().expect("lock poisoned");
        Ok(map.keys().copied().collect())
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, StoreError> {
        let mut map = self.records.write().expect("lock poisoned");
        let before = map.len();
        map.retain(|_, record| record.expires_at > now);
        let swept = before - map.len();
        if swept > 0 {
            debug!(swept, "swept expired records from memory");
        }
        Ok(swept)
    }

    async fn verify(&self, id: RecordId) -> Result<bool, StoreError> {
        let map = self.records.read().expect("lock poisoned");
        match map.get(&id) {
            Some(record) => Ok(RecordId::from_data(&record.value) == id),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        let record = StoredRecord::new(b"ballot receipt".to_vec(), 100);

        store.put(record.clone()).await.unwrap();
        let result = store.get(record.id).await.unwrap();
        assert_eq!(result, Some(record));
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = MemoryStore::new();
        let id = RecordId::from_data(b"does not exist");
        assert_eq!(store.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_same_content_extends_expiry() {
        let store = MemoryStore::new();
        let early = StoredRecord::new(b"same bytes".to_vec(), 100);
        let late = StoredRecord::new(b"same bytes".to_vec(), 500);
        let id = early.id;

        store.put(late.clone()).await.unwrap();
        store.put(early).await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, 500, "expiry must never move backward");
    }

    #[tokio::test]
    async fn test_remove_then_get_returns_none() {
        let store = MemoryStore::new();
        let record = StoredRecord::new(b"to be deleted".to_vec(), 100);
        let id = record.id;

        store.put(record).await.unwrap();
        store.remove(id).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = MemoryStore::new();
        let expired = StoredRecord::new(b"old".to_vec(), 50);
        let live = StoredRecord::new(b"fresh".to_vec(), 200);
        store.put(expired.clone()).await.unwrap();
        store.put(live.clone()).await.unwrap();

        let swept = store.sweep_expired(100).await.unwrap();
        assert_eq!(swept, 1);
        assert!(store.get(expired.id).await.unwrap().is_none());
        assert!(store.get(live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_verify_detects_corruption() {
        let store = MemoryStore::new();
        let record = StoredRecord::new(b"original".to_vec(), 100);
        let id = record.id;
        store.put(record).await.unwrap();
        assert!(store.verify(id).await.unwrap());

        {
            let mut map = store.inner().write().unwrap();
            map.get_mut(&id).unwrap().value = b"tampered".to_vec();
        }
        assert!(!store.verify(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_nonexistent_returns_error() {
        let store = MemoryStore::new();
        let id = RecordId::from_data(b"missing");
        assert!(matches!(
            store.verify(id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_returns_all_ids() {
        let store = MemoryStore::new();
        let r1 = StoredRecord::new(b"one".to_vec(), 100);
        let r2 = StoredRecord::new(b"two".to_vec(), 100);
        store.put(r1.clone()).await.unwrap();
        store.put(r2.clone()).await.unwrap();

        let mut listed = store.list().await.unwrap();
        listed.sort();
        let mut expected = vec![r1.id, r2.id];
        expected.sort();
        assert_eq!(listed, expected);
    }
}
