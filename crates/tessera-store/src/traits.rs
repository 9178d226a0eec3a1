//! Core trait and types for record storage.

use serde::{Deserialize, Serialize};
use tessera_types::RecordId;

use crate::error::StoreError;

/// A content-addressed record with its retention deadline.
///
/// `id == blake3(value)` is the caller's responsibility to establish before
/// storing; backends verify it on [`RecordStore::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Content address of `value`.
    pub id: RecordId,
    /// The record bytes.
    pub value: Vec<u8>,
    /// Unix timestamp (seconds) after which the record may be swept.
    pub expires_at: u64,
}

impl StoredRecord {
    /// Build a record from its bytes, deriving the content address.
    pub fn new(value: Vec<u8>, expires_at: u64) -> Self {
        Self {
            id: RecordId::from_data(&value),
            value,
            expires_at,
        }
    }
}

/// Trait for storing and retrieving retention-scoped records.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Records are never evicted for capacity inside their retention window;
/// the only removal paths are [`RecordStore::sweep_expired`] and explicit
/// [`RecordStore::remove`].
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a record. Re-storing the same content address is a no-op
    /// overwrite (content addressing makes the value identical), except
    /// that a later expiry extends the retention deadline.
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError>;

    /// Retrieve a record by ID. Returns `None` if not found.
    async fn get(&self, id: RecordId) -> Result<Option<StoredRecord>, StoreError>;

    /// Check whether a record exists.
    async fn contains(&self, id: RecordId) -> Result<bool, StoreError>;

    /// Delete a record by ID.
    async fn remove(&self, id: RecordId) -> Result<(), StoreError>;

    /// List all stored record IDs.
    async fn list(&self) -> Result<Vec<RecordId>, StoreError>;

    /// Remove every record whose retention deadline is at or before `now`.
    /// Returns the number of records removed.
    async fn sweep_expired(&self, now: u64) -> Result<usize, StoreError>;

    /// Verify record integrity by re-hashing and comparing to the ID.
    async fn verify(&self, id: RecordId) -> Result<bool, StoreError>;
}
