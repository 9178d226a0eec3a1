//! Record storage trait and backend implementations.
//!
//! This crate defines the [`RecordStore`] trait for persisting
//! content-addressed, retention-scoped records, along with two concrete
//! backends:
//!
//! - [`MemoryStore`] — in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FjallStore`] — persistent storage on Fjall.

mod error;
mod fjall_store;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use fjall_store::FjallStore;
pub use memory_store::MemoryStore;
pub use traits::{RecordStore, StoredRecord};
