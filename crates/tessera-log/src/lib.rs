//! Append-only transparency log.
//!
//! Events are committed to an incremental Merkle tree; every append gets
//! an inclusion proof, and periodic checkpoints of the root are signed by
//! a quorum of nodes. Entries are persisted; the tree is rebuilt from
//! them at startup.

mod entry;
mod error;
mod service;
mod store;

pub use entry::LogEntry;
pub use error::LogError;
pub use service::{verify_integrity, AppendReceipt, EventSubmission, TransparencyLogService};
pub use store::LogStore;
