//! Independent audit tooling for the transparency log.
//!
//! An auditor holds the group public key and nothing else. The client
//! fetches entries, proofs, and signed checkpoints over the public HTTP
//! API; [`verify`] then checks the whole chain offline.

pub mod api;
mod client;
mod error;

pub use client::{verify, AuditClient, ProofBundle};
pub use error::AuditError;
