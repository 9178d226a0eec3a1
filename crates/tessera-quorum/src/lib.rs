//! Checkpoint signing quorum.
//!
//! Collects BLS signature shares from the signer set, combines them once
//! the two-thirds-plus-one threshold is met, and publishes signed
//! checkpoints on the node event channel.

mod coordinator;
mod error;
mod session;

pub use coordinator::{start, threshold_for, QuorumConfig, QuorumHandle};
pub use error::QuorumError;
pub use session::{SessionState, SessionStatus};
