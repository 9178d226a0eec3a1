//! Network protocol on iroh QUIC.
//!
//! This crate implements Tessera's network layer on top of [iroh] QUIC
//! connections:
//!
//! - [`TesseraMessage`] — the wire protocol (postcard-serialized).
//! - [`TesseraTransport`] — manages an iroh [`Endpoint`], connection
//!   pooling, and message send/receive.
//! - [`Rpc`] — the peer-request seam the DHT and quorum layers use, with
//!   [`TesseraRpc`] as the live implementation.
//!
//! [`Endpoint`]: iroh::Endpoint

mod error;
mod message;
mod rpc;
mod transport;

pub use error::NetError;
pub use message::{PeerEntry, RecordPayload, TesseraMessage};
pub use rpc::{FindValueResult, Rpc, TesseraRpc};
pub use transport::TesseraTransport;

use tessera_types::RecordId;

/// Default ALPN protocol identifier (no cluster secret).
pub const TESSERA_ALPN: &[u8] = b"tessera/0";

/// Derive a cluster-specific ALPN from a shared secret.
///
/// The ALPN is `tessera/0/<first 16 hex chars of blake3(secret)>`.
/// Nodes with different secrets get different ALPNs and cannot
/// establish QUIC connections to each other — the TLS handshake
/// itself rejects the mismatch before any application data is exchanged.
pub fn cluster_alpn(secret: &[u8]) -> Vec<u8> {
    let hash = blake3::hash(secret);
    let hex = hash.to_hex();
    format!("tessera/0/{}", &hex[..16]).into_bytes()
}

/// Verify that received record bytes match their content address.
pub fn verify_record_integrity(id: RecordId, data: &[u8]) -> Result<(), NetError> {
    let actual = RecordId::from_data(data);
    if actual != id {
        return Err(NetError::IntegrityFailure {
            expected: id,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_alpn_is_secret_specific() {
        let a = cluster_alpn(b"cluster one");
        let b = cluster_alpn(b"cluster two");
        assert_ne!(a, b);
        assert!(a.starts_with(b"tessera/0/"));
        assert_eq!(a, cluster_alpn(b"cluster one"));
    }

    #[test]
    fn test_verify_record_integrity() {
        let data = b"receipt bytes";
        let id = RecordId::from_data(data);
        assert!(verify_record_integrity(id, data).is_ok());
        assert!(matches!(
            verify_record_integrity(id, b"other bytes"),
            Err(NetError::IntegrityFailure { .. })
        ));
    }
}
