//! Network transport built on iroh QUIC.
//!
//! [`TesseraTransport`] wraps an iroh [`Endpoint`] and provides:
//! - Connection pooling (reuse connections to the same peer).
//! - Message send/receive with length-prefixed postcard encoding.
//! - A bi-stream request/response helper for the RPC-shaped messages.

use std::collections::HashMap;
use std::sync::Arc;

use iroh::endpoint::{Connection, RecvStream, SendStream};
use iroh::{Endpoint, EndpointAddr, SecretKey};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::NetError;
use crate::message::TesseraMessage;
use crate::TESSERA_ALPN;

/// Maximum message size: 16 MB. Record payloads are receipts and
/// checkpoint archives, well under this.
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Network transport for inter-node communication.
///
/// Manages an iroh QUIC endpoint, a connection pool to peer nodes,
/// and provides high-level send/request operations.
pub struct TesseraTransport {
    endpoint: Endpoint,
    /// Cached connections to remote peers, keyed by their iroh endpoint ID.
    ///
    /// Uses `Mutex` (not `RwLock`) to prevent a TOCTOU race where concurrent
    /// callers all see "no cached connection", each establish a separate QUIC
    /// connection to the same peer, and overwrite each other in the cache.
    /// Dropped connections send `CONNECTION_CLOSE`, aborting in-flight data.
    connections: Arc<Mutex<HashMap<iroh::EndpointId, Connection>>>,
    /// ALPN used for outgoing connections. Derived from the cluster secret
    /// so that nodes with different secrets cannot connect.
    alpn: Vec<u8>,
}

impl TesseraTransport {
    /// Create a new transport with the default ALPN (`tessera/0`).
    ///
    /// Use [`iroh::RelayMode::Disabled`] for tests that don't need relay servers.
    pub async fn bind(
        secret_key: SecretKey,
        relay_mode: iroh::RelayMode,
    ) -> Result<Self, NetError> {
        Self::bind_with_alpn(secret_key, relay_mode, TESSERA_ALPN.to_vec()).await
    }

    /// Create a new transport with a cluster-specific ALPN.
    ///
    /// Use [`crate::cluster_alpn`] to derive the ALPN from a shared secret.
    /// Nodes with different ALPNs cannot establish QUIC connections — the
    /// TLS handshake itself rejects the mismatch.
    pub async fn bind_with_alpn(
        secret_key: SecretKey,
        relay_mode: iroh::RelayMode,
        alpn: Vec<u8>,
    ) -> Result<Self, NetError> {
        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![alpn.clone()])
            .relay_mode(relay_mode)
            .bind()
            .await
            .map_err(|e| NetError::Endpoint(e.to_string()))?;

        Ok(Self {
            endpoint,
            connections: Arc::new(Mutex::new(HashMap::new())),
            alpn,
        })
    }

    /// Create a transport wrapping an existing endpoint with a custom ALPN.
    ///
    /// Use this when the endpoint is shared with an iroh [`Router`] and the
    /// transport is only used for *outgoing* connections.
    ///
    /// [`Router`]: iroh::protocol::Router
    pub fn from_endpoint_with_alpn(endpoint: Endpoint, alpn: Vec<u8>) -> Self {
        Self {
            endpoint,
            connections: Arc::new(Mutex::new(HashMap::new())),
            alpn,
        }
    }

    /// Return a reference to the underlying iroh endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Return the [`EndpointAddr`] of this transport (ID + addresses).
    pub fn addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    /// Return this endpoint's public identity.
    pub fn endpoint_id(&self) -> iroh::EndpointId {
        self.endpoint.id()
    }

    // -------------------------------------------------------------------
    // Connection management
    // -------------------------------------------------------------------

    /// Get or establish a QUIC connection to a remote peer.
    ///
    /// Holds the connection cache lock for the entire duration to prevent
    /// the TOCTOU race where concurrent callers each create a connection
    /// to the same peer, overwriting each other.
    async fn get_connection(&self, addr: EndpointAddr) -> Result<Connection, NetError> {
        let remote_id = addr.id;
        let mut cache = self.connections.lock().await;

        if let Some(conn) = cache.get(&remote_id)
            && conn.close_reason().is_none()
        {
            return Ok(conn.clone());
        }

        debug!(remote = %remote_id.fmt_short(), "connecting to peer");
        let conn = self
            .endpoint
            .connect(addr, &self.alpn)
            .await
            .map_err(|e| NetError::Connect(e.to_string()))?;

        cache.insert(remote_id, conn.clone());
        Ok(conn)
    }

    /// Remove a cached connection (e.g. after detecting it's dead).
    pub async fn remove_connection(&self, id: &iroh::EndpointId) {
        let mut cache = self.connections.lock().await;
        cache.remove(id);
    }

    // -------------------------------------------------------------------
    // High-level operations
    // -------------------------------------------------------------------

    /// Send a message to a remote peer (uni-directional, no response).
    pub async fn send_to(&self, addr: EndpointAddr, msg: &TesseraMessage) -> Result<(), NetError> {
        let conn = self.get_connection(addr).await?;
        Self::send_message(&conn, msg).await
    }

    /// Send a request on a new bi-directional stream and wait for the
    /// peer's response on the same stream.
    pub async fn request(
        &self,
        addr: EndpointAddr,
        msg: &TesseraMessage,
    ) -> Result<TesseraMessage, NetError> {
        let conn = self.get_connection(addr).await?;

        let (mut send, mut recv) = conn
            .open_bi()
            .await
            .map_err(|e| NetError::StreamOpen(e.to_string()))?;

        Self::send_on_stream(&mut send, msg).await?;
        Self::recv_message(&mut recv).await
    }

    // -------------------------------------------------------------------
    // Low-level message send/receive
    // -------------------------------------------------------------------

    /// Send a message over a new uni-directional stream on the given connection.
    ///
    /// The message is length-prefixed (4-byte big-endian) then postcard-encoded.
    pub async fn send_message(
        conn: &Connection,
        message: &TesseraMessage,
    ) -> Result<(), NetError> {
        let mut send = conn
            .open_uni()
            .await
            .map_err(|e| NetError::StreamOpen(e.to_string()))?;
        Self::send_on_stream(&mut send, message).await
    }

    /// Send a message on an already-open send stream.
    pub async fn send_on_stream(
        send: &mut SendStream,
        message: &TesseraMessage,
    ) -> Result<(), NetError> {
        let payload =
            postcard::to_allocvec(message).map_err(|e| NetError::Serialization(e.to_string()))?;
        send.write_all(&(payload.len() as u32).to_be_bytes())
            .await?;
        send.write_all(&payload).await?;
        send.finish()?;
        Ok(())
    }

    /// Receive a message from a receive stream.
    ///
    /// Reads a 4-byte big-endian length prefix, then reads that many bytes
    /// and deserializes with postcard.
    pub async fn recv_message(recv: &mut RecvStream) -> Result<TesseraMessage, NetError> {
        let mut len_buf = [0u8; 4];
        recv.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(NetError::Serialization(format!(
                "message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"
            )));
        }

        let payload = recv.read_to_end(len).await?;
        let message: TesseraMessage =
            postcard::from_bytes(&payload).map_err(|e| NetError::Serialization(e.to_string()))?;

        Ok(message)
    }

    // -------------------------------------------------------------------
    // Incoming message handling
    // -------------------------------------------------------------------

    /// Accept a single incoming connection and return it.
    ///
    /// Returns `None` if the endpoint is shutting down.
    pub async fn accept(&self) -> Option<Connection> {
        let incoming = self.endpoint.accept().await?;
        match incoming.await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("failed to accept connection: {e}");
                None
            }
        }
    }

    /// Accept incoming uni-directional streams on a connection and dispatch
    /// messages to the provided handler. Runs until the connection closes.
    pub async fn handle_connection<F, Fut>(conn: Connection, handler: F)
    where
        F: Fn(TesseraMessage, Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        loop {
            match conn.accept_uni().await {
                Ok(mut recv) => match Self::recv_message(&mut recv).await {
                    Ok(msg) => handler(msg, conn.clone()).await,
                    Err(e) => {
                        warn!("failed to decode message: {e}");
                    }
                },
                Err(e) => {
                    debug!("connection closed: {e}");
                    break;
                }
            }
        }
    }

    /// Handle incoming bidirectional streams (request/response patterns).
    ///
    /// For each incoming bi stream, reads a request and calls the handler
    /// which may produce a response message. The response is sent back on
    /// the same stream.
    pub async fn handle_bi_streams<F, Fut>(conn: Connection, handler: F)
    where
        F: Fn(TesseraMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<TesseraMessage>> + Send,
    {
        loop {
            match conn.accept_bi().await {
                Ok((mut send, mut recv)) => match Self::recv_message(&mut recv).await {
                    Ok(request) => {
                        if let Some(response) = handler(request).await
                            && let Err(e) = Self::send_on_stream(&mut send, &response).await
                        {
                            warn!("failed to send response: {e}");
                        }
                    }
                    Err(e) => {
                        warn!("failed to decode bi-stream request: {e}");
                    }
                },
                Err(e) => {
                    debug!("connection closed (bi): {e}");
                    break;
                }
            }
        }
    }

    /// Gracefully close the transport.
    pub async fn close(&self) {
        self.endpoint.close().await;
    }
}
