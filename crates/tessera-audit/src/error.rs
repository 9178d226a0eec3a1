//! Error types for the audit client.

/// Errors that can occur while fetching or decoding audit material.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server has no data for the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server answered with an unexpected status.
    #[error("server returned status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// A response field could not be decoded.
    #[error("malformed response: {0}")]
    Encoding(String),
}
