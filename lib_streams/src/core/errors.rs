//! # Stream Errors
//!
//! One error type for the whole engine. Only the precondition variants
//! (`AlreadyRunning`, `MissingAuth`, `NotConnected`) ever reach a caller of a
//! channel operation; the transport variants are produced inside the
//! supervisor loop, logged there, and absorbed into the next reconnect.

use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors produced by the streaming engine and its transport.
#[derive(Debug, Error)]
pub enum StreamError {
    /// `start` was called on a channel that is already running.
    #[error("Channel '{0}' is already running")]
    AlreadyRunning(String),

    /// A private channel was started without an auth credential.
    #[error("Channel '{0}' requires auth credentials before it can start")]
    MissingAuth(String),

    /// A dynamic subscription change was requested with no live connection.
    #[error("Channel '{0}' is not connected")]
    NotConnected(String),

    /// The endpoint (or proxy) URL could not be used for dialing.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Errors raised by the WebSocket layer (handshake, TLS, framing).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Socket level I/O errors (DNS, TCP connect, proxy tunnel).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dial did not complete within the configured handshake timeout.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The HTTP proxy refused or broke the CONNECT tunnel.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Errors resulting from malformed JSON content.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors occurring while decrypting an encrypted payload.
    #[error("Decryption error: {0}")]
    Decryption(String),
}

impl StreamError {
    /// True for the errors a caller can act on synchronously.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            StreamError::AlreadyRunning(_) | StreamError::MissingAuth(_) | StreamError::NotConnected(_)
        )
    }
}

/// Convenience alias used across the crate.
pub type StreamResult<T> = Result<T, StreamError>;
