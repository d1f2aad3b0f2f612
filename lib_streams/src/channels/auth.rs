//! # Auth Credential
//!
//! The signed identity attached to a channel's dial-time subscribe frame.
//! Producing the signature is the caller's business; this type only carries
//! it. Credentials are held in memory and never written anywhere.

use serde::Serialize;

/// Address, signature, timestamp and nonce, plus an optional opaque token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCredential {
    pub address: String,
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub token: Option<String>,
}

/// The `auth` object as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthPayload {
    pub address: String,
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
}

impl AuthCredential {
    pub fn new(address: &str, signature: &str, timestamp: &str, nonce: &str) -> Self {
        Self {
            address: address.to_string(),
            signature: signature.to_string(),
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn payload(&self) -> AuthPayload {
        AuthPayload {
            address: self.address.clone(),
            signature: self.signature.clone(),
            timestamp: self.timestamp.clone(),
            nonce: self.nonce.clone(),
        }
    }

    /// Reads `STREAMS_AUTH_ADDRESS`, `STREAMS_AUTH_SIGNATURE`,
    /// `STREAMS_AUTH_TIMESTAMP`, `STREAMS_AUTH_NONCE` and the optional
    /// `STREAMS_AUTH_TOKEN`. Returns `None` unless the first four are all set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Some(Self {
            address: read("STREAMS_AUTH_ADDRESS")?,
            signature: read("STREAMS_AUTH_SIGNATURE")?,
            timestamp: read("STREAMS_AUTH_TIMESTAMP")?,
            nonce: read("STREAMS_AUTH_NONCE")?,
            token: read("STREAMS_AUTH_TOKEN"),
        })
    }
}

// Keeps signatures and tokens out of logs.
impl std::fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredential")
            .field("address", &self.address)
            .field("signature", &"<redacted>")
            .field("timestamp", &self.timestamp)
            .field("nonce", &self.nonce)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
