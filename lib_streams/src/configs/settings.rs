//! # Stream Settings
//!
//! Endpoints and timings shared by every channel. Defaults carry the venue's
//! production endpoints and the reference timings (5 s reconnect delay, 15 s
//! heartbeat, 10 s handshake timeout).
//!
//! With the `configs` feature the settings can be layered from a camelCase
//! JSON file and `STREAMS_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MARKET_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";
pub const DEFAULT_USER_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/user";
pub const DEFAULT_SPORTS_URL: &str = "wss://sports-api.polymarket.com/ws";
pub const DEFAULT_FEED_URL: &str = "wss://ws-live-data.polymarket.com";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Environment variable {name} has an invalid value: {value}")]
    InvalidEnvVar { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    pub market_url: String,
    pub user_url: String,
    pub sports_url: String,
    pub feed_url: String,
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_secs: u64,
    pub handshake_timeout_secs: u64,
    /// Log dropped frames at warn instead of debug.
    pub log_dropped: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            market_url: DEFAULT_MARKET_URL.to_string(),
            user_url: DEFAULT_USER_URL.to_string(),
            sports_url: DEFAULT_SPORTS_URL.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            reconnect_delay_ms: 5_000,
            heartbeat_interval_secs: 15,
            handshake_timeout_secs: 10,
            log_dropped: false,
        }
    }
}

impl StreamSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[cfg(feature = "configs")]
impl StreamSettings {
    /// Loads settings from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Applies `STREAMS_*` environment variables on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self, SettingsError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = read("STREAMS_MARKET_URL") {
            self.market_url = v;
        }
        if let Some(v) = read("STREAMS_USER_URL") {
            self.user_url = v;
        }
        if let Some(v) = read("STREAMS_SPORTS_URL") {
            self.sports_url = v;
        }
        if let Some(v) = read("STREAMS_FEED_URL") {
            self.feed_url = v;
        }
        if let Some(v) = read("STREAMS_RECONNECT_DELAY_MS") {
            self.reconnect_delay_ms = parse_env("STREAMS_RECONNECT_DELAY_MS", &v)?;
        }
        if let Some(v) = read("STREAMS_HEARTBEAT_INTERVAL_SECS") {
            self.heartbeat_interval_secs = parse_env("STREAMS_HEARTBEAT_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = read("STREAMS_HANDSHAKE_TIMEOUT_SECS") {
            self.handshake_timeout_secs = parse_env("STREAMS_HANDSHAKE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = read("STREAMS_LOG_DROPPED") {
            self.log_dropped = parse_env("STREAMS_LOG_DROPPED", &v)?;
        }
        Ok(self)
    }
}

#[cfg(feature = "configs")]
fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidEnvVar {
        name: name.to_string(),
        value: value.to_string(),
    })
}
