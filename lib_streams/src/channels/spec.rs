//! # Channel Spec
//!
//! Everything that distinguishes one channel from another: endpoint, auth
//! policy, subscribe-frame shape, route table and timings. The engine itself
//! is identical for all of them.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::channels::auth::AuthCredential;
use crate::configs::StreamSettings;
use crate::core::dispatcher::Route;

pub const SLOT_BOOK: &str = "book";
pub const SLOT_PRICE_CHANGE: &str = "price_change";
pub const SLOT_LAST_TRADE_PRICE: &str = "last_trade_price";
pub const SLOT_ORDER: &str = "order";
pub const SLOT_TRADE: &str = "trade";
pub const SLOT_SPORTS: &str = "sports";
pub const SLOT_PRICES: &str = "prices";
pub const SLOT_COMMENTS: &str = "comments";

/// Whether the dial-time frame carries an `auth` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Never sent, even if a credential is set.
    None,
    /// Sent when a credential is set.
    Optional,
    /// `start` fails without a credential.
    Required,
}

/// Direction of a delta frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Subscribe,
    Unsubscribe,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSpec {
    /// Used in logs and error messages.
    pub name: String,
    pub url: String,
    pub auth: AuthPolicy,
    /// Value of `type` in the dial-time frame.
    pub subscribe_type: String,
    /// Key holding the id list in both frame shapes.
    pub id_field: String,
    pub routes: Vec<Route>,
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
    pub handshake_timeout: Duration,
    pub heartbeat_payload: String,
    pub log_dropped: bool,
}

impl ChannelSpec {
    fn base(name: &str, url: &str, settings: &StreamSettings) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            auth: AuthPolicy::None,
            subscribe_type: String::new(),
            id_field: String::new(),
            routes: Vec::new(),
            reconnect_delay: settings.reconnect_delay(),
            heartbeat_interval: settings.heartbeat_interval(),
            handshake_timeout: settings.handshake_timeout(),
            heartbeat_payload: default_heartbeat_payload(),
            log_dropped: settings.log_dropped,
        }
    }

    /// Public order-book channel.
    pub fn market(settings: &StreamSettings) -> Self {
        Self {
            auth: AuthPolicy::Optional,
            subscribe_type: "MARKET".to_string(),
            id_field: "assets_ids".to_string(),
            routes: vec![
                Route::exact("event_type", "book", SLOT_BOOK),
                Route::exact("event_type", "price_change", SLOT_PRICE_CHANGE),
                Route::exact("event_type", "last_trade_price", SLOT_LAST_TRADE_PRICE),
            ],
            ..Self::base("market", &settings.market_url, settings)
        }
    }

    /// Private order and trade channel.
    pub fn user(settings: &StreamSettings) -> Self {
        Self {
            auth: AuthPolicy::Required,
            subscribe_type: "USER".to_string(),
            id_field: "markets".to_string(),
            routes: vec![
                Route::exact("event_type", "order", SLOT_ORDER),
                Route::exact("event_type", "trade", SLOT_TRADE),
            ],
            ..Self::base("user", &settings.user_url, settings)
        }
    }

    /// Venue-wide sports channel. Every message carrying `event_type` is a
    /// sports event.
    pub fn sports(settings: &StreamSettings) -> Self {
        Self {
            subscribe_type: "SPORTS".to_string(),
            id_field: "game_ids".to_string(),
            routes: vec![Route::any("event_type", SLOT_SPORTS)],
            ..Self::base("sports", &settings.sports_url, settings)
        }
    }

    /// Third-party feed subscribed under `stream` (e.g. `prices`).
    pub fn feed(settings: &StreamSettings, stream: &str) -> Self {
        Self {
            auth: AuthPolicy::Optional,
            subscribe_type: stream.to_string(),
            id_field: "symbols".to_string(),
            routes: vec![
                Route::exact("stream", "prices", SLOT_PRICES),
                Route::exact("stream", "comments", SLOT_COMMENTS),
            ],
            ..Self::base(&format!("feed:{}", stream), &settings.feed_url, settings)
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// The dial-time frame: `{"type", <id_field>: [ids], "auth"?}`.
    ///
    /// `auth` is included only when the policy allows it and a credential is
    /// given.
    pub fn snapshot_frame(&self, ids: &[String], auth: Option<&AuthCredential>) -> String {
        let mut frame = Map::new();
        frame.insert("type".to_string(), Value::String(self.subscribe_type.clone()));
        frame.insert(self.id_field.clone(), id_array(ids));
        if self.auth != AuthPolicy::None {
            if let Some(auth) = auth {
                let payload = serde_json::to_value(auth.payload()).unwrap_or(Value::Null);
                frame.insert("auth".to_string(), payload);
            }
        }
        Value::Object(frame).to_string()
    }

    /// The dynamic frame: `{<id_field>: [ids], "operation"}`.
    pub fn delta_frame(&self, ids: &[String], operation: Operation) -> String {
        let mut frame = Map::new();
        frame.insert(self.id_field.clone(), id_array(ids));
        frame.insert("operation".to_string(), Value::String(operation.as_str().to_string()));
        Value::Object(frame).to_string()
    }
}

fn id_array(ids: &[String]) -> Value {
    Value::Array(ids.iter().cloned().map(Value::String).collect())
}

/// The probe text: the JSON encoding of the string `PING`.
pub fn default_heartbeat_payload() -> String {
    Value::String(crate::core::codec::PING_TOKEN.to_string()).to_string()
}
