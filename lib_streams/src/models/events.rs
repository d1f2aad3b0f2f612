//! # Domain Events
//!
//! One struct per routed message kind. Every field is optional or defaulted so
//! that a venue adding, renaming or nulling a field degrades to an empty value
//! rather than a dropped event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::lossy;

/// One raw depth entry. Either side may fail to parse; the reducer skips it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct BookLevel {
    pub price: Option<f64>,
    pub size: Option<f64>,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self {
            price: Some(price),
            size: Some(size),
        }
    }

    /// Accepts `{"price": .., "size": ..}` objects and `[price, size]` pairs.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self {
                price: map.get("price").and_then(lossy::value_to_f64),
                size: map.get("size").and_then(lossy::value_to_f64),
            },
            Value::Array(pair) if pair.len() >= 2 => Self {
                price: lossy::value_to_f64(&pair[0]),
                size: lossy::value_to_f64(&pair[1]),
            },
            _ => Self::default(),
        }
    }
}

impl<'de> Deserialize<'de> for BookLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(BookLevel::from_value(&value))
    }
}

/// A validated price level: both numbers present and the price positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// Full depth for one asset (`event_type: "book"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BookUpdate {
    #[serde(default, deserialize_with = "lossy::string")]
    pub asset_id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub market: String,
    #[serde(default, alias = "buys")]
    pub bids: Vec<BookLevel>,
    #[serde(default, alias = "sells")]
    pub asks: Vec<BookLevel>,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Best bid/ask derived from a [`BookUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub asset_id: String,
    pub market: String,
    pub best_bid: Option<PriceLevel>,
    pub best_ask: Option<PriceLevel>,
    /// Venue timestamp in milliseconds, when the venue sent one.
    pub timestamp: Option<i64>,
    /// Local time at which the frame was processed.
    pub observed_at: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// One entry of a `price_change` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceChange {
    #[serde(default, deserialize_with = "lossy::string")]
    pub asset_id: String,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub size: Option<f64>,
    #[serde(default, deserialize_with = "lossy::string")]
    pub side: String,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub best_bid: Option<f64>,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub best_ask: Option<f64>,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Incremental level changes (`event_type: "price_change"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceChangeEvent {
    #[serde(default, deserialize_with = "lossy::string")]
    pub market: String,
    #[serde(default, alias = "changes")]
    pub price_changes: Vec<PriceChange>,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
}

/// Last traded price for an asset (`event_type: "last_trade_price"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LastTradePriceEvent {
    #[serde(default, deserialize_with = "lossy::string")]
    pub asset_id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub market: String,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub size: Option<f64>,
    #[serde(default, deserialize_with = "lossy::string")]
    pub side: String,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub fee_rate_bps: Option<f64>,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
}

/// Order lifecycle update on the private channel (`event_type: "order"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OrderEvent {
    #[serde(default, deserialize_with = "lossy::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub owner: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub market: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub asset_id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub side: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub outcome: String,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub original_size: Option<f64>,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub size_matched: Option<f64>,
    /// PLACEMENT, UPDATE or CANCELLATION.
    #[serde(default, rename = "type", deserialize_with = "lossy::string")]
    pub update_type: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub status: String,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
}

/// Fill update on the private channel (`event_type: "trade"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TradeEvent {
    #[serde(default, deserialize_with = "lossy::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub owner: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub market: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub asset_id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub side: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub outcome: String,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub size: Option<f64>,
    /// MATCHED, MINED, CONFIRMED, RETRYING or FAILED.
    #[serde(default, deserialize_with = "lossy::string")]
    pub status: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub taker_order_id: String,
    #[serde(default)]
    pub maker_orders: Vec<Value>,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub match_time: Option<i64>,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
}

/// Venue-wide sports update. Only the identifying fields are typed; the rest
/// of the message is kept verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SportsEvent {
    #[serde(default, deserialize_with = "lossy::string")]
    pub event_type: String,
    #[serde(default, alias = "gameId", deserialize_with = "lossy::string")]
    pub game_id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub league: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub status: String,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Encrypted price tick from the third-party feed (`stream: "prices"`).
///
/// `payload` is base64 ciphertext and `iv` its base64 initialization vector;
/// see `PriceEvent::decrypt` (feature `crypto`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceEvent {
    #[serde(default, deserialize_with = "lossy::string")]
    pub stream: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub iv: String,
    #[serde(default, alias = "data", deserialize_with = "lossy::string")]
    pub payload: String,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
}

/// Plaintext of a decrypted [`PriceEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PricePoint {
    #[serde(default, deserialize_with = "lossy::string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lossy::f64_opt")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lossy::i64_opt")]
    pub timestamp: Option<i64>,
}

/// Comment posted on a market or event (`stream: "comments"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommentEvent {
    #[serde(default, deserialize_with = "lossy::string")]
    pub stream: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lossy::string")]
    pub body: String,
    #[serde(default, alias = "parentEntityID", deserialize_with = "lossy::string")]
    pub parent_entity_id: String,
    #[serde(default, alias = "parentEntityType", deserialize_with = "lossy::string")]
    pub parent_entity_type: String,
    #[serde(default, alias = "userAddress", deserialize_with = "lossy::string")]
    pub user_address: String,
    #[serde(default, alias = "createdAt", deserialize_with = "lossy::string")]
    pub created_at: String,
}
