//! # Event Models
//!
//! Typed, immutable values produced once per inbound message and handed to a
//! caller's callback. Venue payloads encode most numbers as strings, so every
//! numeric field goes through [`lossy`] and tolerates both encodings.

/// Domain event types for every channel.
pub mod events;
/// Serde helpers for number-or-string fields.
pub mod lossy;

pub use events::{
    BookLevel, BookSnapshot, BookUpdate, CommentEvent, LastTradePriceEvent, OrderEvent,
    PriceChange, PriceChangeEvent, PriceEvent, PriceLevel, PricePoint, SportsEvent, TradeEvent,
};
