//! # lib_streams
//!
//! Resilient WebSocket subscriptions for a prediction-market venue: the
//! public order book, the private order/trade stream, venue-wide sports
//! events and a third-party price/comment relay.
//!
//! Every channel runs on the same engine. It keeps the subscription set
//! across reconnects, probes liveness, normalizes single-object and array
//! frames, and calls the registered callbacks in wire order.

#![forbid(unsafe_code)]

pub mod channels;
pub mod configs;
pub mod core;
pub mod models;

#[cfg(feature = "crypto")]
pub mod crypto;

pub mod prelude {
    pub use crate::channels::{
        AuthCredential, AuthPolicy, ChannelSpec, FeedChannel, MarketChannel, SportsChannel,
    };
    pub use crate::configs::StreamSettings;
    pub use crate::core::dispatcher::{callback, forward_to, Callback};
    pub use crate::core::errors::{StreamError, StreamResult};
    pub use crate::core::stats::StatsSnapshot;
    pub use crate::core::supervisor::StreamEngine;
    pub use crate::models::*;
}
