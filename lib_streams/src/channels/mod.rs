//! # Channels
//!
//! Typed facades over [`crate::core::supervisor::StreamEngine`], one per
//! venue stream. Each is a [`spec::ChannelSpec`] plus callback setters for
//! the events it routes.

/// Credentials attached to dial-time frames.
pub mod auth;
/// Third-party price and comment feed.
pub mod feed;
/// Order-book channel and its private order/trade sibling.
pub mod market;
/// Per-channel configuration and frame builders.
pub mod spec;
/// Venue-wide sports events.
pub mod sports;

pub use auth::{AuthCredential, AuthPayload};
pub use feed::FeedChannel;
pub use market::MarketChannel;
pub use spec::{AuthPolicy, ChannelSpec, Operation};
pub use sports::SportsChannel;
