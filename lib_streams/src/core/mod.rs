//! # Streaming Engine Core
//!
//! Channel-agnostic building blocks. A channel is nothing more than a
//! [`crate::channels::ChannelSpec`] handed to [`supervisor::StreamEngine`].

/// Inbound frame normalization.
pub mod codec;
/// Routing of messages to typed callbacks.
pub mod dispatcher;
/// Engine error type.
pub mod errors;
/// Periodic liveness probe.
pub mod heartbeat;
/// Best bid/ask reduction.
pub mod orderbook;
/// Subscription sets that outlive connections.
pub mod registry;
/// Monitoring counters.
pub mod stats;
/// Reconnect loop and public engine handle.
pub mod supervisor;
/// Dialing, proxying and the connection writer.
pub mod transport;

#[cfg(test)]
pub(crate) mod testkit;
