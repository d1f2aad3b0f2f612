//! # Heartbeat Monitor
//!
//! Sends a liveness probe on a fixed interval for as long as one connection
//! lives. The first failed send closes the connection, which the supervisor
//! sees as a fault.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::core::transport::ConnectionHandle;

/// Spawns the probe task for `connection`.
///
/// The task ends with the connection's lifetime token, never with the
/// channel's stop token. A zero interval disables probing.
pub fn spawn(channel: &str, connection: ConnectionHandle, interval: Duration, probe: String) -> JoinHandle<()> {
    let channel = channel.to_string();
    tokio::spawn(async move {
        if interval.is_zero() {
            return;
        }
        let lifetime = connection.lifetime();
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = lifetime.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = connection.send_text(probe.clone()) {
                        log::warn!("[{}] heartbeat failed on connection #{}: {}", channel, connection.id(), e);
                        connection.close();
                        break;
                    }
                    log::trace!("[{}] heartbeat sent on connection #{}", channel, connection.id());
                }
            }
        }
    })
}
