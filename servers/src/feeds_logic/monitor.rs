use lib_streams::prelude::*;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

/// A named channel whose counters are reported.
pub struct Watched {
    pub name: &'static str,
    pub stats: Box<dyn Fn() -> StatsSnapshot + Send + Sync>,
    pub outage: Box<dyn Fn() -> Option<Duration> + Send + Sync>,
}

pub async fn run(watched: Vec<Watched>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
    if every.is_zero() {
        return;
    }
    let mut check_interval = interval(every);
    check_interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Monitor service received shutdown signal.");
                break;
            }
            _ = check_interval.tick() => {
                for channel in &watched {
                    let stats = (channel.stats)();
                    log::info!(
                        "[{}] frames={} dispatched={} dropped={} reconnects={} dial_failures={} panics={}",
                        channel.name,
                        stats.frames_received,
                        stats.messages_dispatched,
                        stats.frames_dropped,
                        stats.reconnects,
                        stats.dial_failures,
                        stats.callback_panics
                    );
                    if let Some(outage) = (channel.outage)() {
                        log::warn!("[{}] disconnected for {:?}", channel.name, outage);
                    }
                }
            }
        }
    }
}
