use anyhow::{Context, Result};
use lib_streams::prelude::*;
use std::time::Duration;
use tokio::signal;

mod feeds_logic;
use feeds_logic::{config, logger, monitor, sinks};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir(), &config.log_level()).context("setting up logging")?;
    log::info!("server_feeds starting");

    let settings = config.stream_settings();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let mut watched = Vec::new();

    let market = MarketChannel::new(&settings);
    sinks::install_market(&market);
    market.set_auth(AuthCredential::from_env());
    market
        .start(config.asset_ids.clone().unwrap_or_default())
        .context("starting market channel")?;
    watched.push(watch("market", market.market_engine().clone()));

    let user_markets = config.user_markets.clone().unwrap_or_default();
    if !user_markets.is_empty() {
        match market.start_user_channel(user_markets) {
            Ok(()) => watched.push(watch("user", market.user_engine().clone())),
            Err(e) => log::warn!("User channel not started: {}", e),
        }
    }

    let sports = SportsChannel::new(&settings);
    if config.enable_sports.unwrap_or(false) {
        sinks::install_sports(&sports);
        sports
            .start(config.game_ids.clone().unwrap_or_default())
            .context("starting sports channel")?;
        watched.push(watch("sports", sports.engine().clone()));
    }

    let feed = FeedChannel::new(&settings, config.feed_stream.as_deref().unwrap_or("prices"));
    if config.enable_feed.unwrap_or(false) {
        sinks::install_feed(&feed, config.price_key.clone());
        feed.start(config.feed_symbols.clone().unwrap_or_default())
            .context("starting feed channel")?;
        watched.push(watch("feed", feed.engine().clone()));
    }

    let monitor_handle = tokio::spawn(monitor::run(
        watched,
        Duration::from_secs(config.stats_interval_seconds.unwrap_or(60)),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = wait_for_sigterm() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    let _ = shutdown_tx.send(());
    market.stop_user_channel();
    market.stop();
    sports.stop();
    feed.stop();
    let _ = monitor_handle.await;

    log::info!("Shutdown complete.");
    Ok(())
}

fn watch(name: &'static str, engine: StreamEngine) -> monitor::Watched {
    let outage_engine = engine.clone();
    monitor::Watched {
        name,
        stats: Box::new(move || engine.stats()),
        outage: Box::new(move || outage_engine.disconnected_for()),
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Could not install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
