//! # Market Channel Live Test
//!
//! Connects the market channel to the live venue, subscribes to the given
//! asset ids and prints every top-of-book update for a fixed duration.
//! Exits non-zero if no book arrived.

use anyhow::{bail, Result};
use clap::Parser;
use lib_streams::prelude::*;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[clap(about = "Live smoke test for the market channel")]
struct Args {
    /// Asset (token) ids to subscribe to.
    #[clap(required = true, env = "TEST_ASSET_IDS", value_delimiter = ',')]
    asset_ids: Vec<String>,

    /// Seconds to listen before exiting.
    #[clap(long, default_value_t = 30)]
    seconds: u64,

    /// Market channel URL override.
    #[clap(long, env = "STREAMS_MARKET_URL")]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // // Statement: Console-only logger; library lifecycle lines show the connection state.
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .apply()?;

    let mut settings = StreamSettings::default();
    if let Some(url) = args.url {
        settings.market_url = url;
    }

    let channel = MarketChannel::new(&settings);
    let (tx, mut rx) = mpsc::unbounded_channel::<BookSnapshot>();
    channel.set_on_book(Some(forward_to(tx)));

    println!("[*] Subscribing to {} asset(s) on {}", args.asset_ids.len(), settings.market_url);
    channel.start(args.asset_ids)?;

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);
    let mut received = 0usize;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Some(book) = rx.recv() => {
                received += 1;
                println!(
                    "[BOOK] {} bid={:?} ask={:?} mid={:?}",
                    book.asset_id,
                    book.best_bid.map(|l| l.price),
                    book.best_ask.map(|l| l.price),
                    book.mid_price()
                );
            }
        }
    }

    let stats = channel.stats();
    channel.stop();
    println!("-----------------------------------------------");
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("-----------------------------------------------");

    if received == 0 {
        bail!("no book updates received in {} seconds", args.seconds);
    }
    println!("[SUCCESS] {} book update(s) received", received);
    Ok(())
}
