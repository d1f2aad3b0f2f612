//! # Order-Book Reducer
//!
//! Collapses a full depth update into its top of book.

use chrono::Utc;

use crate::models::{BookLevel, BookSnapshot, BookUpdate, PriceLevel};

/// Reduces a depth update to best bid and best ask.
pub fn reduce(update: &BookUpdate) -> BookSnapshot {
    BookSnapshot {
        asset_id: update.asset_id.clone(),
        market: update.market.clone(),
        best_bid: best_bid(&update.bids),
        best_ask: best_ask(&update.asks),
        timestamp: update.timestamp,
        observed_at: Utc::now(),
    }
}

/// Highest price; on equal prices the first level seen is kept.
pub fn best_bid(levels: &[BookLevel]) -> Option<PriceLevel> {
    best_by(levels, |candidate, best| candidate > best)
}

/// Lowest price; on equal prices the first level seen is kept.
pub fn best_ask(levels: &[BookLevel]) -> Option<PriceLevel> {
    best_by(levels, |candidate, best| candidate < best)
}

fn best_by(levels: &[BookLevel], better: impl Fn(f64, f64) -> bool) -> Option<PriceLevel> {
    levels
        .iter()
        .filter_map(valid_level)
        .fold(None, |best: Option<PriceLevel>, level| match best {
            Some(current) if !better(level.price, current.price) => Some(current),
            _ => Some(level),
        })
}

fn valid_level(level: &BookLevel) -> Option<PriceLevel> {
    match (level.price, level.size) {
        (Some(price), Some(size)) if price > 0.0 => Some(PriceLevel { price, size }),
        _ => None,
    }
}
