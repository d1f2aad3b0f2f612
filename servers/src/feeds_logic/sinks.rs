//! Event sinks: log every delivered event in one line.

use lib_streams::prelude::*;
use std::time::Duration;

pub fn install_market(channel: &MarketChannel) {
    channel.set_on_book(Some(callback(|book: BookSnapshot| {
        log::info!("{}", describe_book(&book));
    })));
    channel.set_on_price_change(Some(callback(|event: PriceChangeEvent| {
        log::debug!("price_change market={} changes={}", event.market, event.price_changes.len());
    })));
    channel.set_on_last_trade_price(Some(callback(|event: LastTradePriceEvent| {
        log::info!(
            "last_trade asset={} price={} size={} side={}",
            event.asset_id,
            fmt_opt(event.price),
            fmt_opt(event.size),
            event.side
        );
    })));
    channel.set_on_order(Some(callback(|order: OrderEvent| {
        log::info!(
            "order id={} {} status={} price={} matched={}/{}",
            order.id,
            order.update_type,
            order.status,
            fmt_opt(order.price),
            fmt_opt(order.size_matched),
            fmt_opt(order.original_size)
        );
    })));
    channel.set_on_trade(Some(callback(|trade: TradeEvent| {
        log::info!(
            "trade id={} {} {}@{} status={}",
            trade.id,
            trade.side,
            fmt_opt(trade.size),
            fmt_opt(trade.price),
            trade.status
        );
    })));
    channel.set_on_reconnected(Some(callback(|outage: Duration| {
        log::warn!("market channel restored after {:?}", outage);
    })));
    channel.set_on_user_reconnected(Some(callback(|outage: Duration| {
        log::warn!("user channel restored after {:?}", outage);
    })));
}

pub fn install_sports(channel: &SportsChannel) {
    channel.set_on_event(Some(callback(|event: SportsEvent| {
        log::info!(
            "sports {} game={} league={} status={}",
            event.event_type,
            event.game_id,
            event.league,
            event.status
        );
    })));
}

/// Prices are decrypted when `price_key` is set; otherwise only the envelope
/// is logged.
pub fn install_feed(channel: &FeedChannel, price_key: Option<String>) {
    channel.set_on_price(Some(callback(move |event: PriceEvent| match &price_key {
        Some(key) => match event.decrypt(key) {
            Ok(point) => log::info!("price {}={}", point.symbol, fmt_opt(point.price)),
            Err(e) => log::warn!("price for {} could not be decrypted: {}", event.symbol, e),
        },
        None => log::debug!("encrypted price for {} ({} bytes)", event.symbol, event.payload.len()),
    })));
    channel.set_on_comment(Some(callback(|comment: CommentEvent| {
        log::info!(
            "comment {} on {} {}: {}",
            comment.id,
            comment.parent_entity_type,
            comment.parent_entity_id,
            comment.body
        );
    })));
}

pub fn describe_book(book: &BookSnapshot) -> String {
    let side = |level: Option<PriceLevel>| match level {
        Some(l) => format!("{}x{}", l.price, l.size),
        None => "-".to_string(),
    };
    format!(
        "book asset={} bid={} ask={} spread={}",
        book.asset_id,
        side(book.best_bid),
        side(book.best_ask),
        fmt_opt(book.spread())
    )
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
