//! # Market Channel
//!
//! Public order-book stream plus its private sibling for the caller's own
//! orders and trades. The two run independent engines (separate connections,
//! run states and registries) and share one credential.
//!
//! ```no_run
//! use lib_streams::prelude::*;
//!
//! # async fn demo() -> StreamResult<()> {
//! let channel = MarketChannel::new(&StreamSettings::default());
//! channel.set_on_book(Some(callback(|book: BookSnapshot| {
//!     println!("{} bid={:?} ask={:?}", book.asset_id, book.best_bid, book.best_ask);
//! })));
//! channel.start(vec!["123".to_string()])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::channels::auth::AuthCredential;
use crate::channels::spec::{
    ChannelSpec, SLOT_BOOK, SLOT_LAST_TRADE_PRICE, SLOT_ORDER, SLOT_PRICE_CHANGE, SLOT_TRADE,
};
use crate::configs::StreamSettings;
use crate::core::dispatcher::{callback, Callback};
use crate::core::errors::StreamResult;
use crate::core::orderbook;
use crate::core::stats::StatsSnapshot;
use crate::core::supervisor::StreamEngine;
use crate::models::{BookSnapshot, BookUpdate, LastTradePriceEvent, OrderEvent, PriceChangeEvent, TradeEvent};

#[derive(Debug, Clone)]
pub struct MarketChannel {
    market: StreamEngine,
    user: StreamEngine,
}

impl MarketChannel {
    pub fn new(settings: &StreamSettings) -> Self {
        Self::with_specs(ChannelSpec::market(settings), ChannelSpec::user(settings))
    }

    pub fn with_specs(market: ChannelSpec, user: ChannelSpec) -> Self {
        Self {
            market: StreamEngine::new(market),
            user: StreamEngine::new(user),
        }
    }

    /// Receives the top of book for every `book` message.
    pub fn set_on_book(&self, cb: Option<Callback<BookSnapshot>>) {
        let reducing = cb.map(|cb| callback(move |update: BookUpdate| cb(orderbook::reduce(&update))));
        self.market.dispatcher().set_handler(SLOT_BOOK, reducing);
    }

    pub fn set_on_price_change(&self, cb: Option<Callback<PriceChangeEvent>>) {
        self.market.dispatcher().set_handler(SLOT_PRICE_CHANGE, cb);
    }

    pub fn set_on_last_trade_price(&self, cb: Option<Callback<LastTradePriceEvent>>) {
        self.market.dispatcher().set_handler(SLOT_LAST_TRADE_PRICE, cb);
    }

    pub fn set_on_order(&self, cb: Option<Callback<OrderEvent>>) {
        self.user.dispatcher().set_handler(SLOT_ORDER, cb);
    }

    pub fn set_on_trade(&self, cb: Option<Callback<TradeEvent>>) {
        self.user.dispatcher().set_handler(SLOT_TRADE, cb);
    }

    pub fn set_on_reconnected(&self, cb: Option<Callback<Duration>>) {
        self.market.set_on_reconnected(cb);
    }

    pub fn set_on_user_reconnected(&self, cb: Option<Callback<Duration>>) {
        self.user.set_on_reconnected(cb);
    }

    /// Sets the credential for both the market and the user connection.
    pub fn set_auth(&self, auth: Option<AuthCredential>) {
        let shared = auth.map(Arc::new);
        self.market.set_auth(shared.clone());
        self.user.set_auth(shared);
    }

    pub fn start(&self, asset_ids: Vec<String>) -> StreamResult<()> {
        self.market.start(asset_ids)
    }

    pub fn stop(&self) {
        self.market.stop();
    }

    pub fn is_running(&self) -> bool {
        self.market.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.market.is_connected()
    }

    pub fn update_subscription(&self, asset_ids: Vec<String>) -> StreamResult<()> {
        self.market.update_subscription(asset_ids)
    }

    pub fn subscribe_assets(&self, asset_ids: Vec<String>) -> StreamResult<()> {
        self.market.subscribe(asset_ids)
    }

    pub fn unsubscribe_assets(&self, asset_ids: Vec<String>) -> StreamResult<()> {
        self.market.unsubscribe(asset_ids)
    }

    pub fn disconnected_for(&self) -> Option<Duration> {
        self.market.disconnected_for()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.market.stats()
    }

    /// Starts the private order/trade stream for `markets`.
    ///
    /// # Errors
    /// [`crate::core::errors::StreamError::MissingAuth`] without a
    /// credential; nothing is dialed in that case.
    pub fn start_user_channel(&self, markets: Vec<String>) -> StreamResult<()> {
        self.user.start(markets)
    }

    pub fn stop_user_channel(&self) {
        self.user.stop();
    }

    pub fn is_user_running(&self) -> bool {
        self.user.is_running()
    }

    pub fn update_user_subscription(&self, markets: Vec<String>) -> StreamResult<()> {
        self.user.update_subscription(markets)
    }

    pub fn subscribe_markets(&self, markets: Vec<String>) -> StreamResult<()> {
        self.user.subscribe(markets)
    }

    pub fn unsubscribe_markets(&self, markets: Vec<String>) -> StreamResult<()> {
        self.user.unsubscribe(markets)
    }

    pub fn user_stats(&self) -> StatsSnapshot {
        self.user.stats()
    }

    pub fn market_engine(&self) -> &StreamEngine {
        &self.market
    }

    pub fn user_engine(&self) -> &StreamEngine {
        &self.user
    }
}
