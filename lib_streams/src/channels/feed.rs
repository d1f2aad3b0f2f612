//! # Third-Party Feed Channel
//!
//! Price and comment streams from the live-data relay. One channel instance
//! subscribes under one stream name; messages are routed by their `stream`
//! field, so a relay that multiplexes both kinds still reaches the right
//! callback. Price payloads arrive encrypted (see `PriceEvent::decrypt`).

use std::sync::Arc;
use std::time::Duration;

use crate::channels::auth::AuthCredential;
use crate::channels::spec::{ChannelSpec, SLOT_COMMENTS, SLOT_PRICES};
use crate::configs::StreamSettings;
use crate::core::dispatcher::Callback;
use crate::core::errors::StreamResult;
use crate::core::stats::StatsSnapshot;
use crate::core::supervisor::StreamEngine;
use crate::models::{CommentEvent, PriceEvent};

pub const DEFAULT_STREAM: &str = "prices";

#[derive(Debug, Clone)]
pub struct FeedChannel {
    engine: StreamEngine,
}

impl FeedChannel {
    pub fn new(settings: &StreamSettings, stream: &str) -> Self {
        Self::with_spec(ChannelSpec::feed(settings, stream))
    }

    pub fn with_spec(spec: ChannelSpec) -> Self {
        Self {
            engine: StreamEngine::new(spec),
        }
    }

    pub fn set_on_price(&self, cb: Option<Callback<PriceEvent>>) {
        self.engine.dispatcher().set_handler(SLOT_PRICES, cb);
    }

    pub fn set_on_comment(&self, cb: Option<Callback<CommentEvent>>) {
        self.engine.dispatcher().set_handler(SLOT_COMMENTS, cb);
    }

    pub fn set_on_reconnected(&self, cb: Option<Callback<Duration>>) {
        self.engine.set_on_reconnected(cb);
    }

    pub fn set_auth(&self, auth: Option<AuthCredential>) {
        self.engine.set_auth(auth.map(Arc::new));
    }

    pub fn start(&self, symbols: Vec<String>) -> StreamResult<()> {
        self.engine.start(symbols)
    }

    pub fn stop(&self) {
        self.engine.stop();
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn update_subscription(&self, symbols: Vec<String>) -> StreamResult<()> {
        self.engine.update_subscription(symbols)
    }

    pub fn subscribe_assets(&self, symbols: Vec<String>) -> StreamResult<()> {
        self.engine.subscribe(symbols)
    }

    pub fn unsubscribe_assets(&self, symbols: Vec<String>) -> StreamResult<()> {
        self.engine.unsubscribe(symbols)
    }

    pub fn disconnected_for(&self) -> Option<Duration> {
        self.engine.disconnected_for()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats()
    }

    pub fn engine(&self) -> &StreamEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::callback;
    use crate::core::testkit::{wait_until, MockServer};
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_prices_and_comments_route_by_stream() {
        let mut server = MockServer::start().await;
        let spec = ChannelSpec::feed(&StreamSettings::default(), DEFAULT_STREAM)
            .with_url(&server.url)
            .with_heartbeat_interval(Duration::ZERO);
        let channel = FeedChannel::with_spec(spec);

        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (log.clone(), log.clone());
        channel.set_on_price(Some(callback(move |p: PriceEvent| a.lock().unwrap().push(format!("price:{}", p.symbol)))));
        channel.set_on_comment(Some(callback(move |c: CommentEvent| b.lock().unwrap().push(format!("comment:{}", c.body)))));

        channel.start(vec!["BTCUSDT".to_string()]).unwrap();
        let (_, frame) = server.next_json().await;
        assert_eq!(frame, json!({"type": "prices", "symbols": ["BTCUSDT"]}));

        server.send(0, r#"{"stream":"prices","symbol":"BTCUSDT","iv":"AAAA","payload":"BBBB"}"#);
        server.send(0, r#"[{"stream":"comments","id":"c1","body":"gm"},{"stream":"orders"}]"#);

        wait_until(|| log.lock().unwrap().len() == 2).await;
        assert_eq!(*log.lock().unwrap(), vec!["price:BTCUSDT", "comment:gm"]);
        channel.stop();
    }

    #[tokio::test]
    async fn test_optional_auth_is_attached_when_set() {
        let mut server = MockServer::start().await;
        let spec = ChannelSpec::feed(&StreamSettings::default(), "comments")
            .with_url(&server.url)
            .with_heartbeat_interval(Duration::ZERO);
        let channel = FeedChannel::with_spec(spec);
        channel.set_auth(Some(AuthCredential::new("0xa", "0xs", "1", "2")));

        channel.start(vec![]).unwrap();
        let (_, frame) = server.next_json().await;
        assert_eq!(frame["type"], json!("comments"));
        assert_eq!(frame["auth"]["nonce"], json!("2"));
        channel.stop();
    }
}
