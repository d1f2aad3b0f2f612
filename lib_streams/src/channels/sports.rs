//! # Sports Channel
//!
//! Venue-wide sports updates. Any message carrying an `event_type` is
//! delivered as a [`SportsEvent`].

use std::time::Duration;

use crate::channels::spec::{ChannelSpec, SLOT_SPORTS};
use crate::configs::StreamSettings;
use crate::core::dispatcher::Callback;
use crate::core::errors::StreamResult;
use crate::core::stats::StatsSnapshot;
use crate::core::supervisor::StreamEngine;
use crate::models::SportsEvent;

#[derive(Debug, Clone)]
pub struct SportsChannel {
    engine: StreamEngine,
}

impl SportsChannel {
    pub fn new(settings: &StreamSettings) -> Self {
        Self::with_spec(ChannelSpec::sports(settings))
    }

    pub fn with_spec(spec: ChannelSpec) -> Self {
        Self {
            engine: StreamEngine::new(spec),
        }
    }

    pub fn set_on_event(&self, cb: Option<Callback<SportsEvent>>) {
        self.engine.dispatcher().set_handler(SLOT_SPORTS, cb);
    }

    pub fn set_on_reconnected(&self, cb: Option<Callback<Duration>>) {
        self.engine.set_on_reconnected(cb);
    }

    pub fn start(&self, game_ids: Vec<String>) -> StreamResult<()> {
        self.engine.start(game_ids)
    }

    pub fn stop(&self) {
        self.engine.stop();
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn update_subscription(&self, game_ids: Vec<String>) -> StreamResult<()> {
        self.engine.update_subscription(game_ids)
    }

    pub fn subscribe_assets(&self, game_ids: Vec<String>) -> StreamResult<()> {
        self.engine.subscribe(game_ids)
    }

    pub fn unsubscribe_assets(&self, game_ids: Vec<String>) -> StreamResult<()> {
        self.engine.unsubscribe(game_ids)
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
