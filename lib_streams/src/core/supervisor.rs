//! # Connection Supervisor
//!
//! [`StreamEngine`] runs one channel: it owns the subscription registry, the
//! dispatcher and a reconnect loop that keeps exactly one connection alive
//! until stopped.
//!
//! ## Lifecycle
//! - `start` mints a fresh stop token, seeds the registry and spawns the loop.
//! - The loop dials, sends the snapshot frame built from the registry, spawns
//!   the heartbeat and reads until the connection faults or stop fires.
//! - On a fault it records when the outage began, waits the reconnect delay
//!   and dials again with whatever the registry holds at that moment.
//! - `stop` cancels the token and closes the live connection.
//!
//! Transport errors stay inside the loop. Callers only ever see the
//! precondition errors of `start`, `subscribe` and `unsubscribe`.
//!
//! All mutable state sits in one [`EngineState`] behind a single mutex that is
//! never held across an `.await`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;

use crate::channels::auth::AuthCredential;
use crate::channels::spec::{AuthPolicy, ChannelSpec, Operation};
use crate::core::dispatcher::{Callback, Dispatcher};
use crate::core::errors::{StreamError, StreamResult};
use crate::core::heartbeat;
use crate::core::registry::SubscriptionRegistry;
use crate::core::stats::{StatsSnapshot, StreamStats};
use crate::core::transport::{self, ConnectionHandle, WsStream};

#[derive(Debug, Clone, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running {
        stop: CancellationToken,
        generation: u64,
    },
}

#[derive(Default)]
pub struct EngineState {
    pub run: RunState,
    pub connection: Option<ConnectionHandle>,
    /// Start of the current outage, if any.
    pub disconnected_at: Option<Instant>,
    pub auth: Option<Arc<AuthCredential>>,
    on_reconnected: Option<Callback<Duration>>,
    generation: u64,
    next_connection_id: u64,
}

impl EngineState {
    fn is_current(&self, generation: u64) -> bool {
        matches!(self.run, RunState::Running { generation: g, .. } if g == generation)
    }

    /// Closes `connection`, forgets it if it is the live one and opens the
    /// outage window unless the run was stopped or replaced.
    fn release(&mut self, connection: &ConnectionHandle, generation: u64, stop: &CancellationToken) {
        connection.close();
        if self.connection.as_ref().is_some_and(|c| c.id() == connection.id()) {
            self.connection = None;
        }
        if self.is_current(generation) && !stop.is_cancelled() && self.disconnected_at.is_none() {
            self.disconnected_at = Some(Instant::now());
        }
    }
}

struct Inner {
    spec: ChannelSpec,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    stats: Arc<StreamStats>,
    state: Mutex<EngineState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One resilient channel connection. Clones share the same channel.
#[derive(Clone)]
pub struct StreamEngine {
    inner: Arc<Inner>,
}

impl StreamEngine {
    pub fn new(spec: ChannelSpec) -> Self {
        let stats = Arc::new(StreamStats::new());
        let dispatcher = Dispatcher::new(&spec.name, spec.routes.clone(), stats.clone(), spec.log_dropped);
        Self {
            inner: Arc::new(Inner {
                spec,
                registry: SubscriptionRegistry::new(),
                dispatcher,
                stats,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    pub fn spec(&self) -> &ChannelSpec {
        &self.inner.spec
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// The ids the channel is (or will be, once connected) subscribed to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.registry.snapshot(&self.inner.spec.id_field)
    }

    /// Sets or clears the credential. Takes effect at the next dial.
    pub fn set_auth(&self, auth: Option<Arc<AuthCredential>>) {
        self.inner.lock().auth = auth;
    }

    pub fn auth(&self) -> Option<Arc<AuthCredential>> {
        self.inner.lock().auth.clone()
    }

    /// Called with the outage length each time a connection is restored.
    pub fn set_on_reconnected(&self, callback: Option<Callback<Duration>>) {
        self.inner.lock().on_reconnected = callback;
    }

    /// Starts the reconnect loop with `ids` as the whole subscription set.
    ///
    /// Returns immediately; the first dial happens on a spawned task.
    ///
    /// # Errors
    /// - [`StreamError::AlreadyRunning`] if the channel is running. The
    ///   running loop is left untouched.
    /// - [`StreamError::MissingAuth`] if the channel requires a credential
    ///   and none is set.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, ids: Vec<String>) -> StreamResult<()> {
        let inner = &self.inner;
        let (stop, generation) = {
            let mut state = inner.lock();
            if matches!(state.run, RunState::Running { .. }) {
                return Err(StreamError::AlreadyRunning(inner.spec.name.clone()));
            }
            if inner.spec.auth == AuthPolicy::Required && state.auth.is_none() {
                return Err(StreamError::MissingAuth(inner.spec.name.clone()));
            }

            inner.registry.replace(&inner.spec.id_field, ids);
            state.generation += 1;
            let stop = CancellationToken::new();
            state.run = RunState::Running {
                stop: stop.clone(),
                generation: state.generation,
            };
            state.disconnected_at = None;
            (stop, state.generation)
        };

        log::info!(
            "[{}] starting with {} subscription(s)",
            inner.spec.name,
            inner.registry.len(&inner.spec.id_field)
        );
        tokio::spawn(run_loop(inner.clone(), stop, generation));
        Ok(())
    }

    /// Stops the loop and closes the live connection. A no-op when stopped.
    pub fn stop(&self) {
        let connection = {
            let mut state = self.inner.lock();
            match std::mem::take(&mut state.run) {
                RunState::Running { stop, .. } => stop.cancel(),
                RunState::Stopped => return,
            }
            state.disconnected_at = None;
            state.connection.take()
        };
        if let Some(connection) = connection {
            connection.close();
        }
        log::info!("[{}] stopped", self.inner.spec.name);
    }

    pub fn is_running(&self) -> bool {
        matches!(self.inner.lock().run, RunState::Running { .. })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// How long the current outage has lasted, if the channel is down.
    pub fn disconnected_for(&self) -> Option<Duration> {
        self.inner.lock().disconnected_at.map(|at| at.elapsed())
    }

    /// Replaces the whole subscription set and, when connected, resends the
    /// snapshot frame. While disconnected the new set goes out on the next
    /// dial.
    pub fn update_subscription(&self, ids: Vec<String>) -> StreamResult<()> {
        let inner = &self.inner;
        inner.registry.replace(&inner.spec.id_field, ids);

        let (connection, auth) = {
            let state = inner.lock();
            (state.connection.clone(), state.auth.clone())
        };
        match connection {
            Some(connection) => {
                let frame = inner
                    .spec
                    .snapshot_frame(&inner.registry.snapshot(&inner.spec.id_field), auth.as_deref());
                connection.send_text(frame)
            }
            None => Ok(()),
        }
    }

    /// Adds `ids` and sends a `subscribe` delta carrying all of them, even
    /// the ones already subscribed.
    ///
    /// # Errors
    /// [`StreamError::NotConnected`] when there is no live connection; the
    /// registry is left unchanged.
    pub fn subscribe(&self, ids: Vec<String>) -> StreamResult<()> {
        let connection = self.live_connection()?;
        let ids = dedup_in_order(ids);
        if ids.is_empty() {
            return Ok(());
        }
        self.inner.registry.add(&self.inner.spec.id_field, ids.iter().cloned());
        connection.send_text(self.inner.spec.delta_frame(&ids, Operation::Subscribe))
    }

    /// Removes `ids` and sends an `unsubscribe` delta carrying all of them,
    /// even the ones that were not subscribed.
    ///
    /// # Errors
    /// [`StreamError::NotConnected`] when there is no live connection; the
    /// registry is left unchanged.
    pub fn unsubscribe(&self, ids: Vec<String>) -> StreamResult<()> {
        let connection = self.live_connection()?;
        let ids = dedup_in_order(ids);
        if ids.is_empty() {
            return Ok(());
        }
        self.inner.registry.remove(&self.inner.spec.id_field, ids.iter());
        connection.send_text(self.inner.spec.delta_frame(&ids, Operation::Unsubscribe))
    }

    fn live_connection(&self) -> StreamResult<ConnectionHandle> {
        self.inner
            .lock()
            .connection
            .clone()
            .filter(|c| !c.is_closed())
            .ok_or_else(|| StreamError::NotConnected(self.inner.spec.name.clone()))
    }
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("name", &self.inner.spec.name)
            .field("url", &self.inner.spec.url)
            .field("running", &self.is_running())
            .finish()
    }
}

fn dedup_in_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

async fn run_loop(inner: Arc<Inner>, stop: CancellationToken, generation: u64) {
    let spec = &inner.spec;
    loop {
        log::info!("[{}] connecting to {}", spec.name, spec.url);
        let dialed = tokio::select! {
            _ = stop.cancelled() => break,
            result = transport::dial(&spec.url, spec.handshake_timeout) => result,
        };

        match dialed {
            Ok(ws) => {
                let reason = run_connection(&inner, ws, &stop, generation).await;
                if stop.is_cancelled() {
                    break;
                }
                log::warn!("[{}] connection lost: {}", spec.name, reason);
            }
            Err(e) => {
                inner.stats.record_dial_failure();
                log::warn!("[{}] dial failed: {}", spec.name, e);
            }
        }

        log::debug!("[{}] reconnecting in {:?}", spec.name, spec.reconnect_delay);
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(spec.reconnect_delay) => {}
        }
    }
    log::debug!("[{}] supervisor loop for run #{} exited", spec.name, generation);
}

/// Drives one connection until it ends. Returns why it ended.
async fn run_connection(inner: &Arc<Inner>, ws: WsStream, stop: &CancellationToken, generation: u64) -> String {
    let spec = &inner.spec;
    let (sink, mut stream) = ws.split();

    // Install the handle and enqueue the snapshot under one lock so no
    // delta frame can overtake it.
    let (connection, outage, on_reconnected) = {
        let mut state = inner.lock();
        state.next_connection_id += 1;
        let connection = ConnectionHandle::spawn(&spec.name, state.next_connection_id, sink);
        if !state.is_current(generation) || stop.is_cancelled() {
            connection.close();
            return "stopped before install".to_string();
        }

        let ids = inner.registry.snapshot(&spec.id_field);
        let frame = spec.snapshot_frame(&ids, state.auth.as_deref());
        if let Err(e) = connection.send_text(frame) {
            state.release(&connection, generation, stop);
            return format!("snapshot not sent: {}", e);
        }
        log::info!(
            "[{}] connected (connection #{}), subscribed to {} id(s)",
            spec.name,
            connection.id(),
            ids.len()
        );

        state.connection = Some(connection.clone());
        let outage = state.disconnected_at.take().map(|at| at.elapsed());
        (connection, outage, state.on_reconnected.clone())
    };

    if let Some(outage) = outage {
        inner.stats.record_reconnect();
        log::info!("[{}] reconnected after {:?}", spec.name, outage);
        if let Some(callback) = on_reconnected {
            callback(outage);
        }
    }

    let _heartbeat = heartbeat::spawn(
        &spec.name,
        connection.clone(),
        spec.heartbeat_interval,
        spec.heartbeat_payload.clone(),
    );

    let lifetime = connection.lifetime();
    let reason = loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break "stopped".to_string(),
            _ = lifetime.cancelled() => break "connection closed locally".to_string(),
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    log::trace!("[{}] <- {}", spec.name, text.as_str());
                    inner.dispatcher.dispatch_text(text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    inner.dispatcher.dispatch_binary(&bytes);
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => format!("closed by server ({} {})", frame.code, frame.reason.as_str()),
                        None => "closed by server".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("read error: {}", e),
                None => break "stream ended".to_string(),
            },
        }
    };

    inner.lock().release(&connection, generation, stop);
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::StreamSettings;
    use crate::core::dispatcher::callback;
    use crate::core::testkit::{wait_until, MockServer};
    use serde_json::json;

    fn market_spec(url: &str) -> ChannelSpec {
        ChannelSpec::market(&StreamSettings::default())
            .with_url(url)
            .with_reconnect_delay(Duration::from_millis(100))
            .with_heartbeat_interval(Duration::ZERO)
            .with_handshake_timeout(Duration::from_secs(2))
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_start_sends_snapshot() {
        let mut server = MockServer::start().await;
        let engine = StreamEngine::new(market_spec(&server.url));
        engine.start(ids(&["b", "a"])).unwrap();

        let (idx, frame) = server.next_json().await;
        assert_eq!(idx, 0);
        assert_eq!(frame, json!({"type": "MARKET", "assets_ids": ["a", "b"]}));
        engine.stop();
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_and_first_survives() {
        let mut server = MockServer::start().await;
        let engine = StreamEngine::new(market_spec(&server.url));
        engine.start(ids(&["a"])).unwrap();
        let err = engine.start(ids(&["z"])).unwrap_err();
        assert!(matches!(err, StreamError::AlreadyRunning(_)));

        let (_, frame) = server.next_json().await;
        assert_eq!(frame["assets_ids"], json!(["a"]));
        assert!(engine.is_running());
        engine.stop();
    }

    #[tokio::test]
    async fn test_stop_before_start_and_twice_is_noop() {
        let engine = StreamEngine::new(market_spec("ws://127.0.0.1:9/"));
        engine.stop();
        assert!(!engine.is_running());

        engine.start(vec![]).unwrap();
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_unsubscribe_while_disconnected_leaves_registry() {
        let engine = StreamEngine::new(market_spec("ws://127.0.0.1:9/"));
        let err = engine.unsubscribe(ids(&["a"])).unwrap_err();
        assert!(matches!(err, StreamError::NotConnected(_)));
        assert!(engine.subscriptions().is_empty());

        let err = engine.subscribe(ids(&["a"])).unwrap_err();
        assert!(matches!(err, StreamError::NotConnected(_)));
        assert!(engine.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_deltas_then_reconnect_resends_union() {
        let mut server = MockServer::start().await;
        let engine = StreamEngine::new(market_spec(&server.url));
        engine.start(vec![]).unwrap();
        let _ = server.next_json().await;
        wait_until(|| engine.is_connected()).await;

        engine.subscribe(ids(&["A"])).unwrap();
        engine.subscribe(ids(&["B", "A", "B"])).unwrap();
        assert_eq!(server.next_json().await.1, json!({"assets_ids": ["A"], "operation": "subscribe"}));
        assert_eq!(server.next_json().await.1, json!({"assets_ids": ["B", "A"], "operation": "subscribe"}));

        server.drop_connection(0);
        let (idx, frame) = server.next_json().await;
        assert_eq!(idx, 1);
        assert_eq!(frame, json!({"type": "MARKET", "assets_ids": ["A", "B"]}));
        wait_until(|| engine.stats().reconnects == 1).await;
        engine.stop();
    }

    #[tokio::test]
    async fn test_repeated_deltas_are_still_sent() {
        let mut server = MockServer::start().await;
        let engine = StreamEngine::new(market_spec(&server.url));
        engine.start(ids(&["a", "b"])).unwrap();
        let _ = server.next_json().await;
        wait_until(|| engine.is_connected()).await;

        engine.subscribe(ids(&["a"])).unwrap();
        assert_eq!(server.next_json().await.1, json!({"assets_ids": ["a"], "operation": "subscribe"}));

        engine.unsubscribe(ids(&["b", "zzz"])).unwrap();
        assert_eq!(server.next_json().await.1, json!({"assets_ids": ["b", "zzz"], "operation": "unsubscribe"}));
        engine.unsubscribe(ids(&["zzz"])).unwrap();
        assert_eq!(server.next_json().await.1, json!({"assets_ids": ["zzz"], "operation": "unsubscribe"}));
        assert_eq!(engine.subscriptions(), ids(&["a"]));

        engine.subscribe(vec![]).unwrap();
        server.assert_silent(Duration::from_millis(150)).await;
        engine.stop();
    }

    #[tokio::test]
    async fn test_update_subscription_resends_snapshot() {
        let mut server = MockServer::start().await;
        let engine = StreamEngine::new(market_spec(&server.url));
        engine.start(ids(&["a"])).unwrap();
        let _ = server.next_json().await;
        wait_until(|| engine.is_connected()).await;

        engine.update_subscription(ids(&["x", "y"])).unwrap();
        assert_eq!(server.next_json().await.1, json!({"type": "MARKET", "assets_ids": ["x", "y"]}));
        engine.stop();
    }

    #[tokio::test]
    async fn test_fault_redials_within_reconnect_delay_and_reports_outage() {
        let mut server = MockServer::start().await;
        let spec = market_spec(&server.url).with_heartbeat_interval(Duration::from_millis(50));
        let engine = StreamEngine::new(spec);
        let outages = Arc::new(Mutex::new(Vec::new()));
        let sink = outages.clone();
        engine.set_on_reconnected(Some(callback(move |d: Duration| sink.lock().unwrap().push(d))));

        engine.start(ids(&["a"])).unwrap();
        let (_, first) = server.next_json().await;
        wait_until(|| server.probe_count() > 0).await;

        let dropped_at = std::time::Instant::now();
        server.drop_connection(0);
        let (idx, second) = server.next_json().await;
        assert_eq!(idx, 1);
        assert_eq!(first, second);
        assert!(dropped_at.elapsed() < Duration::from_secs(2));

        wait_until(|| !outages.lock().unwrap().is_empty()).await;
        assert!(engine.disconnected_for().is_none());
        engine.stop();
    }

    #[tokio::test]
    async fn test_failed_write_tears_down_and_redials_same_snapshot() {
        let mut server = MockServer::start().await;
        let engine = StreamEngine::new(market_spec(&server.url));
        engine.start(ids(&["A"])).unwrap();
        let (idx, first) = server.next_json().await;
        assert_eq!(idx, 0);
        wait_until(|| engine.is_connected()).await;

        // A failed heartbeat or writer send closes the handle this way.
        let live = engine.inner.lock().connection.clone().unwrap();
        live.close();

        let (idx, second) = server.next_json().await;
        assert_eq!(idx, 1);
        assert_eq!(second, json!({"type": "MARKET", "assets_ids": ["A"]}));
        assert_eq!(first, second);
        assert_eq!(server.connection_count(), 2);
        wait_until(|| engine.stats().reconnects == 1).await;
        engine.stop();
    }

    #[test]
    fn test_release_closes_and_opens_outage_once() {
        let stop = CancellationToken::new();
        let mut state = EngineState {
            run: RunState::Running {
                stop: stop.clone(),
                generation: 1,
            },
            generation: 1,
            ..Default::default()
        };
        let (connection, _rx) = ConnectionHandle::detached("test", 7);
        state.release(&connection, 1, &stop);
        assert!(connection.is_closed());
        let opened = state.disconnected_at;
        assert!(opened.is_some());

        let (next, _rx) = ConnectionHandle::detached("test", 8);
        state.connection = Some(next.clone());
        state.release(&next, 1, &stop);
        assert!(state.connection.is_none());
        assert_eq!(state.disconnected_at, opened);
    }

    #[test]
    fn test_release_after_stop_leaves_no_outage() {
        let stop = CancellationToken::new();
        let mut state = EngineState::default();
        let (connection, _rx) = ConnectionHandle::detached("test", 1);
        state.release(&connection, 1, &stop);
        assert!(connection.is_closed());
        assert!(state.disconnected_at.is_none());
    }

    #[tokio::test]
    async fn test_dial_failures_retry_until_stopped() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let engine = StreamEngine::new(market_spec(&format!("ws://127.0.0.1:{}/", port)));
        engine.start(vec![]).unwrap();
        wait_until(|| engine.stats().dial_failures >= 2).await;
        assert!(!engine.is_connected());
        engine.stop();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_stop_closes_connection_and_restart_works() {
        let mut server = MockServer::start().await;
        let engine = StreamEngine::new(market_spec(&server.url));
        engine.start(ids(&["a"])).unwrap();
        let _ = server.next_json().await;
        wait_until(|| engine.is_connected()).await;

        engine.stop();
        assert!(!engine.is_connected());

        engine.start(ids(&["b"])).unwrap();
        let (idx, frame) = server.next_json().await;
        assert_eq!(idx, 1);
        assert_eq!(frame["assets_ids"], json!(["b"]));
        engine.stop();
    }

    #[tokio::test]
    async fn test_required_auth_fails_fast() {
        let engine = StreamEngine::new(ChannelSpec::user(&StreamSettings::default()).with_url("ws://127.0.0.1:9/"));
        assert!(matches!(engine.start(vec![]), Err(StreamError::MissingAuth(_))));
        assert!(!engine.is_running());
    }
}
