//! # Message Dispatcher
//!
//! Routes every normalized message to at most one typed handler.
//!
//! A channel declares a fixed route table: each [`Route`] matches one
//! discriminant field (`event_type`, `stream`) against a value (or any value)
//! and names the handler slot it feeds. Handlers are installed and removed at
//! runtime by the channel facades. Delivery is synchronous on the read-loop
//! task, so callbacks observe messages in wire order.
//!
//! A slot without a handler costs nothing: the message is skipped before
//! deserialization. A callback that panics is caught, logged and counted; the
//! remaining messages of the frame are still delivered.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::codec::{decode_binary_frame, decode_frame, Frame, RawMessage};
use crate::core::stats::StreamStats;

/// A caller-supplied event callback.
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<T, F>(f: F) -> Callback<T>
where
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A callback that forwards every event into an unbounded channel.
///
/// Events sent after the receiver is dropped are discarded.
pub fn forward_to<T>(tx: mpsc::UnboundedSender<T>) -> Callback<T>
where
    T: Send + 'static,
{
    Arc::new(move |event| {
        let _ = tx.send(event);
    })
}

/// The value a route expects in its discriminant field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteValue {
    Exact(String),
    /// Any value, as long as the field is present.
    Any,
}

/// One entry of a channel's route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub field: String,
    pub value: RouteValue,
    pub slot: String,
}

impl Route {
    pub fn exact(field: &str, value: &str, slot: &str) -> Self {
        Self {
            field: field.to_string(),
            value: RouteValue::Exact(value.to_string()),
            slot: slot.to_string(),
        }
    }

    pub fn any(field: &str, slot: &str) -> Self {
        Self {
            field: field.to_string(),
            value: RouteValue::Any,
            slot: slot.to_string(),
        }
    }

    fn matches(&self, message: &RawMessage) -> bool {
        let Some(found) = message.get(&self.field) else {
            return false;
        };
        match &self.value {
            RouteValue::Any => !found.is_null(),
            RouteValue::Exact(expected) => found.as_str() == Some(expected.as_str()),
        }
    }
}

type ErasedHandler = Arc<dyn Fn(RawMessage) -> Result<(), serde_json::Error> + Send + Sync>;

/// Per-channel router from raw messages to typed callbacks.
pub struct Dispatcher {
    channel: String,
    routes: Vec<Route>,
    handlers: RwLock<HashMap<String, ErasedHandler>>,
    stats: Arc<StreamStats>,
    log_dropped: bool,
}

impl Dispatcher {
    pub fn new(channel: &str, routes: Vec<Route>, stats: Arc<StreamStats>, log_dropped: bool) -> Self {
        Self {
            channel: channel.to_string(),
            routes,
            handlers: RwLock::new(HashMap::new()),
            stats,
            log_dropped,
        }
    }

    /// Installs (`Some`) or removes (`None`) the handler for `slot`.
    ///
    /// Messages routed to `slot` are deserialized into `T` only while a
    /// handler is installed.
    pub fn set_handler<T>(&self, slot: &str, callback: Option<Callback<T>>)
    where
        T: DeserializeOwned + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match callback {
            Some(cb) => {
                let erased: ErasedHandler = Arc::new(move |message: RawMessage| {
                    let event: T = serde_json::from_value(Value::Object(message))?;
                    cb(event);
                    Ok(())
                });
                handlers.insert(slot.to_string(), erased);
            }
            None => {
                handlers.remove(slot);
            }
        }
    }

    pub fn has_handler(&self, slot: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(slot)
    }

    /// Decodes and delivers one text frame. Returns the number of callbacks
    /// that completed.
    pub fn dispatch_text(&self, text: &str) -> usize {
        self.stats.record_frame();
        self.dispatch_frame(decode_frame(text), text)
    }

    /// Same as [`Dispatcher::dispatch_text`] for a binary frame.
    pub fn dispatch_binary(&self, bytes: &[u8]) -> usize {
        self.stats.record_frame();
        self.dispatch_frame(decode_binary_frame(bytes), "<binary>")
    }

    fn dispatch_frame(&self, frame: Frame, raw: &str) -> usize {
        match frame {
            Frame::Control => {
                log::trace!("[{}] control frame", self.channel);
                0
            }
            Frame::Dropped(reason) => {
                self.stats.record_drop();
                self.report_drop(reason, raw);
                0
            }
            Frame::Messages(messages) => messages
                .into_iter()
                .map(|message| self.deliver(message))
                .filter(|delivered| *delivered)
                .count(),
        }
    }

    fn deliver(&self, message: RawMessage) -> bool {
        let Some(route) = self.routes.iter().find(|r| r.matches(&message)) else {
            log::trace!("[{}] unrouted message ignored", self.channel);
            return false;
        };

        // Clone the handler out so the lock is not held while user code runs.
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&route.slot)
            .cloned();
        let Some(handler) = handler else {
            return false;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(Ok(())) => {
                self.stats.record_dispatch();
                true
            }
            Ok(Err(e)) => {
                self.stats.record_drop();
                self.report_drop("message does not match event shape", &e.to_string());
                false
            }
            Err(_) => {
                self.stats.record_panic();
                log::error!("[{}] callback for '{}' panicked; continuing", self.channel, route.slot);
                false
            }
        }
    }

    fn report_drop(&self, reason: &str, detail: &str) {
        let detail: String = detail.chars().take(200).collect();
        if self.log_dropped {
            log::warn!("[{}] dropped frame ({}): {}", self.channel, reason, detail);
        } else {
            log::debug!("[{}] dropped frame ({}): {}", self.channel, reason, detail);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel)
            .field("routes", &self.routes)
            .finish()
    }
}
