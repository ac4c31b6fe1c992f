//! Framework-agnostic event fan-out.
//!
//! The EventBus decouples producers (connection state changes, dispatched
//! inbound envelopes) from consumers (UI bindings, the CLI, the session's own
//! history recorder).
//!
//! Two ways to consume events:
//!
//! - [`EventBus::subscribe`] registers a callback for one [`Topic`]. Callbacks
//!   run synchronously on the publisher's thread, in registration order, and
//!   never miss an event.
//! - [`EventBus::tap`] returns a broadcast receiver of every publication for
//!   async consumers. A slow tap lags and misses events.
//!
//! # Example
//!
//! ```rust
//! use agui_core::event_bus::EventBus;
//! use agui_core::events::{SessionEvent, Topic};
//! use agui_core::connection::ConnectionState;
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(Topic::Connection, |event| {
//!     println!("{:?}", event);
//!     Ok(())
//! });
//!
//! bus.publish(SessionEvent::Connection { status: ConnectionState::Connected });
//! bus.unsubscribe(Topic::Connection, id);
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::events::{SessionEvent, Topic};

/// Default capacity of the broadcast tap.
/// Taps further behind than this miss events (lag).
const DEFAULT_TAP_CAPACITY: usize = 1024;

/// What a handler returns. An `Err` is reported, not propagated.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&SessionEvent) -> HandlerResult + Send + Sync>;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of a single publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

pub struct EventBus {
    handlers: Mutex<HashMap<Topic, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new EventBus with default tap capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TAP_CAPACITY)
    }

    /// Create a new EventBus with the given tap capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tap,
        }
    }

    /// Register a handler for `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        let Some(list) = handlers.get_mut(&topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        before != list.len()
    }

    /// Deliver `event` to every handler of its topic, then to taps.
    ///
    /// Handlers registered or removed while this call runs take effect from
    /// the next publication.
    pub fn publish(&self, event: SessionEvent) -> Delivery {
        let topic = event.topic();
        let snapshot: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .lock()
            .unwrap()
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        let mut delivery = Delivery::default();
        for (id, handler) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    log::warn!("Handler {:?} on topic {} failed: {}", id, topic, e);
                }
                Err(panic) => {
                    delivery.failed += 1;
                    log::error!(
                        "Handler {:?} on topic {} panicked: {}",
                        id,
                        topic,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        let _ = self.tap.send(event);
        delivery
    }

    /// Receive every future publication, across all topics.
    pub fn tap(&self) -> broadcast::Receiver<SessionEvent> {
        self.tap.subscribe()
    }

    /// Number of handlers currently registered for `topic`.
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.handlers
            .lock()
            .unwrap()
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Number of live taps.
    pub fn tap_count(&self) -> usize {
        self.tap.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================
