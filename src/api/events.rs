//! Event system for relay notifications
//!
//! The core never renders anything. Log lines, roster changes and
//! lifecycle transitions are dispatched as [`Event`]s to registered
//! handlers; a display, a roster view or a test harness consumes them as
//! it sees fit.

use parking_lot::RwLock;
use std::sync::Arc;

/// Format a system transition for the log sink
///
/// Connected/disconnected/authorized/started transitions all surface with
/// this prefix.
pub fn system_msg(msg: &str) -> String {
    format!("SYSTEM: {}", msg)
}

/// Format an error for the log sink
pub fn error_msg(msg: &str) -> String {
    format!("ERROR: {}", msg)
}

/// Events delivered to application handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A human-readable line for an append-only log sink: received chat
    /// text, or a `SYSTEM:` / `ERROR:` prefixed notice
    Log {
        /// The pre-formatted line
        line: String,
    },

    /// A peer passed the handshake and entered the registry (roster add)
    PeerJoined {
        /// Connection id, unique for the server's lifetime
        id: u64,
        /// Display name established by the handshake
        username: String,
    },

    /// A peer left the registry (roster remove)
    PeerLeft {
        /// Connection id of the departed peer
        id: u64,
    },

    /// The server's accept loop is running
    ServerStarted,

    /// The server's accept loop has stopped (existing connections live on)
    ServerStopped,

    /// The client authenticated and may now send
    Connected,

    /// The client's connection has fully torn down
    Disconnected,
}

/// Handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Type alias for event handler callbacks
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync + 'static>;

/// Manages event subscriptions and delivery.
///
/// Cheap to clone; clones share the same handler list. Dispatch happens on
/// whatever task produced the event, so handlers should hand heavy work to
/// a channel rather than doing it inline.
pub struct EventHandlers {
    handlers: Arc<RwLock<Vec<(SubscriptionHandle, EventCallback)>>>,
    next_id: Arc<RwLock<u64>>,
}

impl EventHandlers {
    /// Create a new event handler registry
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(RwLock::new(0)),
        }
    }

    /// Register a handler for all future events.
    ///
    /// Returns a handle for [`EventHandlers::unsubscribe`]; dropping the
    /// handle does not unsubscribe.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let mut next_id = self.next_id.write();
        let handle = SubscriptionHandle::new(*next_id);
        *next_id += 1;

        self.handlers.write().push((handle, Arc::new(callback)));
        handle
    }

    /// Remove a handler. Unknown handles are a no-op.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.handlers.write().retain(|(h, _)| *h != handle);
    }

    /// Deliver an event to every registered handler, in subscription
    /// order. A panicking handler is caught and logged; the remaining
    /// handlers still run.
    pub fn dispatch(&self, event: Event) {
        let handlers = self.handlers.read();

        for (handle, callback) in handlers.iter() {
            let event_clone = event.clone();
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event_clone);
            })) {
                tracing::error!(
                    "Event handler {:?} panicked: {:?}",
                    handle,
                    e.downcast_ref::<&str>()
                        .copied()
                        .or_else(|| e.downcast_ref::<String>().map(|s| s.as_str()))
                        .unwrap_or("unknown panic")
                );
            }
        }
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventHandlers {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}
