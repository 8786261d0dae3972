//! Process-wide publish/subscribe bus for cross-component signaling.
//!
//! Handlers run synchronously on the publishing thread, in subscription
//! order. A handler that returns an error or panics is logged and skipped;
//! delivery to the remaining handlers continues.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, trace};

/// Published by the API client after a 401 tore the session down
pub const SESSION_EXPIRED: &str = "session-expired";

/// Published by the navigator whenever the current location changes
pub const ROUTE_CHANGED: &str = "route-changed";

pub type Handler = Arc<dyn Fn(&[Value]) -> Result<()> + Send + Sync>;

/// Identifies one subscription, for targeted unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared instance used across the process
    pub fn global() -> Arc<EventBus> {
        static GLOBAL: OnceLock<Arc<EventBus>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(EventBus::new())))
    }

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&[Value]) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one subscription, or every subscription on `topic` when `id` is `None`
    pub fn unsubscribe(&self, topic: &str, id: Option<SubscriptionId>) {
        let mut listeners = self.listeners.lock();
        let Some(handlers) = listeners.get_mut(topic) else {
            return;
        };
        match id {
            Some(id) => handlers.retain(|(existing, _)| *existing != id),
            None => handlers.clear(),
        }
        if handlers.is_empty() {
            listeners.remove(topic);
        }
    }

    /// Deliver `args` to every handler on `topic`. Returns the number of
    /// handlers that completed successfully.
    pub fn publish(&self, topic: &str, args: &[Value]) -> usize {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<Handler> = match self.listeners.lock().get(topic) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        trace!(topic, handlers = handlers.len(), "Publishing event");
        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => error!(topic, error = %e, "Error in event handler"),
                Err(_) => error!(topic, "Event handler panicked"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.listeners.lock().get(topic).map(Vec::len).unwrap_or(0)
    }
}
