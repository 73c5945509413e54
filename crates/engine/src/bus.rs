// SPDX-License-Identifier: MIT

//! Synchronous in-process pub/sub.
//!
//! `subscribe`/`unsubscribe`/`emit` are mutually safe to call concurrently.
//! A subscriber that panics or returns an error is logged and skipped; it
//! never prevents the remaining subscribers from seeing the event.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ame_core::WorkflowEvent;
use parking_lot::RwLock;
use tracing::error;

/// Opaque subscriber handle returned by [`EventBus::subscribe`], used to
/// precisely remove a callback with [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// A callback invoked synchronously for every broadcast event. May return
/// an error; the bus logs it and continues to the next subscriber.
pub type Subscriber = Arc<dyn Fn(&WorkflowEvent) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<(SubscriberId, Subscriber)>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Arc::new(RwLock::new(Vec::new())), next_id: Arc::new(AtomicU64::new(1)) }
    }

    /// Append a callback to the subscriber list. A subscriber added mid-
    /// broadcast is not guaranteed to observe the in-flight event.
    pub fn subscribe(&self, callback: Subscriber) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, callback));
        id
    }

    /// Remove a subscriber; no-op if `id` is not present.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().retain(|(existing, _)| *existing != id);
    }

    /// Deliver `event` to every current subscriber, in subscription order.
    /// Never returns early: one faulty subscriber does not block the rest.
    pub fn emit(&self, event: &WorkflowEvent) {
        let subscribers = self.subscribers.read().clone();
        for (id, callback) in subscribers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
            match unwrap_panic(outcome) {
                Ok(()) => {}
                Err(message) => {
                    error!(subscriber = id.0, workflow_id = %event.workflow_id, error = %message, "event bus subscriber failed");
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

fn unwrap_panic(outcome: std::thread::Result<Result<(), String>>) -> Result<(), String> {
    match outcome {
        Ok(inner) => inner,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "subscriber panicked".to_string());
            Err(message)
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
