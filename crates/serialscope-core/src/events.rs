//! State change notifications
//!
//! Consumers register a callback per [`StateEvent`]; the monitor components
//! publish through a shared [`EventBus`] handed to them at construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Named state changes observable by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEvent {
    /// A device refresh finished and the list was replaced
    DeviceListChanged,
    /// The connection opened, closed, or an open attempt failed
    ConnectionChanged,
    /// The outgoing message was modified
    MessageChanged,
    /// The receive loop completed an iteration or the buffer was cleared
    ReceiveBufferChanged,
}

impl StateEvent {
    /// All events, in declaration order
    pub const ALL: [StateEvent; 4] = [
        StateEvent::DeviceListChanged,
        StateEvent::ConnectionChanged,
        StateEvent::MessageChanged,
        StateEvent::ReceiveBufferChanged,
    ];

    /// Event name as emitted to the UI layer
    pub fn name(&self) -> &'static str {
        match self {
            StateEvent::DeviceListChanged => "device_list_changed",
            StateEvent::ConnectionChanged => "connection_changed",
            StateEvent::MessageChanged => "message_changed",
            StateEvent::ReceiveBufferChanged => "receive_buffer_changed",
        }
    }
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(StateEvent) + Send + Sync>;

/// Explicit publish/subscribe registry for [`StateEvent`]s
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<StateEvent, Vec<(SubscriptionId, Callback)>>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`
    pub fn subscribe<F>(&self, event: StateEvent, callback: F) -> SubscriptionId
    where
        F: Fn(StateEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers
                .entry(event)
                .or_default()
                .push((id, Arc::new(callback)));
        }
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return false;
        };
        let mut removed = false;
        for callbacks in subscribers.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(sub, _)| *sub != id);
            removed |= callbacks.len() != before;
        }
        removed
    }

    /// Number of callbacks registered for `event`
    pub fn subscriber_count(&self, event: StateEvent) -> usize {
        self.subscribers
            .lock()
            .map(|s| s.get(&event).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Invoke every callback registered for `event` on the calling thread.
    ///
    /// The registry lock is released before callbacks run, so a callback may
    /// subscribe or unsubscribe.
    pub fn publish(&self, event: StateEvent) {
        let callbacks: Vec<Callback> = match self.subscribers.lock() {
            Ok(subscribers) => subscribers
                .get(&event)
                .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default(),
            Err(_) => return,
        };

        tracing::trace!(%event, subscribers = callbacks.len(), "publish");
        for callback in callbacks {
            callback(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("EventBus");
        for event in StateEvent::ALL {
            dbg.field(event.name(), &self.subscriber_count(event));
        }
        dbg.finish()
    }
}
