//! Single channel entry: event name to handler set mapping.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{ChannelKind, EventHandler};

/// One tracked channel and the handlers its consumers registered.
#[derive(Clone)]
pub struct ChannelEntry {
    /// Channel name.
    pub name: String,
    /// Whether subscription requires authorization.
    pub kind: ChannelKind,
    /// Insertion order, used for replay ordering.
    pub order: u64,
    /// Whether the transport currently holds a live subscription.
    pub live: bool,
    /// Event name to handlers, in registration order.
    handlers: HashMap<String, Vec<EventHandler>>,
}

impl std::fmt::Debug for ChannelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("order", &self.order)
            .field("live", &self.live)
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ChannelEntry {
    /// Creates an empty entry.
    pub fn new(name: String, kind: ChannelKind, order: u64) -> Self {
        Self {
            name,
            kind,
            order,
            live: false,
            handlers: HashMap::new(),
        }
    }

    /// Adds a handler for an event, preserving registration order.
    ///
    /// Returns `false` when the exact same handler is already registered
    /// for that event.
    pub fn add_handler(&mut self, event: &str, handler: EventHandler) -> bool {
        let entry = self.handlers.entry(event.to_string()).or_default();
        if entry.iter().any(|existing| Arc::ptr_eq(existing, &handler)) {
            return false;
        }
        entry.push(handler);
        true
    }

    /// Removes every handler for an event.
    pub fn remove_event(&mut self, event: &str) {
        self.handlers.remove(event);
    }

    /// Handlers registered for an event, in registration order.
    pub fn handlers_for(&self, event: &str) -> Vec<EventHandler> {
        self.handlers.get(event).cloned().unwrap_or_default()
    }

    /// Total handler count across all events.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Whether no handlers remain.
    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }
}
