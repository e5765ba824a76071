//! Channel subscription registry.
//!
//! Tracks desired subscriptions independently of connection state. The
//! supervisor replays the tracked set whenever the connection is
//! re-established; consumers never observe the reconnect window.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::metrics::CoreMetrics;

use super::channel::ChannelEntry;
use super::types::{ChannelKind, EventHandler};

/// Result of merging a subscribe call into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// First subscription for this channel; the transport needs a
    /// subscribe call once connected.
    NewChannel,
    /// Handlers were merged into an already-tracked channel.
    Merged,
}

#[derive(Debug, Default)]
struct RegistryInner {
    channels: HashMap<String, ChannelEntry>,
    next_order: u64,
}

/// Registry of all tracked channel subscriptions.
#[derive(Debug)]
pub struct ChannelRegistry {
    inner: Mutex<RegistryInner>,
    metrics: Arc<CoreMetrics>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new(metrics: Arc<CoreMetrics>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            metrics,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().expect("registry lock poisoned")
    }

    /// Merges handlers into the registry.
    ///
    /// An existing channel keeps its original kind; handlers for each named
    /// event are appended in registration order, skipping exact duplicates
    /// (same `Arc`). Transport-level work is the caller's concern and is
    /// only needed for [`SubscribeOutcome::NewChannel`].
    pub fn subscribe(
        &self,
        name: &str,
        kind: ChannelKind,
        handlers: Vec<(String, EventHandler)>,
    ) -> SubscribeOutcome {
        let mut inner = self.lock();
        let outcome = if inner.channels.contains_key(name) {
            SubscribeOutcome::Merged
        } else {
            let order = inner.next_order;
            inner.next_order += 1;
            inner.channels.insert(
                name.to_string(),
                ChannelEntry::new(name.to_string(), kind, order),
            );
            SubscribeOutcome::NewChannel
        };

        let entry = inner
            .channels
            .get_mut(name)
            .expect("channel entry present");
        if outcome == SubscribeOutcome::Merged && entry.kind != kind {
            warn!(
                channel = %name,
                kept = ?entry.kind,
                "Subscribe with conflicting channel kind, keeping original"
            );
        }

        for (event, handler) in handlers {
            if !entry.add_handler(&event, handler) {
                debug!(channel = %name, event = %event, "Duplicate handler ignored");
            }
        }

        outcome
    }

    /// Removes handlers from a channel.
    ///
    /// With an event name, only that event's handlers are removed; without,
    /// the whole channel is dropped. Returns `true` when the channel entry
    /// was removed entirely, meaning the caller should withdraw the
    /// transport-level subscription. Unknown channels are a no-op.
    pub fn unsubscribe(&self, name: &str, event: Option<&str>) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.channels.get_mut(name) else {
            return false;
        };

        match event {
            Some(event) => {
                entry.remove_event(event);
                if entry.is_empty() {
                    inner.channels.remove(name);
                    true
                } else {
                    false
                }
            }
            None => {
                inner.channels.remove(name);
                true
            }
        }
    }

    /// All tracked channels in original subscription order.
    pub fn channels_in_order(&self) -> Vec<(String, ChannelKind)> {
        let inner = self.lock();
        let mut channels: Vec<&ChannelEntry> = inner.channels.values().collect();
        channels.sort_by_key(|entry| entry.order);
        channels
            .into_iter()
            .map(|entry| (entry.name.clone(), entry.kind))
            .collect()
    }

    /// Records that the transport acknowledged a subscription.
    pub fn mark_live(&self, name: &str) {
        if let Some(entry) = self.lock().channels.get_mut(name) {
            entry.live = true;
        }
    }

    /// Records that every transport-level subscription died with the
    /// connection.
    pub fn mark_all_offline(&self) {
        for entry in self.lock().channels.values_mut() {
            entry.live = false;
        }
    }

    /// Channels with a live transport subscription.
    pub fn live_channels(&self) -> Vec<String> {
        let mut live: Vec<String> = self
            .lock()
            .channels
            .values()
            .filter(|entry| entry.live)
            .map(|entry| entry.name.clone())
            .collect();
        live.sort();
        live
    }

    /// Names of all tracked channels, sorted.
    pub fn tracked_channels(&self) -> Vec<String> {
        let mut tracked: Vec<String> = self.lock().channels.keys().cloned().collect();
        tracked.sort();
        tracked
    }

    /// Whether a channel is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().channels.contains_key(name)
    }

    /// Total handler count for a channel.
    pub fn handler_count(&self, name: &str) -> usize {
        self.lock()
            .channels
            .get(name)
            .map(ChannelEntry::handler_count)
            .unwrap_or(0)
    }

    /// Routes an inbound message to every handler registered for the
    /// (channel, event) pair, in registration order.
    ///
    /// A panicking handler is isolated: it is logged, counted, and does not
    /// prevent the remaining handlers from running. Returns the number of
    /// handlers invoked.
    pub fn dispatch(&self, channel: &str, event: &str, payload: &Value) -> usize {
        let handlers = {
            let inner = self.lock();
            match inner.channels.get(channel) {
                Some(entry) => entry.handlers_for(event),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            debug!(channel = %channel, event = %event, "No handlers for inbound message");
            return 0;
        }

        let mut invoked = 0;
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => invoked += 1,
                Err(_) => {
                    self.metrics.handler_failure();
                    error!(
                        channel = %channel,
                        event = %event,
                        "Event handler panicked, continuing dispatch"
                    );
                }
            }
        }

        self.metrics.messages_dispatched(invoked as u64);
        invoked
    }

    /// Drops every tracked channel.
    pub fn clear(&self) {
        self.lock().channels.clear();
    }
}
