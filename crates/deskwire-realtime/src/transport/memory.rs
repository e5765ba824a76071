//! In-process transport for tests and demos.
//!
//! Connects instantly (or on command), records every call it receives, and
//! lets the caller inject inbound events as if the backend had sent them.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use deskwire_core::{AppError, AppResult};

use super::{ChannelAuth, Transport, TransportEvent};

#[derive(Debug, Default)]
struct MemoryState {
    connected: bool,
    auto_connect: bool,
    fail_connects_remaining: u32,
    connect_calls: u32,
    subscribe_calls: Vec<String>,
    unsubscribe_calls: Vec<String>,
    published: Vec<(String, String, Value)>,
    socket_serial: u32,
    socket_id: Option<String>,
}

/// In-process [`Transport`] implementation.
#[derive(Debug)]
pub struct MemoryTransport {
    events: mpsc::Sender<TransportEvent>,
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    /// A transport whose `connect` completes the handshake immediately.
    pub fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            events,
            state: Mutex::new(MemoryState {
                auto_connect: true,
                ..MemoryState::default()
            }),
        }
    }

    /// A transport whose handshake only completes when
    /// [`MemoryTransport::complete_connect`] is called.
    pub fn manual(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            events,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.try_send(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory transport lock poisoned")
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().fail_connects_remaining = count;
    }

    /// Complete a pending handshake (for transports built with `manual`).
    pub fn complete_connect(&self) {
        let socket_id = {
            let mut state = self.lock();
            state.connected = true;
            state.socket_serial += 1;
            let id = format!("mem-{}", state.socket_serial);
            state.socket_id = Some(id.clone());
            id
        };
        self.emit(TransportEvent::Connected {
            socket_id: Some(socket_id),
        });
    }

    /// Simulate the backend dropping the connection.
    pub fn drop_connection(&self, reason: &str) {
        {
            let mut state = self.lock();
            state.connected = false;
            state.socket_id = None;
        }
        self.emit(TransportEvent::Disconnected {
            reason: Some(reason.to_string()),
        });
    }

    /// Emit a connection-level error.
    pub fn emit_error(&self, message: &str, terminal: bool) {
        self.emit(TransportEvent::Error {
            message: message.to_string(),
            terminal,
        });
    }

    /// Simulate the backend rejecting a channel subscription.
    pub fn reject_subscription(&self, channel: &str, message: &str) {
        self.emit(TransportEvent::SubscriptionError {
            channel: channel.to_string(),
            message: message.to_string(),
        });
    }

    /// Inject an inbound channel message.
    pub fn inject(&self, channel: &str, event: &str, payload: Value) {
        self.emit(TransportEvent::Message {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        });
    }

    /// Number of connect attempts issued so far.
    pub fn connect_calls(&self) -> u32 {
        self.lock().connect_calls
    }

    /// Every channel passed to `subscribe`, in call order.
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.lock().subscribe_calls.clone()
    }

    /// Every channel passed to `unsubscribe`, in call order.
    pub fn unsubscribe_calls(&self) -> Vec<String> {
        self.lock().unsubscribe_calls.clone()
    }

    /// Every published client event, in call order.
    pub fn published(&self) -> Vec<(String, String, Value)> {
        self.lock().published.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> AppResult<()> {
        let auto_complete = {
            let mut state = self.lock();
            state.connect_calls += 1;
            if state.fail_connects_remaining > 0 {
                state.fail_connects_remaining -= 1;
                return Err(AppError::transport_unavailable("simulated connect failure"));
            }
            state.auto_connect
        };
        if auto_complete {
            self.complete_connect();
        }
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.socket_id = None;
    }

    async fn subscribe(&self, channel: &str, _auth: Option<ChannelAuth>) -> AppResult<()> {
        {
            let mut state = self.lock();
            if !state.connected {
                return Err(AppError::transport_unavailable("not connected"));
            }
            state.subscribe_calls.push(channel.to_string());
        }
        self.emit(TransportEvent::SubscriptionSucceeded {
            channel: channel.to_string(),
        });
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.unsubscribe_calls.push(channel.to_string());
        Ok(())
    }

    async fn publish(&self, channel: &str, event: &str, payload: &Value) -> AppResult<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(AppError::transport_unavailable("not connected"));
        }
        state
            .published
            .push((channel.to_string(), event.to_string(), payload.clone()));
        Ok(())
    }

    fn socket_id(&self) -> Option<String> {
        self.lock().socket_id.clone()
    }
}
