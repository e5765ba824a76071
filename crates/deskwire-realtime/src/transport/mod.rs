//! Transport adapter: the seam between the connectivity core and the
//! underlying realtime client.
//!
//! The core never touches TLS or frame encoding directly. A [`Transport`]
//! implementation owns the socket and translates its callbacks into
//! normalized [`TransportEvent`]s pushed into the supervisor's event
//! channel.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use deskwire_core::AppResult;

pub mod authorizer;
pub mod memory;
pub mod websocket;

pub use authorizer::{ChannelAuthorizer, HttpAuthorizer};
pub use memory::MemoryTransport;
pub use websocket::WsTransport;

/// Signed authorization returned by the auth endpoint for a private channel.
#[derive(Debug, Clone)]
pub struct ChannelAuth {
    /// Signature string the backend validates.
    pub auth: String,
    /// Optional payload signed together with `auth`.
    pub channel_data: Option<String>,
}

/// Normalized events a transport emits toward the supervisor.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection handshake completed.
    Connected {
        /// Socket id assigned by the backend, when the protocol has one.
        socket_id: Option<String>,
    },
    /// The connection dropped.
    Disconnected {
        /// Close reason, when known.
        reason: Option<String>,
    },
    /// A connection-level error.
    Error {
        /// Human-readable message.
        message: String,
        /// Whether retrying with the same parameters is pointless.
        terminal: bool,
    },
    /// The backend acknowledged a channel subscription.
    SubscriptionSucceeded {
        /// Channel name.
        channel: String,
    },
    /// The backend rejected a channel subscription.
    SubscriptionError {
        /// Channel name.
        channel: String,
        /// Rejection message.
        message: String,
    },
    /// An event arrived on a subscribed channel.
    Message {
        /// Channel name.
        channel: String,
        /// Event name.
        event: String,
        /// Decoded payload.
        payload: Value,
    },
}

/// The underlying realtime client, normalized.
///
/// Implementations must tolerate repeated connect/disconnect cycles on the
/// same instance; the supervisor drives them across reconnects.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Open the connection. Completion of the handshake is reported via
    /// [`TransportEvent::Connected`], not by this method returning.
    async fn connect(&self) -> AppResult<()>;

    /// Close the connection. No `Disconnected` event is emitted for an
    /// explicit close.
    async fn disconnect(&self);

    /// Issue a channel subscription on the live connection.
    async fn subscribe(&self, channel: &str, auth: Option<ChannelAuth>) -> AppResult<()>;

    /// Withdraw a channel subscription on the live connection.
    async fn unsubscribe(&self, channel: &str) -> AppResult<()>;

    /// Publish a client event on a channel.
    async fn publish(&self, channel: &str, event: &str, payload: &Value) -> AppResult<()>;

    /// Socket id of the live connection, if any.
    fn socket_id(&self) -> Option<String>;
}
