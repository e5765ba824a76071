//! Wire message envelope and protocol event definitions.
//!
//! The backend speaks the Pusher Channels protocol (version 7): every frame
//! is a JSON object with an `event` name, an optional `channel`, and a
//! `data` payload. Inbound `data` is frequently double-encoded (a JSON
//! string containing JSON); [`WireMessage::data_value`] normalizes both
//! forms.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use deskwire_core::AppResult;

/// Protocol event names.
pub mod events {
    /// Handshake completion; carries the socket id.
    pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
    /// Connection-level error.
    pub const ERROR: &str = "pusher:error";
    /// Channel subscription request.
    pub const SUBSCRIBE: &str = "pusher:subscribe";
    /// Channel unsubscription request.
    pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
    /// Subscription acknowledgement.
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
    /// Subscription rejection (authorization or channel errors).
    pub const SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";
    /// Keepalive ping.
    pub const PING: &str = "pusher:ping";
    /// Keepalive pong.
    pub const PONG: &str = "pusher:pong";
}

/// A single protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Event name.
    pub event: String,
    /// Channel the event belongs to, absent for connection-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl WireMessage {
    /// Build a connection-level frame.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            channel: None,
            data,
        }
    }

    /// Build a channel frame.
    pub fn on_channel(event: impl Into<String>, channel: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            channel: Some(channel.into()),
            data,
        }
    }

    /// Parse a frame from raw text.
    pub fn parse(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize the frame to wire text.
    pub fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The payload with double-encoding stripped.
    ///
    /// Inbound frames carry `data` either as a JSON value or as a string
    /// containing JSON. Strings that fail to parse are returned as-is.
    pub fn data_value(&self) -> Value {
        match &self.data {
            Value::String(inner) => {
                serde_json::from_str(inner).unwrap_or_else(|_| self.data.clone())
            }
            other => other.clone(),
        }
    }
}

/// Payload of [`events::CONNECTION_ESTABLISHED`].
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionEstablished {
    /// Socket id assigned by the backend; required for private-channel auth.
    pub socket_id: String,
    /// Backend-suggested activity timeout in seconds.
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

/// Payload of [`events::ERROR`].
///
/// Codes 4000-4099 are terminal (the backend will not accept a retry with
/// the same parameters); 4100-4199 ask the client to back off; anything
/// else permits an immediate reconnect.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolError {
    /// Numeric error code.
    #[serde(default)]
    pub code: Option<u16>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl ProtocolError {
    /// Whether the code indicates an error that must not be retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self.code, Some(code) if (4000..4100).contains(&code))
    }
}

/// Payload of [`events::SUBSCRIBE`].
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    /// Channel to subscribe to.
    pub channel: String,
    /// Signed authorization for private channels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Optional presence payload signed together with `auth`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

/// Payload of a liveness signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liveness {
    /// User the signal is about.
    pub user_id: String,
}
