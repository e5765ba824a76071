//! # deskwire-realtime
//!
//! Realtime connectivity core for Deskwire. Provides:
//!
//! - A single supervised connection with backoff-driven reconnects
//! - Channel subscription multiplexing with replay across reconnects
//! - Heartbeat-driven user presence with TTL expiry
//! - Reference-counted status observation for independent consumers
//! - A websocket transport plus an in-process transport for tests

pub mod channel;
pub mod connection;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod service;
pub mod transport;

pub use channel::registry::ChannelRegistry;
pub use channel::types::{ChannelKind, EventHandler, SUBSCRIPTION_ERROR_EVENT, handler};
pub use connection::state::ConnectionState;
pub use connection::supervisor::ConnectionSupervisor;
pub use hub::{StatusHandle, StatusHub};
pub use presence::heartbeat::HeartbeatService;
pub use presence::roster::PresenceRoster;
pub use service::RealtimeService;
pub use transport::{MemoryTransport, Transport, TransportEvent, WsTransport};
