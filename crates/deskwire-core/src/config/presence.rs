//! Presence and heartbeat configuration.

use serde::{Deserialize, Serialize};

/// Presence heartbeat configuration.
///
/// The TTL should comfortably exceed the heartbeat interval so that a
/// single dropped signal does not flip a user offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Interval between liveness signals in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Window after the last liveness signal during which a user counts as online.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Channel carrying liveness signals. Must be a `private-` channel so
    /// the backend accepts client events on it.
    #[serde(default = "default_heartbeat_channel")]
    pub heartbeat_channel: String,
    /// Client event name for liveness signals.
    #[serde(default = "default_heartbeat_event")]
    pub heartbeat_event: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            ttl_seconds: default_ttl(),
            heartbeat_channel: default_heartbeat_channel(),
            heartbeat_event: default_heartbeat_event(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    15
}

fn default_ttl() -> u64 {
    45
}

fn default_heartbeat_channel() -> String {
    "private-online".to_string()
}

fn default_heartbeat_event() -> String {
    "client-heartbeat".to_string()
}
