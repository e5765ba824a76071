//! Realtime connection configuration.

use serde::{Deserialize, Serialize};

/// Realtime connection configuration.
///
/// Covers the websocket endpoint, the private-channel authorization
/// endpoint, and the reconnect policy. Backoff timing is bounded but not a
/// correctness-critical contract; the defaults here are the documented
/// choices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Application key issued by the realtime backend.
    pub app_key: String,
    /// Backend cluster identifier.
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// Explicit websocket host; overrides the cluster-derived default.
    #[serde(default)]
    pub host: Option<String>,
    /// Whether to connect over TLS (`wss://`).
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// HTTP endpoint that signs private-channel subscription requests.
    #[serde(default)]
    pub auth_endpoint: Option<String>,
    /// Timeout for a single connect attempt in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Initial reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,
    /// Multiplier applied to the reconnect delay after each failed attempt.
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
    /// Upper bound on the reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
    /// Seconds of sustained connection after which the backoff resets.
    #[serde(default = "default_stable_after")]
    pub reconnect_stable_after_seconds: u64,
    /// Failed attempts tolerated before the connection is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,
    /// Buffer size for the transport event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
    /// Protocol-level ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Protocol-level ping timeout in seconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_seconds: u64,
}

impl RealtimeConfig {
    /// Builds the websocket URL for this configuration.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        let host = self
            .host
            .clone()
            .unwrap_or_else(|| format!("ws-{}.pusher.com", self.cluster));
        format!(
            "{scheme}://{host}/app/{}?protocol=7&client=deskwire&version={}",
            self.app_key,
            env!("CARGO_PKG_VERSION"),
        )
    }
}

fn default_cluster() -> String {
    "mt1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_initial() -> u64 {
    1000
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

fn default_reconnect_max() -> u64 {
    30_000
}

fn default_stable_after() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    6
}

fn default_event_buffer() -> usize {
    256
}

fn default_ping_interval() -> u64 {
    30
}

fn default_ping_timeout() -> u64 {
    10
}
