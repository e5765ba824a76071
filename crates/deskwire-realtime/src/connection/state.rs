//! Connection state definitions.

use serde::{Deserialize, Serialize};

/// State of the single underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// A connect or reconnect attempt is in progress.
    Connecting,
    /// The handshake completed; subscriptions are live.
    Connected,
    /// Retries were exhausted or the backend refused the connection.
    /// Requires an explicit reconnect.
    Failed,
}

impl ConnectionState {
    /// Converts to string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single state transition delivered to status observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    /// The state entered.
    pub state: ConnectionState,
    /// Accompanying error message, present on `Failed`.
    pub error: Option<String>,
}
