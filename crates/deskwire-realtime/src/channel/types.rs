//! Channel type definitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved event name under which authorization rejections are dispatched
/// to a channel's handlers.
pub const SUBSCRIPTION_ERROR_EVENT: &str = "deskwire:subscription_error";

/// Whether a channel requires signed authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Open to any connection.
    Public,
    /// Requires a signed payload from the auth endpoint.
    Private,
}

impl ChannelKind {
    /// Infers the kind from the backend's channel naming convention.
    pub fn infer(channel: &str) -> Self {
        if channel.starts_with("private-") || channel.starts_with("presence-") {
            Self::Private
        } else {
            Self::Public
        }
    }

    /// Returns whether this kind requires authorization.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// A consumer-supplied event callback.
///
/// Handler identity is Arc pointer identity: registering the same `Arc`
/// twice for the same (channel, event) pair is a no-op.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Builds an [`EventHandler`] from a closure.
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}
