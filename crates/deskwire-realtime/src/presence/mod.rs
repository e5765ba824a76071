//! User presence tracking.

pub mod heartbeat;
pub mod roster;

pub use heartbeat::{HeartbeatService, liveness_handler};
pub use roster::PresenceRoster;
