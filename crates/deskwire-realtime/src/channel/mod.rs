//! Channel subscription tracking and message dispatch.

pub mod channel;
pub mod registry;
pub mod types;

pub use registry::{ChannelRegistry, SubscribeOutcome};
pub use types::{ChannelKind, EventHandler, SUBSCRIPTION_ERROR_EVENT, handler};
