//! Connection lifecycle management.

pub mod backoff;
pub mod state;
pub mod supervisor;

pub use state::{ConnectionState, StatusChange};
pub use supervisor::{ConnectionSupervisor, StatusHandler, StatusRegistration};
