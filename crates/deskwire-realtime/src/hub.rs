//! Status observer hub: reference-counted interest in connectivity.
//!
//! Consumers register for status changes and receive a handle; the first
//! registration brings the connection up, and teardown happens only when
//! the last handle is gone AND the session has ended. Keeping the
//! connection warm while a session exists avoids connection thrashing as
//! consumers come and go across route navigations.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use deskwire_core::session::Session;

use crate::channel::registry::ChannelRegistry;
use crate::connection::supervisor::{ConnectionSupervisor, StatusHandler};
use crate::connection::supervisor::StatusRegistration;
use crate::presence::heartbeat::HeartbeatService;

/// Reference-counted registry of status observers.
pub struct StatusHub {
    supervisor: Arc<ConnectionSupervisor>,
    heartbeat: Arc<HeartbeatService>,
    registry: Arc<ChannelRegistry>,
    session: Arc<dyn Session>,
    refcount: Mutex<usize>,
}

impl std::fmt::Debug for StatusHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusHub")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl StatusHub {
    /// Creates a hub over the supervisor.
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        heartbeat: Arc<HeartbeatService>,
        registry: Arc<ChannelRegistry>,
        session: Arc<dyn Session>,
    ) -> Arc<Self> {
        Arc::new(Self {
            supervisor,
            heartbeat,
            registry,
            session,
            refcount: Mutex::new(0),
        })
    }

    /// Number of live registrations.
    pub fn observer_count(&self) -> usize {
        *self.refcount.lock().expect("hub lock poisoned")
    }

    /// Registers a status observer.
    ///
    /// The first registration triggers a connect, provided a session token
    /// exists.
    pub fn register(self: &Arc<Self>, handler: StatusHandler) -> StatusHandle {
        let registration = self.supervisor.on_status_change(handler);
        let is_first = {
            let mut refcount = self.refcount.lock().expect("hub lock poisoned");
            *refcount += 1;
            *refcount == 1
        };

        if is_first {
            if self.session.bearer_token().is_some() {
                self.supervisor.connect();
            } else {
                debug!("First observer registered without a session, connection deferred");
            }
        }

        StatusHandle {
            hub: Arc::clone(self),
            registration,
            released: AtomicBool::new(false),
        }
    }

    fn release_one(self: &Arc<Self>) {
        let is_zero = {
            let mut refcount = self.refcount.lock().expect("hub lock poisoned");
            *refcount = refcount.saturating_sub(1);
            *refcount == 0
        };

        // Keep the connection warm while a session exists.
        if is_zero && self.session.bearer_token().is_none() {
            self.teardown();
        }
    }

    /// Reports that the session ended. Tears the connection down when no
    /// observers remain; heartbeating stops either way.
    pub fn session_ended(self: &Arc<Self>) {
        self.heartbeat.stop();
        if self.observer_count() == 0 {
            self.teardown();
        }
    }

    fn teardown(self: &Arc<Self>) {
        info!("Last observer gone and session ended, tearing connection down");
        self.heartbeat.stop();
        self.supervisor.disconnect();
        self.registry.clear();
    }
}

/// Handle to a registered status observer. Release is idempotent and runs
/// on drop; the owning scope guarantees release on every exit path.
pub struct StatusHandle {
    hub: Arc<StatusHub>,
    registration: StatusRegistration,
    released: AtomicBool,
}

impl std::fmt::Debug for StatusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusHandle")
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}

impl StatusHandle {
    /// Removes the registration. Calling twice is a no-op. After this
    /// returns, the observer callback will not be invoked again.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registration.release();
        self.hub.release_one();
    }
}

impl Drop for StatusHandle {
    fn drop(&mut self) {
        self.release();
    }
}
