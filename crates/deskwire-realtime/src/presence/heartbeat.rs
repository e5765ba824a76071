//! Periodic liveness emission for the local user.
//!
//! The heartbeat runs while a session exists, but each tick is gated on
//! the supervisor being connected, so signals are skipped rather than
//! queued across a disconnect. Presence therefore degrades passively: a
//! connectivity blip shorter than the TTL never flips the user offline.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, warn};

use deskwire_core::config::presence::PresenceConfig;
use deskwire_core::session::Session;
use deskwire_core::types::UserId;

use crate::channel::types::{EventHandler, handler};
use crate::connection::state::ConnectionState;
use crate::connection::supervisor::ConnectionSupervisor;
use crate::message::types::Liveness;
use crate::metrics::CoreMetrics;

use super::roster::PresenceRoster;

#[derive(Debug, Default)]
struct HeartbeatInner {
    /// Cancellation token; the running task re-checks it under this lock
    /// on every tick, which closes the stop-then-fire race.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Emits periodic liveness signals and feeds the presence roster.
pub struct HeartbeatService {
    roster: Arc<PresenceRoster>,
    session: Arc<dyn Session>,
    supervisor: Arc<ConnectionSupervisor>,
    config: PresenceConfig,
    metrics: Arc<CoreMetrics>,
    inner: Mutex<HeartbeatInner>,
}

impl std::fmt::Debug for HeartbeatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatService")
            .field("running", &self.is_running())
            .finish()
    }
}

impl HeartbeatService {
    /// Creates a stopped heartbeat service.
    pub fn new(
        config: PresenceConfig,
        roster: Arc<PresenceRoster>,
        session: Arc<dyn Session>,
        supervisor: Arc<ConnectionSupervisor>,
        metrics: Arc<CoreMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            roster,
            session,
            supervisor,
            config,
            metrics,
            inner: Mutex::new(HeartbeatInner::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeartbeatInner> {
        self.inner.lock().expect("heartbeat lock poisoned")
    }

    /// Whether the periodic task is running.
    pub fn is_running(&self) -> bool {
        self.lock().task.is_some()
    }

    /// Starts periodic emission. A no-op while already running.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let generation = {
            let mut inner = self.lock();
            if inner.task.is_some() {
                debug!("Heartbeat already running");
                return;
            }
            inner.generation += 1;
            inner.generation
        };

        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                {
                    let inner = service.lock();
                    if inner.generation != generation {
                        break;
                    }
                }
                service.beat().await;
            }
        });

        let mut inner = self.lock();
        if inner.generation == generation {
            inner.task = Some(handle);
            debug!(interval = ?interval, "Heartbeat started");
        } else {
            // A stop raced the spawn; the task is already cancelled.
            handle.abort();
        }
    }

    /// Cancels periodic emission. Idempotent; after this returns no
    /// further signal is published for the stopped run.
    pub fn stop(&self) {
        let task = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.task.take()
        };
        if let Some(task) = task {
            task.abort();
            debug!("Heartbeat stopped");
        }
    }

    /// One emission attempt: skipped unless connected with a live session.
    async fn beat(&self) {
        if self.supervisor.status() != ConnectionState::Connected {
            return;
        }
        if self.session.bearer_token().is_none() {
            return;
        }
        let Some(user) = self.session.user_id() else {
            return;
        };

        let payload = match serde_json::to_value(Liveness {
            user_id: user.as_str().to_string(),
        }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode liveness payload");
                return;
            }
        };

        match self
            .supervisor
            .publish(
                &self.config.heartbeat_channel,
                &self.config.heartbeat_event,
                &payload,
            )
            .await
        {
            Ok(()) => {
                // Self-observation: local presence must not depend on the
                // backend echoing the client's own events.
                self.roster.record_now(user);
                self.metrics.heartbeat_emitted();
            }
            Err(e) => {
                debug!(error = %e, "Heartbeat emission skipped");
            }
        }
    }

    /// Records an inbound liveness signal for any user.
    pub fn record_liveness(&self, user: UserId) {
        self.roster.record_now(user);
        self.metrics.heartbeat_received();
    }
}

/// Handler that feeds inbound liveness signals into a roster. Registered
/// on the heartbeat channel like any consumer subscription.
pub fn liveness_handler(roster: Arc<PresenceRoster>, metrics: Arc<CoreMetrics>) -> EventHandler {
    handler(move |payload| {
        match serde_json::from_value::<Liveness>(payload.clone()) {
            Ok(liveness) => {
                roster.record_now(UserId::from(liveness.user_id));
                metrics.heartbeat_received();
            }
            Err(e) => {
                warn!(error = %e, "Malformed liveness payload");
            }
        }
    })
}
