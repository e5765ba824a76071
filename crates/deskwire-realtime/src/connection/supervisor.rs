//! Connection supervisor: owns the singleton connection lifecycle.
//!
//! Drives the transport through the state machine
//! `Disconnected -> Connecting -> Connected`, with automatic
//! backoff-retried reconnects and a terminal `Failed` state once retries
//! are exhausted or the backend refuses the connection. On every entry
//! into `Connected` the tracked channel set is replayed against the fresh
//! connection, in original subscription order.
//!
//! Every pending timer (reconnect sleeps, connect watchdogs) captures the
//! supervisor generation at scheduling time and re-checks it under the
//! state lock before acting, so `disconnect()` synchronously invalidates
//! all of them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use deskwire_core::config::realtime::RealtimeConfig;
use deskwire_core::error::ErrorKind;

use crate::channel::registry::ChannelRegistry;
use crate::channel::types::{ChannelKind, SUBSCRIPTION_ERROR_EVENT};
use crate::metrics::CoreMetrics;
use crate::transport::{ChannelAuthorizer, Transport, TransportEvent};

use super::backoff::ReconnectBackoff;
use super::state::ConnectionState;

/// A status observer callback. Receives the state entered and the error
/// message accompanying it, if any.
pub type StatusHandler = Arc<dyn Fn(ConnectionState, Option<&str>) + Send + Sync>;

struct ObserverSlot {
    id: u64,
    cancelled: AtomicBool,
    handler: Mutex<Option<StatusHandler>>,
}

type ObserverList = Mutex<Vec<Arc<ObserverSlot>>>;

/// Handle to a registered status observer.
///
/// `release` is idempotent and also runs on drop. After `release` returns,
/// the handler will not be invoked again: delivery holds the same lock
/// `release` takes, so an in-flight notification either completed before
/// the release or observes the cancellation flag. Because of that lock, a
/// handler must not release its own registration from inside the callback.
pub struct StatusRegistration {
    slot: Arc<ObserverSlot>,
    observers: Weak<ObserverList>,
}

impl std::fmt::Debug for StatusRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusRegistration")
            .field("id", &self.slot.id)
            .finish()
    }
}

impl StatusRegistration {
    /// Removes this registration. Calling twice is a no-op.
    pub fn release(&self) {
        {
            let mut guard = self.slot.handler.lock().expect("observer lock poisoned");
            self.slot.cancelled.store(true, Ordering::SeqCst);
            guard.take();
        }
        if let Some(observers) = self.observers.upgrade() {
            observers
                .lock()
                .expect("observer list lock poisoned")
                .retain(|slot| slot.id != self.slot.id);
        }
    }
}

impl Drop for StatusRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug)]
struct SupervisorInner {
    state: ConnectionState,
    last_error: Option<String>,
    /// Token invalidating pending timers; bumped on every lifecycle edge.
    generation: u64,
    /// Consecutive failed attempts in the current outage.
    attempts: u32,
    /// Whether a backoff sleep toward the next attempt is pending.
    retry_pending: bool,
    connected_at: Option<Instant>,
}

/// Owns the singleton connection and its state machine.
pub struct ConnectionSupervisor {
    transport: Arc<dyn Transport>,
    authorizer: Option<Arc<dyn ChannelAuthorizer>>,
    registry: Arc<ChannelRegistry>,
    metrics: Arc<CoreMetrics>,
    config: RealtimeConfig,
    inner: Mutex<SupervisorInner>,
    observers: Arc<ObserverList>,
    next_observer_id: AtomicU64,
    backoff: Mutex<ReconnectBackoff>,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.status())
            .finish()
    }
}

impl ConnectionSupervisor {
    /// Creates a supervisor over the given transport.
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        authorizer: Option<Arc<dyn ChannelAuthorizer>>,
        registry: Arc<ChannelRegistry>,
        metrics: Arc<CoreMetrics>,
    ) -> Arc<Self> {
        let backoff = ReconnectBackoff::new(&config);
        Arc::new(Self {
            transport,
            authorizer,
            registry,
            metrics,
            config,
            inner: Mutex::new(SupervisorInner {
                state: ConnectionState::Disconnected,
                last_error: None,
                generation: 0,
                attempts: 0,
                retry_pending: false,
                connected_at: None,
            }),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer_id: AtomicU64::new(1),
            backoff: Mutex::new(backoff),
        })
    }

    /// Spawns the transport event pump. Must be called exactly once.
    pub fn start(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                supervisor.handle_event(event).await;
            }
            debug!("Transport event channel closed, supervisor pump exiting");
        })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SupervisorInner> {
        self.inner.lock().expect("supervisor lock poisoned")
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionState {
        self.lock_inner().state
    }

    /// The error message that accompanied the last `Failed` transition.
    pub fn last_error(&self) -> Option<String> {
        self.lock_inner().last_error.clone()
    }

    /// Registers an observer for every future state transition.
    ///
    /// Observers are notified in registration order, transitions in the
    /// order they occurred.
    pub fn on_status_change(&self, handler: StatusHandler) -> StatusRegistration {
        let slot = Arc::new(ObserverSlot {
            id: self.next_observer_id.fetch_add(1, Ordering::Relaxed),
            cancelled: AtomicBool::new(false),
            handler: Mutex::new(Some(handler)),
        });
        self.observers
            .lock()
            .expect("observer list lock poisoned")
            .push(slot.clone());
        StatusRegistration {
            slot,
            observers: Arc::downgrade(&self.observers),
        }
    }

    fn notify(&self, state: ConnectionState, error: Option<&str>) {
        let observers: Vec<Arc<ObserverSlot>> = self
            .observers
            .lock()
            .expect("observer list lock poisoned")
            .clone();
        for slot in observers {
            let guard = slot.handler.lock().expect("observer lock poisoned");
            if slot.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            if let Some(handler) = guard.as_ref() {
                handler(state, error);
            }
        }
    }

    /// Starts connecting. A no-op while `Connecting` or `Connected`.
    pub fn connect(self: &Arc<Self>) {
        let generation = {
            let mut inner = self.lock_inner();
            if matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(state = %inner.state, "connect() ignored, already in progress");
                return;
            }
            inner.state = ConnectionState::Connecting;
            inner.last_error = None;
            inner.attempts = 0;
            inner.retry_pending = false;
            inner.generation += 1;
            inner.generation
        };
        self.notify(ConnectionState::Connecting, None);
        self.spawn_attempt(generation);
    }

    /// Forces a fresh connect cycle from any state, resetting backoff.
    /// This is the explicit recovery path out of `Failed`.
    pub fn reconnect(self: &Arc<Self>) {
        let (generation, changed) = {
            let mut inner = self.lock_inner();
            let old = std::mem::replace(&mut inner.state, ConnectionState::Connecting);
            inner.last_error = None;
            inner.attempts = 0;
            inner.retry_pending = false;
            inner.connected_at = None;
            inner.generation += 1;
            (inner.generation, old != ConnectionState::Connecting)
        };
        self.backoff.lock().expect("backoff lock poisoned").reset();
        self.registry.mark_all_offline();
        if changed {
            self.notify(ConnectionState::Connecting, None);
        }
        self.spawn_attempt(generation);
    }

    /// Tears the connection down and clears any pending reconnect.
    pub fn disconnect(self: &Arc<Self>) {
        let changed = {
            let mut inner = self.lock_inner();
            inner.generation += 1;
            inner.retry_pending = false;
            inner.attempts = 0;
            inner.connected_at = None;
            let old = std::mem::replace(&mut inner.state, ConnectionState::Disconnected);
            old != ConnectionState::Disconnected
        };
        self.registry.mark_all_offline();
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            transport.disconnect().await;
        });
        if changed {
            info!("Disconnected by request");
            self.notify(ConnectionState::Disconnected, None);
        }
    }

    fn spawn_attempt(self: &Arc<Self>, generation: u64) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.attempt_connect(generation).await;
        });
    }

    async fn attempt_connect(self: Arc<Self>, generation: u64) {
        {
            let inner = self.lock_inner();
            if inner.generation != generation || inner.state != ConnectionState::Connecting {
                return;
            }
        }

        self.metrics.connect_attempt();
        match self.transport.connect().await {
            Ok(()) => self.arm_connect_watchdog(generation),
            Err(e) => {
                if e.is_terminal() {
                    self.fail(e.message);
                } else {
                    warn!(error = %e, "Connect attempt failed");
                    self.connection_attempt_failed(e.message);
                }
            }
        }
    }

    /// Synthesizes a failure if the handshake does not complete in time.
    fn arm_connect_watchdog(self: &Arc<Self>, generation: u64) {
        let supervisor = Arc::clone(self);
        let timeout = Duration::from_secs(self.config.connect_timeout_seconds);
        tokio::spawn(async move {
            time::sleep(timeout).await;
            let timed_out = {
                let inner = supervisor.lock_inner();
                inner.generation == generation && inner.state == ConnectionState::Connecting
            };
            if timed_out {
                warn!(timeout = ?timeout, "Handshake did not complete in time");
                supervisor.connection_attempt_failed("connect timed out".to_string());
            }
        });
    }

    /// Books a failed attempt: either schedules the next backoff retry or
    /// transitions to terminal `Failed` once attempts are exhausted.
    fn connection_attempt_failed(self: &Arc<Self>, reason: String) {
        enum Next {
            Ignore,
            Fail(String),
            Retry(u64, Duration, u32),
        }

        let next = {
            let mut inner = self.lock_inner();
            if inner.state != ConnectionState::Connecting || inner.retry_pending {
                Next::Ignore
            } else {
                inner.attempts += 1;
                inner.generation += 1;
                if inner.attempts >= self.config.max_reconnect_attempts {
                    let message = format!("Reconnect attempts exhausted: {reason}");
                    inner.state = ConnectionState::Failed;
                    inner.last_error = Some(message.clone());
                    inner.retry_pending = false;
                    Next::Fail(message)
                } else {
                    inner.retry_pending = true;
                    let delay = self
                        .backoff
                        .lock()
                        .expect("backoff lock poisoned")
                        .next_delay();
                    Next::Retry(inner.generation, delay, inner.attempts)
                }
            }
        };

        match next {
            Next::Ignore => {}
            Next::Fail(message) => {
                warn!(error = %message, "Connection failed");
                self.notify(ConnectionState::Failed, Some(&message));
            }
            Next::Retry(generation, delay, attempt) => {
                info!(attempt, delay = ?delay, reason = %reason, "Scheduling reconnect");
                let supervisor = Arc::clone(self);
                tokio::spawn(async move {
                    time::sleep(delay).await;
                    let proceed = {
                        let mut inner = supervisor.lock_inner();
                        let live = inner.generation == generation
                            && inner.state == ConnectionState::Connecting;
                        if live {
                            inner.retry_pending = false;
                        }
                        live
                    };
                    if proceed {
                        supervisor.attempt_connect(generation).await;
                    }
                });
            }
        }
    }

    /// Enters terminal `Failed`. Not retried until an explicit reconnect.
    fn fail(self: &Arc<Self>, message: String) {
        {
            let mut inner = self.lock_inner();
            inner.generation += 1;
            inner.retry_pending = false;
            inner.state = ConnectionState::Failed;
            inner.last_error = Some(message.clone());
            inner.connected_at = None;
        }
        self.registry.mark_all_offline();
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            transport.disconnect().await;
        });
        warn!(error = %message, "Connection failed");
        self.notify(ConnectionState::Failed, Some(&message));
    }

    async fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected { socket_id } => {
                let changed = {
                    let mut inner = self.lock_inner();
                    inner.generation += 1;
                    inner.retry_pending = false;
                    inner.attempts = 0;
                    inner.last_error = None;
                    inner.connected_at = Some(Instant::now());
                    let old = std::mem::replace(&mut inner.state, ConnectionState::Connected);
                    old != ConnectionState::Connected
                };
                self.metrics.connection_established();
                info!(socket_id = ?socket_id, "Connected");
                if changed {
                    self.notify(ConnectionState::Connected, None);
                }
                self.replay_subscriptions().await;
            }
            TransportEvent::Disconnected { reason } => {
                self.handle_drop(reason);
            }
            TransportEvent::Error { message, terminal } => {
                if terminal {
                    self.fail(message);
                } else {
                    self.handle_drop(Some(message));
                }
            }
            TransportEvent::SubscriptionSucceeded { channel } => {
                debug!(channel = %channel, "Subscription acknowledged");
                self.registry.mark_live(&channel);
            }
            TransportEvent::SubscriptionError { channel, message } => {
                warn!(channel = %channel, error = %message, "Subscription rejected");
                self.registry.dispatch(
                    &channel,
                    SUBSCRIPTION_ERROR_EVENT,
                    &json!({ "channel": channel, "message": message }),
                );
            }
            TransportEvent::Message {
                channel,
                event,
                payload,
            } => {
                self.registry.dispatch(&channel, &event, &payload);
            }
        }
    }

    /// Reacts to an unexpected connection loss.
    fn handle_drop(self: &Arc<Self>, reason: Option<String>) {
        let was_connected = {
            let mut inner = self.lock_inner();
            match inner.state {
                // Explicit disconnect or terminal failure: nothing to do.
                ConnectionState::Disconnected | ConnectionState::Failed => return,
                ConnectionState::Connected => {
                    let stable_for =
                        Duration::from_secs(self.config.reconnect_stable_after_seconds);
                    let stable = inner
                        .connected_at
                        .map(|at| at.elapsed() >= stable_for)
                        .unwrap_or(false);
                    if stable {
                        self.backoff.lock().expect("backoff lock poisoned").reset();
                        inner.attempts = 0;
                    }
                    inner.connected_at = None;
                    inner.state = ConnectionState::Connecting;
                    true
                }
                ConnectionState::Connecting => false,
            }
        };

        self.registry.mark_all_offline();
        if was_connected {
            self.metrics.disconnect();
            info!(reason = ?reason, "Connection lost, reconnecting");
            self.notify(ConnectionState::Connecting, reason.as_deref());
        }
        self.connection_attempt_failed(reason.unwrap_or_else(|| "connection lost".to_string()));
    }

    /// Replays every tracked channel against the fresh connection, in
    /// original subscription order.
    async fn replay_subscriptions(&self) {
        let channels = self.registry.channels_in_order();
        if channels.is_empty() {
            return;
        }
        info!(count = channels.len(), "Replaying channel subscriptions");
        let mut replayed = 0u64;
        for (name, kind) in channels {
            if self.status() != ConnectionState::Connected {
                break;
            }
            self.subscribe_on_transport(&name, kind).await;
            replayed += 1;
        }
        self.metrics.channels_replayed(replayed);
    }

    /// Issues a transport-level subscribe, resolving authorization for
    /// private channels first. Deferred silently while not connected; the
    /// replay on the next `Connected` covers it.
    pub(crate) async fn subscribe_on_transport(&self, channel: &str, kind: ChannelKind) {
        if self.status() != ConnectionState::Connected {
            return;
        }

        let auth = if kind.is_private() {
            match (&self.authorizer, self.transport.socket_id()) {
                (Some(authorizer), Some(socket_id)) => {
                    match authorizer.authorize(&socket_id, channel).await {
                        Ok(auth) => Some(auth),
                        Err(e) if e.kind == ErrorKind::AuthorizationDenied => {
                            warn!(channel = %channel, error = %e, "Channel authorization denied");
                            self.registry.dispatch(
                                channel,
                                SUBSCRIPTION_ERROR_EVENT,
                                &json!({ "channel": channel, "message": e.message }),
                            );
                            return;
                        }
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "Channel authorization failed");
                            return;
                        }
                    }
                }
                (None, _) => None,
                (_, None) => {
                    warn!(channel = %channel, "No socket id available for authorization");
                    None
                }
            }
        } else {
            None
        };

        if let Err(e) = self.transport.subscribe(channel, auth).await {
            warn!(channel = %channel, error = %e, "Transport subscribe failed");
        }
    }

    /// Withdraws a transport-level subscription, when connected.
    pub(crate) async fn unsubscribe_on_transport(&self, channel: &str) {
        if self.status() != ConnectionState::Connected {
            return;
        }
        if let Err(e) = self.transport.unsubscribe(channel).await {
            debug!(channel = %channel, error = %e, "Transport unsubscribe failed");
        }
    }

    /// Publishes a client event on a channel. Fire-and-forget while
    /// connected; an error while disconnected is returned to the caller.
    pub(crate) async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> deskwire_core::AppResult<()> {
        self.transport.publish(channel, event, payload).await
    }
}
