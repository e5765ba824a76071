//! Service facade: the explicitly constructed, dependency-injected
//! process singleton.
//!
//! Constructed once at process start and passed to every consumer. The
//! "exactly one connection" invariant holds because all consumers share
//! this instance; there is no hidden global.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use deskwire_core::config::AppConfig;
use deskwire_core::session::Session;
use deskwire_core::types::UserId;

use crate::channel::registry::{ChannelRegistry, SubscribeOutcome};
use crate::channel::types::{ChannelKind, EventHandler};
use crate::connection::state::ConnectionState;
use crate::connection::supervisor::ConnectionSupervisor;
use crate::hub::{StatusHandle, StatusHub};
use crate::metrics::{CoreMetrics, MetricsSnapshot};
use crate::presence::heartbeat::{HeartbeatService, liveness_handler};
use crate::presence::roster::PresenceRoster;
use crate::transport::{ChannelAuthorizer, HttpAuthorizer, Transport, TransportEvent, WsTransport};

/// The realtime connectivity core, wired and running.
pub struct RealtimeService {
    config: AppConfig,
    supervisor: Arc<ConnectionSupervisor>,
    registry: Arc<ChannelRegistry>,
    roster: Arc<PresenceRoster>,
    heartbeat: Arc<HeartbeatService>,
    hub: Arc<StatusHub>,
    metrics: Arc<CoreMetrics>,
    liveness: EventHandler,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for RealtimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeService")
            .field("state", &self.connection_status())
            .finish()
    }
}

impl RealtimeService {
    /// Builds the service over the websocket transport, with the HTTP
    /// authorizer when an auth endpoint is configured. Must be called from
    /// within a tokio runtime.
    pub fn new(config: AppConfig, session: Arc<dyn Session>) -> Arc<Self> {
        let authorizer = config.realtime.auth_endpoint.clone().map(|endpoint| {
            let authorizer: Arc<dyn ChannelAuthorizer> =
                Arc::new(HttpAuthorizer::new(endpoint, session.clone()));
            authorizer
        });
        let realtime_config = config.realtime.clone();
        Self::with_transport(config, session, authorizer, move |events| {
            let transport: Arc<dyn Transport> =
                Arc::new(WsTransport::new(realtime_config, events));
            transport
        })
    }

    /// Builds the service over a caller-supplied transport. This is the
    /// seam used by tests and demos.
    pub fn with_transport<F>(
        config: AppConfig,
        session: Arc<dyn Session>,
        authorizer: Option<Arc<dyn ChannelAuthorizer>>,
        transport_factory: F,
    ) -> Arc<Self>
    where
        F: FnOnce(mpsc::Sender<TransportEvent>) -> Arc<dyn Transport>,
    {
        let metrics = Arc::new(CoreMetrics::new());
        let (events_tx, events_rx) = mpsc::channel(config.realtime.event_buffer_size);
        let transport = transport_factory(events_tx);

        let registry = Arc::new(ChannelRegistry::new(metrics.clone()));
        let roster = Arc::new(PresenceRoster::new(Duration::from_secs(
            config.presence.ttl_seconds,
        )));
        let supervisor = ConnectionSupervisor::new(
            config.realtime.clone(),
            transport,
            authorizer,
            registry.clone(),
            metrics.clone(),
        );
        let pump = supervisor.start(events_rx);
        let heartbeat = HeartbeatService::new(
            config.presence.clone(),
            roster.clone(),
            session.clone(),
            supervisor.clone(),
            metrics.clone(),
        );
        let hub = StatusHub::new(
            supervisor.clone(),
            heartbeat.clone(),
            registry.clone(),
            session,
        );
        let liveness = liveness_handler(roster.clone(), metrics.clone());

        Arc::new(Self {
            config,
            supervisor,
            registry,
            roster,
            heartbeat,
            hub,
            metrics,
            liveness,
            pump,
        })
    }

    /// Current connection state.
    pub fn connection_status(&self) -> ConnectionState {
        self.supervisor.status()
    }

    /// The error message accompanying the last `Failed` transition.
    pub fn last_error(&self) -> Option<String> {
        self.supervisor.last_error()
    }

    /// Registers a status observer. The first observer brings the
    /// connection up; releasing the returned handle is always safe.
    pub fn on_status_change<F>(&self, handler: F) -> StatusHandle
    where
        F: Fn(ConnectionState, Option<&str>) + Send + Sync + 'static,
    {
        self.hub.register(Arc::new(handler))
    }

    /// Subscribes to a public channel, merging with any existing
    /// subscription. Transport work is deferred until connected.
    pub fn subscribe(&self, channel: &str, events: Vec<(String, EventHandler)>) {
        self.subscribe_with_kind(channel, ChannelKind::Public, events);
    }

    /// Subscribes to a private channel; the subscription is authorized
    /// through the configured auth endpoint. Authorization failures are
    /// dispatched asynchronously to the channel's
    /// [`crate::channel::types::SUBSCRIPTION_ERROR_EVENT`] handlers.
    pub fn subscribe_private(&self, channel: &str, events: Vec<(String, EventHandler)>) {
        self.subscribe_with_kind(channel, ChannelKind::Private, events);
    }

    fn subscribe_with_kind(
        &self,
        channel: &str,
        kind: ChannelKind,
        events: Vec<(String, EventHandler)>,
    ) {
        let outcome = self.registry.subscribe(channel, kind, events);
        if outcome == SubscribeOutcome::NewChannel {
            let supervisor = self.supervisor.clone();
            let channel = channel.to_string();
            tokio::spawn(async move {
                supervisor.subscribe_on_transport(&channel, kind).await;
            });
        }
    }

    /// Removes every handler for a channel and withdraws the transport
    /// subscription. Unknown channels are a no-op.
    pub fn unsubscribe(&self, channel: &str) {
        self.unsubscribe_inner(channel, None);
    }

    /// Removes the handlers for one event on a channel; the channel is
    /// dropped once no handlers remain.
    pub fn unsubscribe_event(&self, channel: &str, event: &str) {
        self.unsubscribe_inner(channel, Some(event));
    }

    fn unsubscribe_inner(&self, channel: &str, event: Option<&str>) {
        if self.registry.unsubscribe(channel, event) {
            let supervisor = self.supervisor.clone();
            let channel = channel.to_string();
            tokio::spawn(async move {
                supervisor.unsubscribe_on_transport(&channel).await;
            });
        }
    }

    /// Forces a fresh connect cycle; the recovery path out of `Failed`.
    pub fn reconnect(&self) {
        self.supervisor.reconnect();
    }

    /// Starts the presence heartbeat at the configured interval.
    pub fn start_heartbeat(&self) {
        self.start_heartbeat_every(Duration::from_secs(
            self.config.presence.heartbeat_interval_seconds,
        ));
    }

    /// Starts the presence heartbeat at a custom interval. A no-op while
    /// already running.
    pub fn start_heartbeat_every(&self, interval: Duration) {
        // Listen for other clients' liveness signals on the heartbeat
        // channel. Handler identity makes repeated calls a no-op.
        self.subscribe_with_kind(
            &self.config.presence.heartbeat_channel,
            ChannelKind::Private,
            vec![(
                self.config.presence.heartbeat_event.clone(),
                self.liveness.clone(),
            )],
        );
        self.heartbeat.start(interval);
    }

    /// Stops the presence heartbeat. Idempotent.
    pub fn stop_heartbeat(&self) {
        self.heartbeat.stop();
    }

    /// Whether a user's last liveness signal is within the TTL window.
    /// Never fails; unknown users are offline.
    pub fn is_user_online(&self, user: &UserId) -> bool {
        self.roster.is_online(user)
    }

    /// All users currently within the TTL window.
    pub fn online_users(&self) -> Vec<UserId> {
        self.roster.online_users()
    }

    /// Reports that the auth collaborator ended the session.
    pub fn session_ended(&self) {
        self.hub.session_ended();
    }

    /// Channels the registry tracks, sorted by name.
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.registry.tracked_channels()
    }

    /// Channels with a live transport-level subscription, sorted by name.
    pub fn live_channels(&self) -> Vec<String> {
        self.registry.live_channels()
    }

    /// A snapshot of the core's counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops the heartbeat, disconnects, and drops all subscriptions.
    pub fn shutdown(&self) {
        self.heartbeat.stop();
        self.supervisor.disconnect();
        self.registry.clear();
        self.pump.abort();
    }
}
