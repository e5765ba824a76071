//! Connectivity core metrics counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Core-level metrics counters.
#[derive(Debug)]
pub struct CoreMetrics {
    /// Connect attempts issued against the transport.
    pub connect_attempts: AtomicU64,
    /// Handshakes that reached the connected state.
    pub connections_established: AtomicU64,
    /// Connection drops observed.
    pub disconnects: AtomicU64,
    /// Channels replayed after reconnects.
    pub channels_replayed: AtomicU64,
    /// Handler invocations performed by dispatch.
    pub messages_dispatched: AtomicU64,
    /// Handlers that panicked during dispatch.
    pub handler_failures: AtomicU64,
    /// Liveness signals emitted.
    pub heartbeats_emitted: AtomicU64,
    /// Liveness signals received (own echoes included).
    pub heartbeats_received: AtomicU64,
}

impl CoreMetrics {
    /// Create new zeroed metrics.
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            channels_replayed: AtomicU64::new(0),
            messages_dispatched: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            heartbeats_emitted: AtomicU64::new(0),
            heartbeats_received: AtomicU64::new(0),
        }
    }

    /// Record a connect attempt.
    pub fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed handshake.
    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection drop.
    pub fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record replayed channels after a reconnect.
    pub fn channels_replayed(&self, count: u64) {
        self.channels_replayed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record handler invocations.
    pub fn messages_dispatched(&self, count: u64) {
        self.messages_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a panicking handler.
    pub fn handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an emitted liveness signal.
    pub fn heartbeat_emitted(&self) {
        self.heartbeats_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a received liveness signal.
    pub fn heartbeat_received(&self) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            channels_replayed: self.channels_replayed.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            heartbeats_emitted: self.heartbeats_emitted.load(Ordering::Relaxed),
            heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
        }
    }
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connect attempts issued.
    pub connect_attempts: u64,
    /// Handshakes completed.
    pub connections_established: u64,
    /// Connection drops observed.
    pub disconnects: u64,
    /// Channels replayed after reconnects.
    pub channels_replayed: u64,
    /// Handler invocations performed.
    pub messages_dispatched: u64,
    /// Handlers that panicked.
    pub handler_failures: u64,
    /// Liveness signals emitted.
    pub heartbeats_emitted: u64,
    /// Liveness signals received.
    pub heartbeats_received: u64,
}
