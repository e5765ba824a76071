//! Presence roster: user id to last-seen liveness mapping.
//!
//! Expiry is passive: entries are never swept, `is_online` compares the
//! last-seen instant against the TTL at query time. Queries never fail;
//! an unknown user is simply offline.

use dashmap::DashMap;
use tokio::time::{Duration, Instant};

use deskwire_core::types::UserId;

/// Tracks the last liveness signal per user.
#[derive(Debug)]
pub struct PresenceRoster {
    seen: DashMap<UserId, Instant>,
    ttl: Duration,
}

impl PresenceRoster {
    /// Creates a roster with the given TTL window.
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }

    /// Records a liveness signal observed at `at`.
    pub fn record(&self, user: UserId, at: Instant) {
        self.seen.insert(user, at);
    }

    /// Records a liveness signal observed now.
    pub fn record_now(&self, user: UserId) {
        self.record(user, Instant::now());
    }

    /// Whether the user's last signal is within the TTL window.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.seen
            .get(user)
            .map(|entry| entry.value().elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// All users currently within the TTL window.
    pub fn online_users(&self) -> Vec<UserId> {
        self.seen
            .iter()
            .filter(|entry| entry.value().elapsed() < self.ttl)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of tracked entries, expired ones included.
    pub fn tracked_count(&self) -> usize {
        self.seen.len()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.seen.clear();
    }

    /// The configured TTL window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
